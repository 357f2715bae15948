use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};

use timecode::decode::{Decoder, TIMECODER_CHANNELS, monitor::Monitor};
use timecode::format::find_definition;

use super::command::TrackArgs;
use crate::input::InputReader;
use crate::timestamp::time_str;
use crate::wav;

const CHUNK_BYTES: usize = 64 * 1024;
const FRAME_BYTES: usize = TIMECODER_CHANNELS * 2;

pub fn cmd_track(args: &TrackArgs, multi: Option<&MultiProgress>) -> Result<()> {
    let format = find_definition(&args.timecode)?;
    let mut input = InputReader::new(&args.input)?;

    let use_wav = !args.raw
        && args
            .input
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

    let (sample_rate, data_len) = if use_wav {
        let fmt = wav::read_header(&mut input).context("parsing WAV header")?;
        if usize::from(fmt.channels) != TIMECODER_CHANNELS {
            bail!("timecode captures are stereo; this file has {} channel(s)", fmt.channels);
        }
        if fmt.bits_per_sample != 16 {
            bail!("only 16-bit captures are supported, not {}-bit", fmt.bits_per_sample);
        }
        info!(
            "WAV capture: {} Hz, {} channels, {} bit",
            fmt.sample_rate, fmt.channels, fmt.bits_per_sample
        );
        (fmt.sample_rate, Some(fmt.data_len))
    } else {
        (args.sample_rate, input.length())
    };

    info!(
        "Tracking {} ({}) at {} Hz",
        format.def().name,
        format.def().desc,
        sample_rate
    );

    let mut decoder = Decoder::new(format, args.speed, sample_rate, args.phono);
    if args.scope.is_some() {
        decoder.init_monitor(args.scope_size)?;
    }

    let pb = multi.map(|multi| create_progress_bar(multi, data_len)).transpose()?;

    let report_frames = ((args.report_every * f64::from(sample_rate)) as u64).max(1);

    let mut stats = TrackStats::default();
    let mut pending: Vec<u8> = Vec::new();
    let mut pcm: Vec<i16> = Vec::new();
    let mut since_report = 0u64;

    input.process_chunks(CHUNK_BYTES, |chunk| {
        pending.extend_from_slice(chunk);
        let usable = pending.len() - pending.len() % FRAME_BYTES;

        pcm.clear();
        pcm.extend(
            pending[..usable]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
        pending.drain(..usable);

        decoder.submit(&pcm);

        let frames = (usable / FRAME_BYTES) as u64;
        stats.observe(&decoder, frames, sample_rate);

        since_report += frames;
        if since_report >= report_frames {
            since_report %= report_frames;
            report(&decoder, &stats, sample_rate);
        }

        if let Some(ref pb) = pb {
            pb.inc(usable as u64);
        }

        Ok(true)
    })?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    if !pending.is_empty() {
        warn!("{} trailing byte(s) did not form a whole frame", pending.len());
    }

    print_summary(&decoder, &stats, sample_rate);

    if let Some(path) = &args.scope {
        if let Some(monitor) = decoder.monitor() {
            write_pgm(path, monitor)
                .with_context(|| format!("writing scope raster to {}", path.display()))?;
            info!("Wrote scope raster to {}", path.display());
        }
    }

    Ok(())
}

#[derive(Default)]
struct TrackStats {
    frames: u64,
    locked_frames: u64,
    locked: bool,
}

impl TrackStats {
    /// Account one submitted block and log lock transitions.
    fn observe(&mut self, decoder: &Decoder, frames: u64, sample_rate: u32) {
        self.frames += frames;

        let position = decoder.position();
        if position.is_some() != self.locked {
            self.locked = position.is_some();
            let at = time_str(self.frames as f64 / f64::from(sample_rate));
            match position {
                Some(position) => info!(
                    "{at}: locked at chip {} ({})",
                    position.offset,
                    timecode_time(decoder, position.offset),
                ),
                None => info!("{at}: lost the timecode"),
            }
        }

        if self.locked {
            self.locked_frames += frames;
        }
    }
}

fn report(decoder: &Decoder, stats: &TrackStats, sample_rate: u32) {
    let at = time_str(stats.frames as f64 / f64::from(sample_rate));
    match decoder.position() {
        Some(position) => info!(
            "{at}: chip {} ({}), pitch {:+.4}",
            position.offset,
            timecode_time(decoder, position.offset),
            decoder.pitch(),
        ),
        None => info!("{at}: no lock, pitch {:+.4}", decoder.pitch()),
    }
}

/// Position expressed as time into the timecode at nominal speed.
fn timecode_time(decoder: &Decoder, offset: u32) -> String {
    time_str(f64::from(offset) / f64::from(decoder.definition().resolution))
}

fn print_summary(decoder: &Decoder, stats: &TrackStats, sample_rate: u32) {
    let duration = stats.frames as f64 / f64::from(sample_rate);
    let locked_ratio = if stats.frames > 0 {
        stats.locked_frames as f64 / stats.frames as f64 * 100.0
    } else {
        0.0
    };

    println!();
    println!("Capture summary");
    println!("  Frames processed          {}", stats.frames);
    println!("  Duration                  {}", time_str(duration));
    println!("  Locked                    {locked_ratio:.1}%");

    match decoder.position() {
        Some(position) => {
            println!("  Final position            chip {}", position.offset);
            println!(
                "  Timecode time             {}",
                timecode_time(decoder, position.offset)
            );
            println!("  Position age              {:.3}s", position.elapsed);
        }
        None => println!("  Final position            unknown"),
    }
    println!("  Pitch                     {:+.4}", decoder.pitch());
    println!(
        "  Direction                 {}",
        if decoder.forwards() { "forwards" } else { "reverse" }
    );
}

fn create_progress_bar(multi: &MultiProgress, total_bytes: Option<u64>) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_bytes {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%) | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {bytes} | elapsed: {elapsed_precise}",
        )?);
        pb
    };

    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn write_pgm(path: &Path, monitor: &Monitor) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P5\n{} {}\n255\n", monitor.size(), monitor.size())?;
    out.write_all(monitor.pixels())?;
    out.flush()?;
    Ok(())
}
