//! Timecode decoding from captured stereo audio.
//!
//! A [`Decoder`] consumes the two sinusoidal tones picked up from the
//! control medium and recovers three things per block: the absolute
//! position pressed at the needle, the instantaneous pitch, and the
//! direction of travel. Bits are read off amplitude at zero crossings,
//! shifted into a rolling register, and checked against the position the
//! LFSR predicts; only a run of consecutive matches makes a position
//! trustworthy, which is what keeps the deck stable under scratching.

pub mod channel;
pub mod monitor;

use log::trace;

use crate::decode::channel::Channel;
use crate::decode::monitor::Monitor;
use crate::format::{self, Flags, Format, TimecodeDef, lfsr};
use crate::utils::errors::MonitorError;
use crate::utils::filters::{Derivative, Ema};
use crate::utils::pitch::Pitch;

/// Interleaved channels per PCM frame.
pub const TIMECODER_CHANNELS: usize = 2;

/// Hysteresis threshold for zero-crossing detection at line level.
pub const ZERO_THRESHOLD: i32 = 128 << 16;

/// Time constant of the zero/rumble baseline filter, in seconds.
pub const ZERO_RC: f64 = 0.001;

/// Wave cycles averaged into the reference level.
pub const REF_PEAKS_AVG: i32 = 48;

/// Correct consecutive bits required before the timecode is declared
/// valid. Set this too low, and risk the record skipping around (often
/// to blank areas of track) during scratching.
pub const VALID_BITS: u32 = 24;

/// Factor by which the sinusoid is vertically offset on offset-modulated
/// (Traktor MK2) media, relative to the envelope height.
pub const MK2_OFFSET_FACTOR: f64 = 3.75;

// Smoothing factor of the EMA stage ahead of the derivative when
// centring offset-modulated signals.
const OFFSET_EMA_ALPHA: f64 = 0.3;

// Cycles of peak readings retained for envelope-offset estimation.
const ENVELOPE_WINDOW: usize = 10;

/// A decoded position on the medium.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Ordinal position, in chips from the start of the timecode.
    pub offset: u32,

    /// Seconds elapsed since the position stamp was read.
    pub elapsed: f64,
}

/// Timecode decoder for one incoming stereo signal.
///
/// One decoder serves one deck. The format's lookup table is shared
/// between decoders; everything else here is private state. The caller
/// must serialise access per decoder, but independent decoders may run
/// on different threads.
///
/// # Example
///
/// ```rust,no_run
/// use timecode::decode::Decoder;
/// use timecode::format::find_definition;
///
/// let format = find_definition("serato_2a")?;
/// let mut decoder = Decoder::new(format, 1.0, 44100, false);
///
/// // feed interleaved stereo PCM from the capture device
/// let pcm = vec![0i16; 8192];
/// decoder.submit(&pcm);
///
/// if let Some(position) = decoder.position() {
///     println!(
///         "at chip {} (read {:.3}s ago), pitch {:+.3}",
///         position.offset,
///         position.elapsed,
///         decoder.pitch(),
///     );
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Decoder {
    format: Format,
    speed: f64,
    dt: f64,
    zero_alpha: f64,
    threshold: i32,

    forwards: bool,
    primary: Channel,
    secondary: Channel,
    pitch: Pitch,

    ref_level: i32,
    bitstream: u128,
    timecode: u128,
    valid_counter: u32,
    timecode_ticker: u32,

    // Offset-modulation demodulation state. The envelope window is
    // reserved for deriving the MK2 vertical offset; see
    // `process_bitstream`.
    ema_primary: Ema,
    ema_secondary: Ema,
    deriv_primary: Derivative,
    deriv_secondary: Derivative,
    envelope: [i32; ENVELOPE_WINDOW],
    envelope_at: usize,

    // raw-channel derivatives feeding the scope on offset-modulated media
    deriv_left: Derivative,
    deriv_right: Derivative,

    monitor: Option<Monitor>,
}

impl Decoder {
    /// New decoder at the given nominal `speed` (1.0 for 33⅓ RPM media).
    /// `phono` lowers the crossing threshold by approximately 36 dB for
    /// captures taken without a preamp.
    pub fn new(format: Format, speed: f64, sample_rate: u32, phono: bool) -> Self {
        let dt = 1.0 / f64::from(sample_rate);

        let mut threshold = ZERO_THRESHOLD;
        if phono {
            threshold >>= 5;
        }

        Self {
            format,
            speed,
            dt,
            zero_alpha: dt / (ZERO_RC + dt),
            threshold,
            forwards: true,
            primary: Channel::default(),
            secondary: Channel::default(),
            pitch: Pitch::new(dt),
            ref_level: i32::MAX,
            bitstream: 0,
            timecode: 0,
            valid_counter: 0,
            timecode_ticker: 0,
            ema_primary: Ema::default(),
            ema_secondary: Ema::default(),
            deriv_primary: Derivative::default(),
            deriv_secondary: Derivative::default(),
            envelope: [0; ENVELOPE_WINDOW],
            envelope_at: 0,
            deriv_left: Derivative::default(),
            deriv_right: Derivative::default(),
            monitor: None,
        }
    }

    /// Definition currently being decoded.
    pub fn definition(&self) -> &'static TimecodeDef {
        self.format.def()
    }

    /// Direction of travel inferred from the most recent crossings.
    pub fn forwards(&self) -> bool {
        self.forwards
    }

    /// Smoothed pitch relative to the nominal speed. 1.0 is forward at
    /// recorded speed; negative values are reverse.
    pub fn pitch(&self) -> f64 {
        self.pitch.current() / self.speed
    }

    /// Change to the next definition with a built lookup table, wrapping
    /// around the catalog. Keeps the current one when no other table is
    /// built.
    pub fn cycle_definition(&mut self) {
        if let Some(next) = format::next_definition(self.format.index()) {
            self.format = next;
        }
        self.valid_counter = 0;
        self.timecode_ticker = 0;
    }

    /// Attach an x-y scope raster of `size` by `size` pixels.
    pub fn init_monitor(&mut self, size: usize) -> Result<(), MonitorError> {
        if self.monitor.is_some() {
            return Err(MonitorError::AlreadyInitialised);
        }
        self.monitor = Some(Monitor::new(size)?);
        Ok(())
    }

    /// Detach and free the scope raster.
    pub fn clear_monitor(&mut self) {
        self.monitor = None;
    }

    pub fn monitor(&self) -> Option<&Monitor> {
        self.monitor.as_ref()
    }

    /// Average height of recent bit peaks, at half the signal scale. On
    /// offset-modulated media this is the input to the vertical offset
    /// estimate.
    pub fn envelope_height(&self) -> i32 {
        let sum: i64 = self.envelope.iter().map(|&m| i64::from(m)).sum();
        (sum / self.envelope.len() as i64) as i32
    }

    /// Submit a block of interleaved 16-bit stereo PCM.
    ///
    /// Samples are processed in order. This is the realtime path: it does
    /// not allocate, lock or block. A trailing part-frame is ignored.
    pub fn submit(&mut self, pcm: &[i16]) {
        for frame in pcm.chunks_exact(TIMECODER_CHANNELS) {
            let left = i32::from(frame[0]) << 16;
            let right = i32::from(frame[1]) << 16;

            let (primary, secondary) = if self.definition().flags.contains(Flags::SWITCH_PRIMARY) {
                (left, right)
            } else {
                (right, left)
            };

            self.process_sample(primary, secondary);
            self.update_monitor(left, right);
        }
    }

    /// Last known position, or `None` until enough consecutive bits have
    /// verified against the predicted sequence.
    pub fn position(&self) -> Option<Position> {
        if self.valid_counter <= VALID_BITS {
            return None;
        }

        let offset = self.format.lut().lookup(self.bitstream)?;

        Some(Position {
            offset,
            elapsed: f64::from(self.timecode_ticker) * self.dt,
        })
    }

    fn process_sample(&mut self, primary: i32, secondary: i32) {
        let def = self.definition();

        if def.flags.contains(Flags::OFFSET_MODULATION) {
            // The offset-modulated sinusoid does not oscillate around
            // zero. Differentiating a lightly smoothed copy gives the
            // crossing detectors a centred signal again.
            let p = self
                .deriv_primary
                .step(self.ema_primary.filter(primary, OFFSET_EMA_ALPHA));
            let s = self
                .deriv_secondary
                .step(self.ema_secondary.filter(secondary, OFFSET_EMA_ALPHA));
            self.primary.detect_crossing(p, self.zero_alpha, self.threshold);
            self.secondary.detect_crossing(s, self.zero_alpha, self.threshold);
        } else {
            self.primary
                .detect_crossing(primary, self.zero_alpha, self.threshold);
            self.secondary
                .detect_crossing(secondary, self.zero_alpha, self.threshold);
        }

        // A crossing on either axis gives the direction of the medium
        // from the phase relationship of the two tones.
        if self.primary.swapped || self.secondary.swapped {
            let mut forwards = if self.primary.swapped {
                self.primary.positive != self.secondary.positive
            } else {
                self.primary.positive == self.secondary.positive
            };

            if def.flags.contains(Flags::SWITCH_PHASE) {
                forwards = !forwards;
            }

            if forwards != self.forwards {
                self.forwards = forwards;
                self.valid_counter = 0;
            }
        }

        // Register movement with the pitch filter: a quarter chip per
        // crossing, four crossings per wave cycle.
        if !self.primary.swapped && !self.secondary.swapped {
            self.pitch.observe(0.0);
        } else {
            let mut dx = 1.0 / f64::from(def.resolution) / 4.0;
            if !self.forwards {
                dx = -dx;
            }
            self.pitch.observe(dx);
        }

        // A secondary crossing while the primary sits in the reading
        // polarity marks the middle of a chip: read one bit.
        if self.secondary.swapped
            && self.primary.positive == !def.flags.contains(Flags::SWITCH_POLARITY)
        {
            // halved to avoid clipping against the reference level
            let m = (primary / 2 - self.primary.zero / 2).abs();
            self.process_bitstream(m);
        }

        self.timecode_ticker = self.timecode_ticker.wrapping_add(1);
    }

    fn process_bitstream(&mut self, m: i32) {
        let def = self.definition();
        let b = u128::from(m > self.ref_level);

        if def.flags.contains(Flags::OFFSET_MODULATION) {
            // TODO: average this window into an envelope height and apply
            // MK2_OFFSET_FACTOR so the bit decision follows the modulated
            // offset instead of the raw peak
            self.envelope[self.envelope_at] = m;
            self.envelope_at = (self.envelope_at + 1) % ENVELOPE_WINDOW;
        }

        // The bitstream register always holds bits in the order they are
        // physically placed on the vinyl, regardless of direction. The
        // timecode register is what the LFSR says should come next.
        if self.forwards {
            self.timecode = lfsr::fwd(self.timecode, def);
            self.bitstream = (self.bitstream >> 1) | (b << (def.bits - 1));
        } else {
            self.timecode = lfsr::rev(self.timecode, def);
            self.bitstream = ((self.bitstream << 1) & def.mask()) | b;
        }

        if self.timecode == self.bitstream {
            self.valid_counter = self.valid_counter.saturating_add(1);
        } else {
            self.timecode = self.bitstream;
            self.valid_counter = 0;
        }

        // Note the last time a bit was read
        self.timecode_ticker = 0;

        // Track the envelope: an average peak over the last REF_PEAKS_AVG
        // cycles, at half the signal scale
        self.ref_level -= self.ref_level / REF_PEAKS_AVG;
        self.ref_level += m / REF_PEAKS_AVG;

        trace!(
            "{:+} zero, {:+} (ref {:+}) = {}{} ({})",
            self.primary.zero,
            m,
            self.ref_level,
            b,
            if self.valid_counter == 0 { 'x' } else { ' ' },
            self.valid_counter
        );
    }

    fn update_monitor(&mut self, left: i32, right: i32) {
        let (x, y) = if self.definition().flags.contains(Flags::OFFSET_MODULATION) {
            let dl = self.deriv_left.step(left);
            let dr = self.deriv_right.step(right);
            (
                (f64::from(dl) * 1.25) as i32,
                (f64::from(dr) * 1.25) as i32,
            )
        } else {
            (left, right)
        };

        let ref_level = self.ref_level;
        if let Some(mon) = self.monitor.as_mut() {
            mon.update(x, y, ref_level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::find_definition;
    use anyhow::Result;
    use std::f64::consts::TAU;

    const SAMPLE_RATE: u32 = 48000;

    /// Render `chips` wave cycles of the quadrature pair as the pickup
    /// would see them moving forwards at nominal speed, starting from the
    /// given position in the sequence. Chip values modulate the cycle
    /// amplitude. For `serato_2a` the primary tone sits on the right
    /// channel and leads the secondary by a quarter cycle.
    fn synthesize(
        def: &'static TimecodeDef,
        position: u32,
        chips: u32,
        gain: f64,
        dc: i16,
    ) -> Vec<i16> {
        let samples_per_chip = SAMPLE_RATE / def.resolution;

        let mut state = def.seed;
        for _ in 0..position {
            state = lfsr::fwd(state, def);
        }

        let mut pcm = Vec::with_capacity((chips * samples_per_chip) as usize * 2);
        for _ in 0..chips {
            // the chip read between this state and the next
            let bit = lfsr::parity(state, def.taps | 1) != 0;
            let amplitude = gain * if bit { 0.9 } else { 0.45 } * f64::from(i16::MAX);

            for s in 0..samples_per_chip {
                let theta = TAU * f64::from(s) / f64::from(samples_per_chip);
                let primary = amplitude * theta.sin();
                let secondary = -amplitude * theta.cos();

                pcm.push(secondary as i16 + dc); // left
                pcm.push(primary as i16 + dc); // right
            }

            state = lfsr::fwd(state, def);
        }

        pcm
    }

    fn reversed(pcm: &[i16]) -> Vec<i16> {
        let mut out = Vec::with_capacity(pcm.len());
        for frame in pcm.chunks_exact(TIMECODER_CHANNELS).rev() {
            out.extend_from_slice(frame);
        }
        out
    }

    fn decoder_for(name: &str) -> Result<Decoder> {
        Ok(Decoder::new(find_definition(name)?, 1.0, SAMPLE_RATE, false))
    }

    #[test]
    fn silence_decodes_nothing() -> Result<()> {
        let mut decoder = decoder_for("serato_2a")?;

        decoder.submit(&vec![0i16; SAMPLE_RATE as usize * 2]);

        assert_eq!(decoder.position(), None);
        assert_eq!(decoder.pitch(), 0.0);
        Ok(())
    }

    #[test]
    fn locks_onto_a_forward_signal() -> Result<()> {
        let mut decoder = decoder_for("serato_2a")?;
        let def = decoder.definition();

        let start = 1000;
        let chips = 2 * def.resolution; // two seconds
        decoder.submit(&synthesize(def, start, chips, 1.0, 0));

        let position = decoder.position().expect("decoder should have locked");
        let expected = start + chips;
        assert!(
            (i64::from(position.offset) - i64::from(expected)).abs() <= 2,
            "position {} far from {}",
            position.offset,
            expected
        );
        assert!(position.elapsed < 0.1);
        assert!(decoder.forwards());
        assert!((decoder.pitch() - 1.0).abs() < 0.05, "pitch {}", decoder.pitch());
        Ok(())
    }

    #[test]
    fn lock_needs_a_run_of_verified_bits() -> Result<()> {
        let mut decoder = decoder_for("serato_2a")?;
        let def = decoder.definition();

        let pcm = synthesize(def, 5000, 300, 1.0, 0);
        let chip_samples = (SAMPLE_RATE / def.resolution) as usize * TIMECODER_CHANNELS;

        let mut first_lock = None;
        for (chip, cycle) in pcm.chunks(chip_samples).enumerate() {
            decoder.submit(cycle);
            if decoder.position().is_some() {
                first_lock = Some(chip + 1);
                break;
            }
        }

        let first_lock = first_lock.expect("no lock after 300 chips");
        // at minimum the verification run itself has to complete
        assert!(first_lock > VALID_BITS as usize, "locked after {first_lock}");
        Ok(())
    }

    #[test]
    fn reversal_returns_to_the_starting_position() -> Result<()> {
        let mut decoder = decoder_for("serato_2a")?;
        let def = decoder.definition();

        let start = 1000;
        let chips = 2 * def.resolution;
        let forward = synthesize(def, start, chips, 1.0, 0);

        decoder.submit(&forward);
        assert!(decoder.forwards());
        let out = decoder.position().expect("no forward lock").offset;
        assert!(out > start);

        // playing the same audio backwards walks the sequence back down;
        // the register spans `bits` chips of groove, so the position
        // reported while reversing leads by the register width
        decoder.submit(&reversed(&forward));

        let expected = start + def.bits;
        let back = decoder.position().expect("no reverse lock");
        assert!(
            (i64::from(back.offset) - i64::from(expected)).abs() <= 2,
            "returned to {} instead of {}",
            back.offset,
            expected
        );
        assert!(!decoder.forwards());
        assert!((decoder.pitch() + 1.0).abs() < 0.05, "pitch {}", decoder.pitch());
        Ok(())
    }

    #[test]
    fn survives_a_level_change() -> Result<()> {
        let mut decoder = decoder_for("serato_2a")?;
        let def = decoder.definition();

        let chips = def.resolution; // one second per level
        decoder.submit(&synthesize(def, 3000, chips, 0.5, 0));
        assert!(decoder.position().is_some());

        decoder.submit(&synthesize(def, 3000 + chips, chips, 1.0, 0));

        let position = decoder.position().expect("lost lock after level change");
        let expected = 3000 + 2 * chips;
        assert!(
            (i64::from(position.offset) - i64::from(expected)).abs() <= 2,
            "position {} far from {}",
            position.offset,
            expected
        );
        Ok(())
    }

    #[test]
    fn tracks_through_a_dc_offset() -> Result<()> {
        let mut decoder = decoder_for("serato_2a")?;
        let def = decoder.definition();

        let chips = 2 * def.resolution;
        decoder.submit(&synthesize(def, 8000, chips, 0.5, 2000));

        let position = decoder.position().expect("no lock with DC offset");
        let expected = 8000 + chips;
        assert!(
            (i64::from(position.offset) - i64::from(expected)).abs() <= 2,
            "position {} far from {}",
            position.offset,
            expected
        );
        Ok(())
    }

    #[test]
    fn cycles_definitions_and_survives_catalog_teardown() -> Result<()> {
        let mut decoder = decoder_for("serato_2a")?;
        find_definition("serato_2b")?;

        decoder.cycle_definition();
        assert_eq!(decoder.definition().name, "serato_2b");
        assert_eq!(decoder.position(), None);

        // teardown forgets every table; the decoder keeps its own alive
        // through its handle
        format::free_all_lookups();
        format::free_all_lookups();

        let def = decoder.definition();
        let chips = def.resolution / 2;
        decoder.submit(&synthesize(def, 100, chips, 1.0, 0));
        assert!(decoder.position().is_some());

        // a later find simply rebuilds
        let format = find_definition("mixvibes_7inch")?;
        assert_eq!(format.lut().lookup(format.def().seed), Some(0));
        Ok(())
    }

    #[test]
    fn monitor_lifecycle_and_plotting() -> Result<()> {
        let mut decoder = decoder_for("serato_2a")?;
        let def = decoder.definition();

        decoder.init_monitor(128)?;
        assert!(matches!(
            decoder.init_monitor(128),
            Err(MonitorError::AlreadyInitialised)
        ));

        decoder.submit(&synthesize(def, 1000, def.resolution, 1.0, 0));

        let monitor = decoder.monitor().unwrap();
        assert_eq!(monitor.size(), 128);
        assert!(monitor.pixels().iter().any(|&p| p != 0));

        decoder.clear_monitor();
        assert!(decoder.monitor().is_none());
        Ok(())
    }
}
