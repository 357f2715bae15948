#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Decoding runs in three layers:
//!
//! 1. **Signal conditioning**: per-channel zero-crossing detection
//!    against a low-pass tracked baseline, with an extra derivative stage
//!    for offset-modulated media.
//! 2. **Bit recovery**: one bit per wave cycle, read off the primary
//!    channel's amplitude against a tracked reference level and shifted
//!    into a rolling register in physical medium order.
//! 3. **Position lookup**: the register is checked against the next state
//!    the LFSR predicts; a long enough run of matches makes it
//!    trustworthy, and a shared reverse table maps it to an absolute
//!    position.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use timecode::decode::Decoder;
//! use timecode::format::find_definition;
//!
//! // Builds the lookup table on first use; takes a moment
//! let format = find_definition("serato_2a")?;
//!
//! let mut decoder = Decoder::new(format, 1.0, 44100, false);
//!
//! // Feed interleaved stereo PCM from the audio callback
//! let pcm = vec![0i16; 8192];
//! decoder.submit(&pcm);
//!
//! match decoder.position() {
//!     Some(position) => println!(
//!         "chip {} ({:.3}s ago), pitch {:+.3}",
//!         position.offset,
//!         position.elapsed,
//!         decoder.pitch(),
//!     ),
//!     None => println!("no lock"),
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Timecode definitions, LFSR primitives and the shared lookup catalog.
///
/// Provides [`find_definition`](format::find_definition) for resolving a
/// named format with a built lookup table, shared across decoders.
pub mod format;

/// Decoding of captured stereo audio into position, pitch and direction.
///
/// Provides the [`Decoder`](decode::Decoder) consuming interleaved PCM
/// and the [`Monitor`](decode::monitor::Monitor) scope raster.
pub mod decode;

/// Supporting filters, the pitch observer and error types.
pub mod utils;
