//! Supporting infrastructure for the decoder.
//!
//! Provides error types, the signal-conditioning filters used by the
//! offset-modulation path, and the pitch observer.

pub mod errors;
pub mod filters;
pub mod pitch;
