use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("BUILD_TIMESTAMP"),
    ", timecode ",
    env!("TIMECODE_VERSION"),
    ")"
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting and decoding DVS timecode control signals",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode a captured timecode signal and report position and pitch.
    Track(TrackArgs),

    /// List the supported timecode definitions
    Formats(FormatsArgs),
}

#[derive(Debug, Args)]
pub struct TrackArgs {
    /// Input capture, 16-bit stereo PCM (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Timecode definition to decode.
    #[arg(long, value_name = "NAME", default_value = "serato_2a")]
    pub timecode: String,

    /// Sample rate of the capture in Hz (a WAV header overrides this).
    #[arg(long, value_name = "HZ", default_value_t = 44100)]
    pub sample_rate: u32,

    /// Treat the input as headerless raw PCM even when named *.wav.
    #[arg(long)]
    pub raw: bool,

    /// The capture was taken at phono level, without a preamp.
    #[arg(long)]
    pub phono: bool,

    /// Nominal speed multiplier of the medium (1.0 for 33⅓ RPM).
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0)]
    pub speed: f64,

    /// Seconds between position reports.
    #[arg(long, value_name = "SECONDS", default_value_t = 1.0)]
    pub report_every: f64,

    /// Write the scope raster as a PGM image when the capture ends.
    #[arg(long, value_name = "PATH")]
    pub scope: Option<PathBuf>,

    /// Scope raster side length in pixels.
    #[arg(long, value_name = "PIXELS", default_value_t = 128)]
    pub scope_size: usize,
}

#[derive(Debug, Args)]
pub struct FormatsArgs {
    /// Build the lookup table for this definition and report timing.
    #[arg(long, value_name = "NAME")]
    pub build: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}
