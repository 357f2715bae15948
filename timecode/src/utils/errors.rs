#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("No timecode definition named {0:?}")]
    NotFound(String),

    #[error("Not enough memory to build the lookup table for {0}")]
    BuildFailed(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    #[error("A monitor is already attached to this decoder")]
    AlreadyInitialised,

    #[error("Not enough memory for the monitor raster")]
    OutOfMemory,
}
