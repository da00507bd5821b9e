use std::fmt;

use loopback_channel::ChannelError;
use loopback_stream::StreamError;

pub const SUCCESS: i32 = 0;
/// The run failed for a reason outside the other categories.
pub const FAILURE: i32 = 1;
/// Frames arrived, but their contents or counts did not match what was sent.
pub const DATA_INVALID: i32 = 60;
/// Bad arguments or stream parameters (sysexits `EX_USAGE`).
pub const USAGE: i32 = 64;
/// A stream or channel contract was broken inside the process.
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::InvalidGeometry { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        ChannelError::ForeignLease { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn stream_error(context: &str, err: StreamError) -> CliError {
    match err {
        StreamError::InvalidConfiguration(_) => CliError::new(USAGE, format!("{context}: {err}")),
        StreamError::Channel(err) => channel_error(context, err),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
