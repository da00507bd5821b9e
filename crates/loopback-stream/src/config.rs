use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{Result, StreamError};
use crate::format::ItemFormat;

/// Frame sizes must be a multiple of this many bytes.
pub const FRAME_ALIGNMENT: usize = 512;

/// Default bytes per frame: 16 * 32 * 512.
pub const DEFAULT_BUFFER_LENGTH: usize = 16 * 32 * 512;

/// Default number of frames in a channel's pool.
pub const DEFAULT_NUM_BUFFERS: usize = 15;

/// Channel used when no `pipe` argument is given.
pub const DEFAULT_CHANNEL_NAME: &str = "default";

/// Stream argument key: bytes per frame.
pub const ARG_BUFFER_LENGTH: &str = "bufflen";
/// Stream argument key: frames in the pool.
pub const ARG_NUM_BUFFERS: &str = "buffers";
/// Stream argument key: channel name.
pub const ARG_CHANNEL: &str = "pipe";

/// Which side of a channel a stream drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

/// Validated geometry of one stream session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamConfig {
    /// Name of the channel both endpoints meet on.
    pub channel: String,
    pub format: ItemFormat,
    /// Bytes per frame.
    pub frame_bytes: usize,
    /// Frames in the pool.
    pub frame_count: usize,
}

impl StreamConfig {
    /// Validate and build a stream configuration.
    pub fn new(
        channel: impl Into<String>,
        format: ItemFormat,
        frame_bytes: usize,
        frame_count: usize,
    ) -> Result<Self> {
        let channel = channel.into();
        if channel.is_empty() {
            return Err(invalid("channel name must not be empty"));
        }
        if frame_bytes == 0 || frame_bytes % FRAME_ALIGNMENT != 0 {
            return Err(invalid(format!(
                "frame size {frame_bytes} must be a positive multiple of {FRAME_ALIGNMENT} bytes"
            )));
        }
        if frame_count == 0 {
            return Err(invalid("buffer count must be at least 1"));
        }

        Ok(Self {
            channel,
            format,
            frame_bytes,
            frame_count,
        })
    }

    /// Build a configuration from a format name, a channel selection and
    /// key/value stream arguments (`bufflen`, `buffers`, `pipe`).
    ///
    /// Missing keys fall back to their defaults; unknown keys are ignored.
    pub fn from_args(
        format: &str,
        channels: &[usize],
        args: &BTreeMap<String, String>,
    ) -> Result<Self> {
        if channels.len() > 1 || channels.first().is_some_and(|channel| *channel != 0) {
            return Err(invalid(format!("invalid channel selection {channels:?}")));
        }

        let format: ItemFormat = format.parse()?;
        let frame_bytes = parse_count(args, ARG_BUFFER_LENGTH, DEFAULT_BUFFER_LENGTH)?;
        let frame_count = parse_count(args, ARG_NUM_BUFFERS, DEFAULT_NUM_BUFFERS)?;
        let channel = args
            .get(ARG_CHANNEL)
            .cloned()
            .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_string());

        let config = Self::new(channel, format, frame_bytes, frame_count)?;
        tracing::info!(
            channel = %config.channel,
            format = %config.format,
            frame_bytes = config.frame_bytes,
            frames = config.frame_count,
            item_size = config.item_size(),
            "stream configured"
        );
        Ok(config)
    }

    /// Bytes per element.
    pub fn item_size(&self) -> usize {
        self.format.item_size()
    }

    /// Elements that fit in one frame.
    pub fn mtu(&self) -> usize {
        self.frame_bytes / self.item_size()
    }
}

fn parse_count(args: &BTreeMap<String, String>, key: &str, default: usize) -> Result<usize> {
    match args.get(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| invalid(format!("{key}={value} is not a non-negative integer"))),
    }
}

fn invalid(message: impl Into<String>) -> StreamError {
    StreamError::InvalidConfiguration(message.into())
}

/// Value type of a stream argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    Int,
    String,
}

/// Description of one recognized stream argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgInfo {
    pub key: &'static str,
    /// Default value, rendered as a string.
    pub value: String,
    pub name: &'static str,
    pub description: &'static str,
    pub units: &'static str,
    #[serde(rename = "type")]
    pub kind: ArgKind,
}

/// Stream arguments understood by [`StreamConfig::from_args`].
pub fn stream_args_info() -> Vec<ArgInfo> {
    vec![
        ArgInfo {
            key: ARG_BUFFER_LENGTH,
            value: DEFAULT_BUFFER_LENGTH.to_string(),
            name: "Buffer Size",
            description: "Number of bytes per buffer, multiples of 512 only.",
            units: "bytes",
            kind: ArgKind::Int,
        },
        ArgInfo {
            key: ARG_NUM_BUFFERS,
            value: DEFAULT_NUM_BUFFERS.to_string(),
            name: "Ring buffers",
            description: "Number of buffers in the ring.",
            units: "buffers",
            kind: ArgKind::Int,
        },
        ArgInfo {
            key: ARG_CHANNEL,
            value: DEFAULT_CHANNEL_NAME.to_string(),
            name: "Pipe name",
            description: "Name of the producer -> consumer channel. Streams pair up by name.",
            units: "",
            kind: ArgKind::String,
        },
    ]
}
