use loopback_channel::{ChannelError, PushError};

/// Errors that can occur while configuring or driving a stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream cannot be set up with the requested parameters.
    #[error("invalid stream configuration: {0}")]
    InvalidConfiguration(String),

    /// `acquire_*` was called while a buffer was still held.
    #[error("a buffer is already acquired; release it before acquiring another")]
    BufferAlreadyAcquired,

    /// `release_*` was called with no buffer held.
    #[error("no buffer is acquired")]
    BufferNotAcquired,

    /// The handle passed to `release_*` is not the one currently held.
    #[error("buffer handle {handle} does not match the acquired buffer")]
    HandleMismatch { handle: usize },

    /// `release_write_buffer` committed more elements than the frame holds.
    #[error("cannot commit {elements} elements to a frame of {capacity}")]
    ElementsExceedCapacity { elements: usize, capacity: usize },

    /// Channel-level error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl From<PushError> for StreamError {
    fn from(err: PushError) -> Self {
        StreamError::Channel(err.into())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
