use crate::frame::FrameLease;

/// Errors that can occur while exchanging frames on a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The lease was not issued by this channel, or its slot is already occupied.
    #[error("lease for slot {slot} does not belong to channel \"{channel}\"")]
    ForeignLease { channel: String, slot: usize },

    /// The pool geometry cannot hold any data.
    #[error("invalid pool geometry ({count} frames of {frame_bytes} bytes)")]
    InvalidGeometry { count: usize, frame_bytes: usize },
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// A push the channel refused. The lease comes back untouched.
///
/// Converting into [`ChannelError`] drops the lease, which returns its frame
/// to the channel that issued it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct PushError {
    error: ChannelError,
    lease: FrameLease,
}

impl PushError {
    pub(crate) fn new(error: ChannelError, lease: FrameLease) -> Self {
        Self { error, lease }
    }

    pub fn error(&self) -> &ChannelError {
        &self.error
    }

    /// Recover the refused lease.
    pub fn into_lease(self) -> FrameLease {
        self.lease
    }
}

impl From<PushError> for ChannelError {
    fn from(err: PushError) -> Self {
        err.error
    }
}
