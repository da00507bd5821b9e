//! Producer and consumer stream endpoints over loopback channels.
//!
//! A stream is configured with a channel name and geometry, bound to a
//! [`Channel`](loopback_channel::Channel) through a shared
//! [`ChannelRegistry`](loopback_channel::ChannelRegistry), and then moves
//! whole frames with `acquire_*`/`release_*` or copies through them with
//! [`TxStream::write`] and [`RxStream::read`].

pub mod buffer;
pub mod config;
pub mod error;
pub mod format;
pub mod rx;
pub mod tx;

pub use buffer::{BufferHandle, ReadBuffer, ReadOutcome, WriteBuffer};
pub use config::{
    stream_args_info, ArgInfo, ArgKind, Role, StreamConfig, ARG_BUFFER_LENGTH, ARG_CHANNEL,
    ARG_NUM_BUFFERS, DEFAULT_BUFFER_LENGTH, DEFAULT_CHANNEL_NAME, DEFAULT_NUM_BUFFERS,
    FRAME_ALIGNMENT,
};
pub use error::{Result, StreamError};
pub use format::ItemFormat;
pub use rx::RxStream;
pub use tx::TxStream;
