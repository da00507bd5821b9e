//! Named in-process frame channels backed by a fixed, recyclable buffer pool.
//!
//! This is the exchange engine of loopback. A [`Channel`] owns `N` frames that
//! are only ever in one of four places:
//! - the `free` list (empty buffers waiting for the producer)
//! - the producer, while it fills a frame
//! - the `ready` list (filled buffers waiting for the consumer)
//! - the consumer, while it drains a frame
//!
//! Frames are never allocated after seeding, so the pool itself is the
//! backpressure mechanism between the two sides.

pub mod channel;
pub mod error;
pub mod frame;
pub mod registry;

pub use channel::{Channel, ChannelStats, PoolGeometry};
pub use error::{ChannelError, PushError, Result};
pub use frame::{Frame, FrameLease};
pub use registry::ChannelRegistry;
