//! In-process loopback streaming between a sample producer and consumer.
//!
//! loopback connects a transmitting stream to a receiving stream through a
//! named channel and a fixed pool of reusable frames, keeping the timeout and
//! backpressure behavior a streaming device driver would expose.
//!
//! # Crate Structure
//!
//! - [`channel`]: frames, the pooled channel and the channel registry
//! - [`stream`]: stream configuration and the producer/consumer endpoints

/// Re-export channel types.
pub mod channel {
    pub use loopback_channel::*;
}

/// Re-export stream types.
pub mod stream {
    pub use loopback_stream::*;
}
