use std::fmt;
use std::sync::Weak;

use bytes::BytesMut;

use crate::channel::ChannelInner;

/// A fixed-capacity byte buffer with an opaque sequence tag.
///
/// The payload may be truncated by the producer to the number of bytes it
/// actually wrote; the channel restores the full capacity when the frame is
/// recycled into the free list.
#[derive(Default)]
pub struct Frame {
    payload: BytesMut,
    capacity: usize,
    /// Opaque counter stamped by the producer. Informational only.
    pub tag: u64,
}

impl Frame {
    /// Create a zero-filled frame of `capacity` bytes.
    pub fn zeroed(capacity: usize) -> Self {
        Self {
            payload: BytesMut::zeroed(capacity),
            capacity,
            tag: 0,
        }
    }

    /// Size the frame was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.payload
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// Shorten the payload to `len` bytes. Lengths past the current payload are ignored.
    pub fn truncate(&mut self, len: usize) {
        self.payload.truncate(len);
    }

    /// Grow the payload back to full capacity.
    pub(crate) fn restore(&mut self) {
        if self.payload.len() < self.capacity {
            self.payload.resize(self.capacity, 0);
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.payload.len())
            .field("capacity", &self.capacity)
            .field("tag", &self.tag)
            .finish()
    }
}

/// Exclusive ownership of one pooled frame, checked out of a channel.
///
/// A lease remembers which channel, pool generation and slot it came from so
/// that returning it can be validated against the pool's bookkeeping.
///
/// Dropping a lease instead of pushing it back puts the frame on its
/// channel's free list, so an abandoned lease never shrinks the pool.
#[derive(Debug)]
pub struct FrameLease {
    pub(crate) owner: u64,
    pub(crate) generation: u64,
    pub(crate) slot: usize,
    pub(crate) frame: Frame,
    pub(crate) home: Weak<ChannelInner>,
}

impl FrameLease {
    /// Pool slot this frame occupies while it is not checked out.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Pool generation the frame was allocated in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    /// Take the frame out and disarm the return-on-drop.
    pub(crate) fn into_parts(mut self) -> (usize, Frame) {
        self.home = Weak::new();
        (self.slot, std::mem::take(&mut self.frame))
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        if let Some(home) = self.home.upgrade() {
            home.reclaim(self.slot, self.generation, std::mem::take(&mut self.frame));
        }
    }
}
