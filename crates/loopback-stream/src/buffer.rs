use loopback_channel::FrameLease;

use crate::error::{Result, StreamError};

/// Identifies the frame a stream currently holds.
///
/// Returned by `acquire_*` and required by the matching `release_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle {
    pub(crate) slot: usize,
    pub(crate) generation: u64,
}

impl BufferHandle {
    pub(crate) fn of(lease: &FrameLease) -> Self {
        Self {
            slot: lease.slot(),
            generation: lease.generation(),
        }
    }

    /// Pool slot of the held frame.
    pub fn index(&self) -> usize {
        self.slot
    }
}

/// Writable view of an acquired producer frame.
#[derive(Debug)]
pub struct WriteBuffer<'a> {
    pub handle: BufferHandle,
    /// The whole frame payload.
    pub data: &'a mut [u8],
    /// Elements that fit in `data`.
    pub capacity: usize,
}

/// Readable view of an acquired consumer frame.
#[derive(Debug)]
pub struct ReadBuffer<'a> {
    pub handle: BufferHandle,
    /// Bytes the producer committed.
    pub data: &'a [u8],
    /// Elements in `data`.
    pub elements: usize,
    /// Sequence tag stamped by the producer.
    pub tag: u64,
}

/// Result of one [`RxStream::read`](crate::RxStream::read) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Elements copied into the destination. Zero on timeout or end of stream.
    pub elements: usize,
    /// More elements of the same frame are still buffered.
    pub more_fragments: bool,
    /// Tag of the frame the elements came from.
    pub tag: Option<u64>,
}

/// Take the held lease out of `held` if `handle` names it.
pub(crate) fn take_matching(
    held: &mut Option<FrameLease>,
    handle: BufferHandle,
) -> Result<FrameLease> {
    let lease = held.take().ok_or(StreamError::BufferNotAcquired)?;
    if BufferHandle::of(&lease) != handle {
        *held = Some(lease);
        return Err(StreamError::HandleMismatch {
            handle: handle.index(),
        });
    }
    Ok(lease)
}

/// Borrow the held lease if `handle` names it.
pub(crate) fn held_matching(
    held: &mut Option<FrameLease>,
    handle: BufferHandle,
) -> Result<&mut FrameLease> {
    let lease = held.as_mut().ok_or(StreamError::BufferNotAcquired)?;
    if BufferHandle::of(lease) != handle {
        return Err(StreamError::HandleMismatch {
            handle: handle.index(),
        });
    }
    Ok(lease)
}
