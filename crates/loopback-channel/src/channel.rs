use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::error::{ChannelError, PushError, Result};
use crate::frame::{Frame, FrameLease};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Number and size of the frames a channel was seeded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolGeometry {
    pub frame_count: usize,
    pub frame_bytes: usize,
}

/// Point-in-time view of a channel's pool accounting.
///
/// `ready + free + checked_out == total` holds for every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub ready: usize,
    pub free: usize,
    pub checked_out: usize,
    pub total: usize,
    pub active: bool,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    Ready,
    Free,
}

impl Queue {
    fn as_str(self) -> &'static str {
        match self {
            Queue::Ready => "ready",
            Queue::Free => "free",
        }
    }
}

/// Slot table plus the two index lists threaded through it.
///
/// A slot holds `Some(frame)` exactly when its index sits in `ready` or `free`;
/// an empty slot means the frame is leased out to an endpoint.
#[derive(Debug, Default)]
struct PoolState {
    slots: Vec<Option<Frame>>,
    ready: VecDeque<usize>,
    free: VecDeque<usize>,
    geometry: Option<PoolGeometry>,
    generation: u64,
    active: bool,
}

/// Where a returned lease may go.
enum Admission {
    Current,
    Stale,
    Occupied,
}

impl PoolState {
    fn queue_mut(&mut self, queue: Queue) -> &mut VecDeque<usize> {
        match queue {
            Queue::Ready => &mut self.ready,
            Queue::Free => &mut self.free,
        }
    }

    fn take(
        &mut self,
        queue: Queue,
        owner: u64,
        home: &Weak<ChannelInner>,
    ) -> Option<FrameLease> {
        let slot = self.queue_mut(queue).pop_front()?;
        let frame = self.slots.get_mut(slot).and_then(Option::take);
        debug_assert!(frame.is_some(), "queued slot {slot} has no frame");
        frame.map(|frame| FrameLease {
            owner,
            generation: self.generation,
            slot,
            frame,
            home: home.clone(),
        })
    }

    fn admit(&self, slot: usize, generation: u64) -> Admission {
        if generation != self.generation {
            return Admission::Stale;
        }
        match self.slots.get(slot) {
            Some(None) => Admission::Current,
            _ => Admission::Occupied,
        }
    }

    /// Refill a vacant slot and enqueue it. Callers check `admit` first.
    fn store(&mut self, slot: usize, frame: Frame, queue: Queue) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(frame);
            self.queue_mut(queue).push_back(slot);
        }
    }
}

/// Pool state shared between a channel and its outstanding leases.
pub(crate) struct ChannelInner {
    name: String,
    state: Mutex<PoolState>,
    wake: Condvar,
}

impl ChannelInner {
    /// Put the frame of a dropped lease back on the free list.
    ///
    /// Frames from an older pool generation are discarded.
    pub(crate) fn reclaim(&self, slot: usize, generation: u64, mut frame: Frame) {
        frame.restore();
        let mut state = self.state.lock();
        let admission = state.admit(slot, generation);
        match admission {
            Admission::Current => state.store(slot, frame, Queue::Free),
            Admission::Stale | Admission::Occupied => return,
        }
        drop(state);

        self.wake.notify_all();
        tracing::debug!(channel = %self.name, slot, "reclaimed dropped lease");
    }
}

/// Named exchange point between one producer and one consumer.
///
/// One mutex guards both index lists and the active flag; one condition
/// variable wakes waiters of either list. The lock is never held across a
/// wait deadline or a payload copy.
pub struct Channel {
    id: u64,
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create an empty, unseeded, inactive channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            inner: Arc::new(ChannelInner {
                name: name.into(),
                state: Mutex::new(PoolState::default()),
                wake: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Populate the free list with `count` zero-filled frames of `frame_bytes` bytes.
    ///
    /// Re-seeding with the geometry already in place is a no-op and returns
    /// `Ok(false)`, so frames in flight from an earlier session survive. A
    /// different geometry starts a new pool generation: queued frames are
    /// discarded and leases still held by endpoints are dropped when returned.
    pub fn seed(&self, count: usize, frame_bytes: usize) -> Result<bool> {
        if count == 0 || frame_bytes == 0 {
            return Err(ChannelError::InvalidGeometry { count, frame_bytes });
        }
        let geometry = PoolGeometry {
            frame_count: count,
            frame_bytes,
        };

        let mut state = self.inner.state.lock();
        if state.geometry == Some(geometry) {
            tracing::debug!(
                channel = %self.inner.name,
                frames = count,
                frame_bytes,
                "pool already seeded"
            );
            return Ok(false);
        }

        state.generation += 1;
        state.slots = (0..count).map(|_| Some(Frame::zeroed(frame_bytes))).collect();
        state.ready.clear();
        state.free = (0..count).collect();
        state.geometry = Some(geometry);
        tracing::info!(
            channel = %self.inner.name,
            frames = count,
            frame_bytes,
            generation = state.generation,
            "seeded frame pool"
        );
        drop(state);

        self.inner.wake.notify_all();
        Ok(true)
    }

    /// Mark the channel active. Queue contents are untouched.
    pub fn activate(&self) {
        self.inner.state.lock().active = true;
        tracing::debug!(channel = %self.inner.name, "channel activated");
    }

    /// Mark the channel inactive and wake every waiter.
    pub fn deactivate(&self) {
        self.inner.state.lock().active = false;
        self.inner.wake.notify_all();
        tracing::debug!(channel = %self.inner.name, "channel deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Geometry the pool was last seeded with, if any.
    pub fn geometry(&self) -> Option<PoolGeometry> {
        self.inner.state.lock().geometry
    }

    /// Hand a filled frame to the consumer side.
    ///
    /// A refused lease is returned inside the error.
    pub fn push_ready(&self, lease: FrameLease) -> std::result::Result<(), PushError> {
        self.push(lease, Queue::Ready)
    }

    /// Recycle a drained frame to the producer side at full capacity.
    pub fn push_free(&self, mut lease: FrameLease) -> std::result::Result<(), PushError> {
        lease.frame.restore();
        self.push(lease, Queue::Free)
    }

    /// Take the oldest filled frame, waiting up to `timeout` while the channel is active.
    pub fn pull_ready(&self, timeout: Duration) -> Option<FrameLease> {
        self.pull(Queue::Ready, timeout)
    }

    /// Take the oldest empty frame, waiting up to `timeout` while the channel is active.
    pub fn pull_free(&self, timeout: Duration) -> Option<FrameLease> {
        self.pull(Queue::Free, timeout)
    }

    /// Snapshot of the pool accounting.
    pub fn stats(&self) -> ChannelStats {
        let state = self.inner.state.lock();
        ChannelStats {
            ready: state.ready.len(),
            free: state.free.len(),
            checked_out: state.slots.iter().filter(|slot| slot.is_none()).count(),
            total: state.slots.len(),
            active: state.active,
            generation: state.generation,
        }
    }

    fn push(&self, lease: FrameLease, queue: Queue) -> std::result::Result<(), PushError> {
        if lease.owner != self.id {
            return Err(self.refuse(lease));
        }

        let mut state = self.inner.state.lock();
        let admission = state.admit(lease.slot, lease.generation);
        match admission {
            Admission::Current => {
                let (slot, frame) = lease.into_parts();
                state.store(slot, frame, queue);
                drop(state);

                self.inner.wake.notify_all();
                tracing::trace!(
                    channel = %self.inner.name,
                    queue = queue.as_str(),
                    slot,
                    "pushed frame"
                );
                Ok(())
            }
            Admission::Stale => {
                let generation = state.generation;
                drop(state);

                tracing::debug!(
                    channel = %self.inner.name,
                    slot = lease.slot,
                    lease_generation = lease.generation,
                    generation,
                    "dropping frame from previous pool generation"
                );
                drop(lease.into_parts());
                Ok(())
            }
            Admission::Occupied => {
                drop(state);
                Err(self.refuse(lease))
            }
        }
    }

    fn refuse(&self, lease: FrameLease) -> PushError {
        let error = ChannelError::ForeignLease {
            channel: self.inner.name.clone(),
            slot: lease.slot,
        };
        PushError::new(error, lease)
    }

    fn pull(&self, queue: Queue, timeout: Duration) -> Option<FrameLease> {
        let deadline = Instant::now().checked_add(timeout);
        let home = Arc::downgrade(&self.inner);
        let mut state = self.inner.state.lock();

        loop {
            if let Some(lease) = state.take(queue, self.id, &home) {
                tracing::trace!(
                    channel = %self.inner.name,
                    queue = queue.as_str(),
                    slot = lease.slot,
                    "pulled frame"
                );
                return Some(lease);
            }
            if !state.active {
                return None;
            }

            let timed_out = match deadline {
                Some(deadline) => self.inner.wake.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.inner.wake.wait(&mut state);
                    false
                }
            };

            if timed_out {
                let lease = state.take(queue, self.id, &home);
                if lease.is_none() {
                    tracing::debug!(
                        channel = %self.inner.name,
                        queue = queue.as_str(),
                        ?timeout,
                        "no frame before deadline"
                    );
                }
                return lease;
            }
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("stats", &self.stats())
            .finish()
    }
}
