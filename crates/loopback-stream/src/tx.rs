use std::sync::Arc;
use std::time::Duration;

use loopback_channel::{Channel, ChannelRegistry, FrameLease};

use crate::buffer::{held_matching, take_matching, BufferHandle, WriteBuffer};
use crate::config::{Role, StreamConfig};
use crate::error::{Result, StreamError};

/// Producer endpoint: fills free frames and publishes them to the consumer.
pub struct TxStream {
    config: StreamConfig,
    channel: Arc<Channel>,
    held: Option<FrameLease>,
    next_tag: u64,
}

impl TxStream {
    /// Bind a producer to the channel named in `config`, creating it if needed.
    pub fn setup(registry: &ChannelRegistry, config: StreamConfig) -> Self {
        let channel = registry.get_or_create(&config.channel);
        tracing::info!(
            role = %Role::Producer,
            channel = %config.channel,
            format = %config.format,
            frame_bytes = config.frame_bytes,
            frames = config.frame_count,
            "stream set up"
        );
        Self {
            config,
            channel,
            held: None,
            next_tag: 0,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Seed the channel's pool with this stream's geometry and mark it active.
    pub fn activate(&self) -> Result<()> {
        self.channel
            .seed(self.config.frame_count, self.config.frame_bytes)?;
        self.channel.activate();
        tracing::info!(role = %Role::Producer, channel = %self.config.channel, "stream activated");
        Ok(())
    }

    /// Signal end of stream to both sides of the channel.
    pub fn deactivate(&self) {
        self.channel.deactivate();
        tracing::info!(role = %Role::Producer, channel = %self.config.channel, "stream deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.channel.is_active()
    }

    /// Elements per frame.
    pub fn mtu(&self) -> usize {
        self.config.mtu()
    }

    /// Frames available for direct buffer access.
    pub fn direct_access_buffers(&self) -> usize {
        self.config.frame_count
    }

    /// Check out an empty frame for writing.
    ///
    /// Polls the free list in `timeout` slices until a frame arrives or the
    /// channel goes inactive. `Ok(None)` means end of stream.
    pub fn acquire_write_buffer(&mut self, timeout: Duration) -> Result<Option<WriteBuffer<'_>>> {
        if self.held.is_some() {
            return Err(StreamError::BufferAlreadyAcquired);
        }

        let lease = loop {
            if let Some(lease) = self.channel.pull_free(timeout) {
                break lease;
            }
            if !self.channel.is_active() {
                tracing::debug!(channel = %self.config.channel, "no free frame, channel inactive");
                return Ok(None);
            }
        };

        let item_size = self.config.item_size();
        let handle = BufferHandle::of(&lease);
        let data = self.held.insert(lease).frame_mut().as_mut_slice();
        let capacity = data.len() / item_size;
        Ok(Some(WriteBuffer {
            handle,
            data,
            capacity,
        }))
    }

    /// Payload of the frame currently held under `handle`.
    pub fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut [u8]> {
        Ok(held_matching(&mut self.held, handle)?
            .frame_mut()
            .as_mut_slice())
    }

    /// Commit `elements` items of the held frame and publish it.
    ///
    /// The frame is stamped with `tag`, or the next sequence number of this
    /// stream when `None`. Ownership passes to the channel. Committing more
    /// elements than the frame holds is rejected and the frame stays held.
    pub fn release_write_buffer(
        &mut self,
        handle: BufferHandle,
        elements: usize,
        tag: Option<u64>,
    ) -> Result<()> {
        let item_size = self.config.item_size();
        let capacity = held_matching(&mut self.held, handle)?.frame().capacity() / item_size;
        if elements > capacity {
            return Err(StreamError::ElementsExceedCapacity { elements, capacity });
        }

        let mut lease = take_matching(&mut self.held, handle)?;
        let frame = lease.frame_mut();
        frame.truncate(elements * item_size);
        frame.tag = tag.unwrap_or(self.next_tag);
        self.next_tag = self.next_tag.wrapping_add(1);

        self.channel.push_ready(lease)?;
        Ok(())
    }

    /// Copy the whole elements of `src` into one frame and publish it.
    ///
    /// Returns the elements transferred: fewer than `src` holds when the frame
    /// is smaller, zero at end of stream.
    pub fn write(&mut self, src: &[u8], timeout: Duration) -> Result<usize> {
        let item_size = self.config.item_size();
        let requested = src.len() / item_size;
        if requested == 0 {
            return Ok(0);
        }

        let Some(buffer) = self.acquire_write_buffer(timeout)? else {
            return Ok(0);
        };
        let written = buffer.capacity.min(requested);
        let bytes = written * item_size;
        buffer.data[..bytes].copy_from_slice(&src[..bytes]);
        let handle = buffer.handle;

        self.release_write_buffer(handle, written, None)?;
        Ok(written)
    }
}

impl std::fmt::Debug for TxStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxStream")
            .field("config", &self.config)
            .field("holding", &self.held.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::format::ItemFormat;
    use crate::rx::RxStream;

    const WAIT: Duration = Duration::from_millis(20);

    fn config(name: &str, frames: usize) -> StreamConfig {
        StreamConfig::new(name, ItemFormat::Cs8, 512, frames).unwrap()
    }

    #[test]
    fn activate_seeds_pool() {
        let registry = ChannelRegistry::new();
        let tx = TxStream::setup(&registry, config("seed", 3));
        tx.activate().unwrap();

        let stats = tx.channel().stats();
        assert_eq!((stats.free, stats.total), (3, 3));
        assert!(stats.active);
        assert_eq!(tx.mtu(), 256);
        assert_eq!(tx.direct_access_buffers(), 3);
    }

    #[test]
    fn acquire_exposes_whole_frame() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("acquire", 1));
        tx.activate().unwrap();

        let buffer = tx.acquire_write_buffer(WAIT).unwrap().unwrap();
        assert_eq!(buffer.data.len(), 512);
        assert_eq!(buffer.capacity, 256);
        assert_eq!(tx.channel().stats().checked_out, 1);
    }

    #[test]
    fn release_truncates_and_publishes() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("release", 1));
        tx.activate().unwrap();

        let buffer = tx.acquire_write_buffer(WAIT).unwrap().unwrap();
        buffer.data[..6].copy_from_slice(b"abcdef");
        let handle = buffer.handle;
        tx.release_write_buffer(handle, 3, Some(77)).unwrap();

        let lease = tx.channel().pull_ready(Duration::ZERO).unwrap();
        assert_eq!(lease.frame().as_slice(), b"abcdef");
        assert_eq!(lease.frame().tag, 77);
    }

    #[test]
    fn untagged_frames_get_sequence_numbers() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("seq", 3));
        tx.activate().unwrap();

        for _ in 0..3 {
            assert_eq!(tx.write(b"xy", WAIT).unwrap(), 1);
        }
        let tags: Vec<u64> = (0..3)
            .map(|_| tx.channel().pull_ready(Duration::ZERO).unwrap().frame().tag)
            .collect();
        assert_eq!(tags, vec![0, 1, 2]);
    }

    #[test]
    fn write_caps_at_frame_capacity() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("short", 1));
        tx.activate().unwrap();

        let src = vec![7u8; 2048];
        assert_eq!(tx.write(&src, WAIT).unwrap(), 256);
        let lease = tx.channel().pull_ready(Duration::ZERO).unwrap();
        assert_eq!(lease.frame().len(), 512);
    }

    #[test]
    fn write_ignores_trailing_partial_item() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("partial", 1));
        tx.activate().unwrap();

        assert_eq!(tx.write(b"abc", WAIT).unwrap(), 1);
        let lease = tx.channel().pull_ready(Duration::ZERO).unwrap();
        assert_eq!(lease.frame().as_slice(), b"ab");
    }

    #[test]
    fn empty_write_does_not_acquire() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("empty", 1));
        tx.activate().unwrap();

        assert_eq!(tx.write(b"", WAIT).unwrap(), 0);
        assert_eq!(tx.channel().stats().free, 1);
    }

    #[test]
    fn acquire_on_inactive_channel_reports_end_of_stream() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("eos", 1));
        tx.activate().unwrap();
        assert_eq!(tx.write(b"ab", WAIT).unwrap(), 1);
        tx.deactivate();

        let start = Instant::now();
        assert!(tx.acquire_write_buffer(Duration::from_secs(5)).unwrap().is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(tx.write(b"ab", Duration::from_secs(5)).unwrap(), 0);
    }

    #[test]
    fn double_acquire_is_rejected() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("double", 2));
        tx.activate().unwrap();

        assert!(tx.acquire_write_buffer(WAIT).unwrap().is_some());
        assert!(matches!(
            tx.acquire_write_buffer(WAIT),
            Err(StreamError::BufferAlreadyAcquired)
        ));
        assert_eq!(tx.channel().stats().checked_out, 1);
    }

    #[test]
    fn release_without_acquire_is_rejected() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("stray", 1));
        tx.activate().unwrap();

        let handle = BufferHandle {
            slot: 0,
            generation: 1,
        };
        assert!(matches!(
            tx.release_write_buffer(handle, 1, None),
            Err(StreamError::BufferNotAcquired)
        ));
    }

    #[test]
    fn release_with_wrong_handle_keeps_frame() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("wrong", 2));
        tx.activate().unwrap();

        let handle = tx.acquire_write_buffer(WAIT).unwrap().unwrap().handle;
        let other = BufferHandle {
            slot: handle.index() + 1,
            generation: 1,
        };
        assert!(matches!(
            tx.release_write_buffer(other, 1, None),
            Err(StreamError::HandleMismatch { .. })
        ));
        assert!(tx.buffer_mut(handle).is_ok());
        tx.release_write_buffer(handle, 1, None).unwrap();
        assert_eq!(tx.channel().stats().ready, 1);
    }

    #[test]
    fn release_past_capacity_is_rejected() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("overcommit", 1));
        tx.activate().unwrap();

        let handle = tx.acquire_write_buffer(WAIT).unwrap().unwrap().handle;
        assert!(matches!(
            tx.release_write_buffer(handle, 257, None),
            Err(StreamError::ElementsExceedCapacity {
                elements: 257,
                capacity: 256
            })
        ));
        assert_eq!(tx.channel().stats().ready, 0);
        assert_eq!(tx.channel().stats().checked_out, 1);

        tx.release_write_buffer(handle, 256, None).unwrap();
        let lease = tx.channel().pull_ready(Duration::ZERO).unwrap();
        assert_eq!(lease.frame().len(), 512);
    }

    #[test]
    fn dropping_stream_returns_held_frame() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("drop", 1));
        tx.activate().unwrap();
        assert!(tx.acquire_write_buffer(WAIT).unwrap().is_some());
        let channel = Arc::clone(tx.channel());
        drop(tx);

        let stats = channel.stats();
        assert_eq!((stats.free, stats.checked_out), (1, 0));
    }

    #[test]
    fn blocked_writer_wakes_on_deactivate() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("stalled", 1));
        let rx = RxStream::setup(&registry, config("stalled", 1));
        tx.activate().unwrap();
        rx.activate();
        assert_eq!(tx.write(b"full", WAIT).unwrap(), 2);

        let writer = thread::spawn(move || {
            let start = Instant::now();
            let acquired = tx
                .acquire_write_buffer(Duration::from_secs(10))
                .map(|buffer| buffer.is_some());
            (acquired, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        rx.deactivate();

        let (acquired, elapsed) = writer.join().unwrap();
        assert!(!acquired.unwrap());
        assert!(elapsed < Duration::from_secs(2), "woke after {elapsed:?}");
        let stats = rx.channel().stats();
        assert_eq!((stats.ready, stats.free, stats.checked_out), (1, 0, 0));
    }

    #[test]
    fn second_write_blocks_until_consumer_releases() {
        let registry = ChannelRegistry::new();
        let mut tx = TxStream::setup(&registry, config("backpressure", 1));
        let mut rx = RxStream::setup(&registry, config("backpressure", 1));
        tx.activate().unwrap();
        rx.activate();

        assert_eq!(tx.write(b"first!", WAIT).unwrap(), 3);

        let (done_tx, done_rx) = mpsc::channel();
        let writer = thread::spawn(move || {
            let written = tx.write(b"second", WAIT).unwrap();
            done_tx.send(Instant::now()).unwrap();
            (tx, written)
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(150)).is_err());

        let mut dst = [0u8; 6];
        let released_at = Instant::now();
        let outcome = rx.read(&mut dst, WAIT).unwrap();
        assert_eq!(outcome.elements, 3);
        assert_eq!(&dst, b"first!");

        let completed_at = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(completed_at >= released_at);
        let (_tx, written) = writer.join().unwrap();
        assert_eq!(written, 3);
    }
}
