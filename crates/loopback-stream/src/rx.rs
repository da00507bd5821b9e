use std::sync::Arc;
use std::time::Duration;

use loopback_channel::{Channel, ChannelRegistry, FrameLease};

use crate::buffer::{held_matching, take_matching, BufferHandle, ReadBuffer, ReadOutcome};
use crate::config::{Role, StreamConfig};
use crate::error::{Result, StreamError};

/// Consumer endpoint: drains published frames and recycles them.
///
/// `read` hands out a frame in caller-sized slices. While a frame is held,
/// `cursor` is the byte offset of the next undelivered element and
/// `remaining` the number of elements left; the frame goes back to the free
/// list as soon as `remaining` reaches zero.
pub struct RxStream {
    config: StreamConfig,
    channel: Arc<Channel>,
    held: Option<FrameLease>,
    cursor: usize,
    remaining: usize,
    reset_requested: bool,
}

impl RxStream {
    /// Bind a consumer to the channel named in `config`, creating it if needed.
    pub fn setup(registry: &ChannelRegistry, config: StreamConfig) -> Self {
        let channel = registry.get_or_create(&config.channel);
        tracing::info!(
            role = %Role::Consumer,
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
            cursor: 0,
            remaining: 0,
            reset_requested: false,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Mark the channel active. The pool is seeded by the producer.
    pub fn activate(&self) {
        self.channel.activate();
        tracing::info!(role = %Role::Consumer, channel = %self.config.channel, "stream activated");
    }

    /// Signal end of stream to both sides of the channel.
    pub fn deactivate(&self) {
        self.channel.deactivate();
        tracing::info!(role = %Role::Consumer, channel = %self.config.channel, "stream deactivated");
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

    /// Elements of the held frame not yet delivered by [`read`](Self::read).
    pub fn buffered_elements(&self) -> usize {
        self.remaining
    }

    /// Drop any partially read frame on the next [`read`](Self::read).
    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    /// Check out the oldest published frame.
    ///
    /// Polls the ready list in `timeout` slices until a frame arrives or the
    /// channel goes inactive. `Ok(None)` means end of stream.
    pub fn acquire_read_buffer(&mut self, timeout: Duration) -> Result<Option<ReadBuffer<'_>>> {
        if self.held.is_some() {
            return Err(StreamError::BufferAlreadyAcquired);
        }

        let lease = loop {
            if let Some(lease) = self.channel.pull_ready(timeout) {
                break lease;
            }
            if !self.channel.is_active() {
                tracing::debug!(channel = %self.config.channel, "no ready frame, channel inactive");
                return Ok(None);
            }
        };

        if lease.frame().is_empty() {
            tracing::trace!(channel = %self.config.channel, tag = lease.frame().tag, "empty frame");
        }
        let handle = BufferHandle::of(&lease);
        let elements = lease.frame().len() / self.config.item_size();
        self.cursor = 0;
        self.remaining = elements;

        let frame = self.held.insert(lease).frame();
        Ok(Some(ReadBuffer {
            handle,
            data: frame.as_slice(),
            elements,
            tag: frame.tag,
        }))
    }

    /// Payload of the frame currently held under `handle`.
    pub fn buffer(&mut self, handle: BufferHandle) -> Result<&[u8]> {
        Ok(held_matching(&mut self.held, handle)?.frame().as_slice())
    }

    /// Return the held frame to the producer's free list.
    pub fn release_read_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let lease = take_matching(&mut self.held, handle)?;
        self.recycle(lease)
    }

    /// Copy up to `dst.len() / item_size` elements into `dst`.
    ///
    /// Acquires a new frame only when none is buffered. A pending reset drops
    /// the undelivered remainder first.
    pub fn read(&mut self, dst: &mut [u8], timeout: Duration) -> Result<ReadOutcome> {
        if self.reset_requested {
            self.reset_requested = false;
            if let Some(lease) = self.held.take() {
                tracing::debug!(
                    channel = %self.config.channel,
                    dropped = self.remaining,
                    "reset dropped buffered elements"
                );
                self.recycle(lease)?;
            }
        }

        if self.held.is_none() && self.acquire_read_buffer(timeout)?.is_none() {
            return Ok(ReadOutcome::default());
        }

        let item_size = self.config.item_size();
        let Some(lease) = self.held.as_ref() else {
            return Ok(ReadOutcome::default());
        };

        let count = self.remaining.min(dst.len() / item_size);
        let bytes = count * item_size;
        let tag = lease.frame().tag;
        dst[..bytes].copy_from_slice(&lease.frame().as_slice()[self.cursor..self.cursor + bytes]);
        self.cursor += bytes;
        self.remaining -= count;

        let more_fragments = self.remaining > 0;
        if !more_fragments {
            if let Some(lease) = self.held.take() {
                self.recycle(lease)?;
            }
        }

        Ok(ReadOutcome {
            elements: count,
            more_fragments,
            tag: Some(tag),
        })
    }

    fn recycle(&mut self, lease: FrameLease) -> Result<()> {
        self.cursor = 0;
        self.remaining = 0;
        self.channel.push_free(lease)?;
        Ok(())
    }
}

impl std::fmt::Debug for RxStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxStream")
            .field("config", &self.config)
            .field("holding", &self.held.is_some())
            .field("remaining", &self.remaining)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::format::ItemFormat;
    use crate::tx::TxStream;

    const WAIT: Duration = Duration::from_millis(20);

    fn pair(name: &str, frames: usize) -> (TxStream, RxStream) {
        let registry = ChannelRegistry::new();
        let config = StreamConfig::new(name, ItemFormat::Cs8, 512, frames).unwrap();
        let tx = TxStream::setup(&registry, config.clone());
        let rx = RxStream::setup(&registry, config);
        tx.activate().unwrap();
        rx.activate();
        (tx, rx)
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
    }

    #[test]
    fn streams_share_channel_by_name() {
        let (tx, rx) = pair("shared", 2);
        assert!(Arc::ptr_eq(tx.channel(), rx.channel()));
    }

    #[test]
    fn fragmented_reads_drain_one_frame() {
        let (mut tx, mut rx) = pair("fragments", 2);
        let src = pattern(200, 1);
        assert_eq!(tx.write(&src, WAIT).unwrap(), 100);

        let mut delivered = Vec::new();
        let mut counts = Vec::new();
        for call in 0..4 {
            let mut dst = [0u8; 60];
            let outcome = rx.read(&mut dst, WAIT).unwrap();
            counts.push(outcome.elements);
            delivered.extend_from_slice(&dst[..outcome.elements * 2]);

            let stats = rx.channel().stats();
            if call < 3 {
                assert!(outcome.more_fragments);
                assert_eq!(stats.checked_out, 1, "frame released early on call {call}");
            } else {
                assert!(!outcome.more_fragments);
                assert_eq!(stats.checked_out, 0);
                assert_eq!(stats.free, 2);
            }
        }

        assert_eq!(counts, vec![30, 30, 30, 10]);
        assert_eq!(delivered, src);
    }

    #[test]
    fn read_reports_frame_tag() {
        let (mut tx, mut rx) = pair("tag", 1);
        let buffer = tx.acquire_write_buffer(WAIT).unwrap().unwrap();
        let handle = buffer.handle;
        tx.release_write_buffer(handle, 4, Some(9000)).unwrap();

        let mut dst = [0u8; 8];
        let outcome = rx.read(&mut dst, WAIT).unwrap();
        assert_eq!(outcome.tag, Some(9000));
        assert_eq!(outcome.elements, 4);
    }

    #[test]
    fn reset_drops_remainder() {
        let (mut tx, mut rx) = pair("reset", 2);
        tx.write(&pattern(200, 1), WAIT).unwrap();
        let second = pattern(20, 99);
        tx.write(&second, WAIT).unwrap();

        let mut dst = [0u8; 60];
        assert_eq!(rx.read(&mut dst, WAIT).unwrap().elements, 30);
        assert_eq!(rx.buffered_elements(), 70);

        rx.request_reset();
        let mut dst = [0u8; 60];
        let outcome = rx.read(&mut dst, WAIT).unwrap();
        assert_eq!(outcome.elements, 10);
        assert_eq!(&dst[..20], second.as_slice());
        assert_eq!(rx.channel().stats().free, 2);
    }

    #[test]
    fn reset_without_buffered_data_is_harmless() {
        let (mut tx, mut rx) = pair("reset-empty", 1);
        tx.write(b"abcd", WAIT).unwrap();
        rx.request_reset();

        let mut dst = [0u8; 4];
        assert_eq!(rx.read(&mut dst, WAIT).unwrap().elements, 2);
        assert_eq!(&dst, b"abcd");
    }

    #[test]
    fn direct_access_roundtrip() {
        let (mut tx, mut rx) = pair("direct", 1);
        let buffer = tx.acquire_write_buffer(WAIT).unwrap().unwrap();
        buffer.data[..4].copy_from_slice(b"zero");
        let handle = buffer.handle;
        tx.release_write_buffer(handle, 2, None).unwrap();

        let buffer = rx.acquire_read_buffer(WAIT).unwrap().unwrap();
        assert_eq!(buffer.data, b"zero");
        assert_eq!(buffer.elements, 2);
        let handle = buffer.handle;
        assert_eq!(rx.buffer(handle).unwrap(), b"zero");

        rx.release_read_buffer(handle).unwrap();
        let stats = rx.channel().stats();
        assert_eq!((stats.free, stats.checked_out), (1, 0));
        assert!(matches!(
            rx.release_read_buffer(handle),
            Err(StreamError::BufferNotAcquired)
        ));
    }

    #[test]
    fn double_acquire_is_rejected() {
        let (mut tx, mut rx) = pair("double", 2);
        tx.write(b"ab", WAIT).unwrap();
        tx.write(b"cd", WAIT).unwrap();

        assert!(rx.acquire_read_buffer(WAIT).unwrap().is_some());
        assert!(matches!(
            rx.acquire_read_buffer(WAIT),
            Err(StreamError::BufferAlreadyAcquired)
        ));
        assert_eq!(rx.channel().stats().ready, 1);
    }

    #[test]
    fn read_after_deactivate_reports_end_of_stream() {
        let (tx, mut rx) = pair("closed", 1);
        tx.deactivate();

        let start = Instant::now();
        let mut dst = [0u8; 8];
        let outcome = rx.read(&mut dst, Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, ReadOutcome::default());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!rx.is_active());
    }

    #[test]
    fn blocked_read_wakes_on_deactivate() {
        let (tx, mut rx) = pair("wake", 1);
        let reader = thread::spawn(move || {
            let start = Instant::now();
            let mut dst = [0u8; 8];
            let outcome = rx.read(&mut dst, Duration::from_secs(10)).unwrap();
            (outcome.elements, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        tx.deactivate();

        let (elements, elapsed) = reader.join().unwrap();
        assert_eq!(elements, 0);
        assert!(elapsed < Duration::from_secs(2), "woke after {elapsed:?}");
    }

    #[test]
    fn dropping_stream_mid_frame_returns_it() {
        let (mut tx, mut rx) = pair("drop-mid", 1);
        tx.write(&pattern(100, 3), WAIT).unwrap();

        let mut dst = [0u8; 20];
        assert!(rx.read(&mut dst, WAIT).unwrap().more_fragments);
        let channel = Arc::clone(rx.channel());
        assert_eq!(channel.stats().checked_out, 1);
        drop(rx);

        let stats = channel.stats();
        assert_eq!((stats.free, stats.checked_out), (1, 0));
    }

    #[test]
    fn empty_frame_is_recycled_on_read() {
        let (mut tx, mut rx) = pair("empty-frame", 1);
        let handle = tx.acquire_write_buffer(WAIT).unwrap().unwrap().handle;
        tx.release_write_buffer(handle, 0, Some(4)).unwrap();

        let mut dst = [0u8; 8];
        let outcome = rx.read(&mut dst, WAIT).unwrap();
        assert_eq!(outcome.elements, 0);
        assert_eq!(outcome.tag, Some(4));
        assert!(!outcome.more_fragments);
        assert_eq!(rx.channel().stats().free, 1);
    }

    #[test]
    fn pool_is_conserved_under_concurrent_traffic() {
        let (mut tx, mut rx) = pair("conserve", 3);
        let channel = Arc::clone(tx.channel());

        let producer = thread::spawn(move || {
            for i in 0..100u8 {
                let src = vec![i; 64];
                assert_eq!(tx.write(&src, WAIT).unwrap(), 32);
            }
            tx
        });

        let mut seen = 0usize;
        let mut last = None;
        while seen < 100 * 32 {
            let mut dst = [0u8; 40];
            let outcome = rx.read(&mut dst, WAIT).unwrap();
            if outcome.elements > 0 {
                let value = dst[0];
                assert!(dst[..outcome.elements * 2].iter().all(|b| *b == value));
                if let Some(prev) = last {
                    assert!(value >= prev, "frames reordered: {value} after {prev}");
                }
                last = Some(value);
            }
            seen += outcome.elements;

            let stats = channel.stats();
            assert_eq!(stats.ready + stats.free + stats.checked_out, 3);
        }

        let tx = producer.join().unwrap();
        drop(tx);
        let stats = channel.stats();
        assert_eq!((stats.free, stats.ready, stats.checked_out), (3, 0, 0));
    }
}
