use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use loopback_channel::{ChannelRegistry, ChannelStats};
use loopback_stream::{
    RxStream, StreamConfig, StreamError, TxStream, ARG_BUFFER_LENGTH, ARG_CHANNEL,
    ARG_NUM_BUFFERS,
};
use serde::Serialize;

use crate::cmd::PumpArgs;
use crate::exit::{
    stream_error, CliError, CliResult, DATA_INVALID, FAILURE, INTERNAL, SUCCESS, USAGE,
};
use crate::output::{print_json, print_pairs, print_table, OutputFormat};

#[derive(Debug, Default)]
struct Produced {
    frames: u64,
    elements: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Consumed {
    frames: u64,
    elements: u64,
    reads: u64,
    mismatches: u64,
}

#[derive(Serialize)]
struct PumpReport {
    channel: String,
    format: String,
    frame_bytes: usize,
    frame_count: usize,
    frames_sent: u64,
    frames_received: u64,
    elements: u64,
    bytes: u64,
    reads: u64,
    mismatches: u64,
    elapsed_ms: f64,
    msps: f64,
    interrupted: bool,
    channels: Vec<String>,
    pool: ChannelStats,
}

pub fn run(args: PumpArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;

    let mut stream_args = BTreeMap::new();
    stream_args.insert(ARG_BUFFER_LENGTH.to_string(), args.bufflen.to_string());
    stream_args.insert(ARG_NUM_BUFFERS.to_string(), args.buffers.to_string());
    stream_args.insert(ARG_CHANNEL.to_string(), args.pipe.clone());
    let config = StreamConfig::from_args(&args.item_format, &[0], &stream_args)
        .map_err(|err| stream_error("stream setup failed", err))?;

    let read_elems = args.read_elems.unwrap_or_else(|| config.mtu());
    if read_elems == 0 {
        return Err(CliError::new(USAGE, "--read-elems must be greater than zero"));
    }

    let registry = ChannelRegistry::new();
    let tx = TxStream::setup(&registry, config.clone());
    let mut rx = RxStream::setup(&registry, config.clone());
    tx.activate()
        .map_err(|err| stream_error("producer activation failed", err))?;
    rx.activate();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let start = Instant::now();
    let frames = args.frames;
    let producer = thread::Builder::new()
        .name("producer".to_string())
        .spawn({
            let running = running.clone();
            move || produce(tx, frames, &running, timeout)
        })
        .map_err(|err| CliError::new(INTERNAL, format!("failed spawning producer: {err}")))?;

    let consumed = consume(&mut rx, read_elems, timeout);
    if consumed.is_err() {
        rx.deactivate();
    }
    let produced = producer
        .join()
        .map_err(|_| CliError::new(FAILURE, "producer thread panicked"))?
        .map_err(|err| stream_error("write failed", err))?;
    let consumed = consumed.map_err(|err| stream_error("read failed", err))?;
    let elapsed = start.elapsed();
    let pool = registry
        .get(&config.channel)
        .map(|channel| channel.stats())
        .ok_or_else(|| {
            CliError::new(INTERNAL, format!("channel {} is not registered", config.channel))
        })?;

    tracing::info!(
        frames = consumed.frames,
        elements = consumed.elements,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "pump finished"
    );

    let report = PumpReport {
        channel: config.channel.clone(),
        format: config.format.to_string(),
        frame_bytes: config.frame_bytes,
        frame_count: config.frame_count,
        frames_sent: produced.frames,
        frames_received: consumed.frames,
        elements: consumed.elements,
        bytes: consumed.elements * config.item_size() as u64,
        reads: consumed.reads,
        mismatches: consumed.mismatches,
        elapsed_ms: (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
        msps: msps(consumed.elements, elapsed),
        interrupted: !running.load(Ordering::SeqCst),
        channels: registry.names(),
        pool,
    };
    print_report(&report, format);

    if report.mismatches > 0 || produced.elements != consumed.elements {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "data mismatch: sent {} elements, received {} ({} corrupted reads)",
                produced.elements, consumed.elements, consumed.mismatches
            ),
        ));
    }
    Ok(SUCCESS)
}

/// Run the producer side and close the stream however it ends.
fn produce(
    mut tx: TxStream,
    frames: u64,
    running: &AtomicBool,
    timeout: Duration,
) -> Result<Produced, StreamError> {
    let result = fill_frames(&mut tx, frames, running, timeout);
    tx.deactivate();
    result
}

/// Fill every frame with its sequence number and publish it whole.
fn fill_frames(
    tx: &mut TxStream,
    frames: u64,
    running: &AtomicBool,
    timeout: Duration,
) -> Result<Produced, StreamError> {
    let mut produced = Produced::default();

    for seq in 0..frames {
        if !running.load(Ordering::SeqCst) {
            tracing::warn!(sent = produced.frames, "interrupted, closing stream early");
            break;
        }
        let Some(buffer) = tx.acquire_write_buffer(timeout)? else {
            break;
        };
        buffer.data.fill(fill_byte(seq));
        let (handle, capacity) = (buffer.handle, buffer.capacity);
        tx.release_write_buffer(handle, capacity, Some(seq))?;

        produced.frames += 1;
        produced.elements += capacity as u64;
    }

    Ok(produced)
}

/// Drain the channel until end of stream, checking every byte against its frame tag.
fn consume(
    rx: &mut RxStream,
    read_elems: usize,
    timeout: Duration,
) -> Result<Consumed, StreamError> {
    let item_size = rx.config().item_size();
    let mut dst = vec![0u8; read_elems * item_size];
    let mut consumed = Consumed::default();

    loop {
        let outcome = rx.read(&mut dst, timeout)?;
        if outcome.elements == 0 {
            if !rx.is_active() {
                return Ok(consumed);
            }
            continue;
        }

        consumed.reads += 1;
        consumed.elements += outcome.elements as u64;
        if !outcome.more_fragments {
            consumed.frames += 1;
        }

        let expected = fill_byte(outcome.tag.unwrap_or_default());
        if dst[..outcome.elements * item_size].iter().any(|b| *b != expected) {
            tracing::warn!(tag = outcome.tag, "frame contents do not match its tag");
            consumed.mismatches += 1;
        }
    }
}

fn fill_byte(seq: u64) -> u8 {
    (seq % 251) as u8
}

fn msps(elements: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    (elements as f64 / secs / 1_000_000.0 * 1000.0).round() / 1000.0
}

fn print_report(report: &PumpReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => print_table(
            &["CHANNEL", "FORMAT", "FRAMES", "ELEMENTS", "BYTES", "ELAPSED", "MSPS", "ERRORS"],
            vec![vec![
                report.channel.clone(),
                report.format.clone(),
                format!("{}/{}", report.frames_received, report.frames_sent),
                report.elements.to_string(),
                report.bytes.to_string(),
                format!("{:.2}ms", report.elapsed_ms),
                format!("{:.3}", report.msps),
                report.mismatches.to_string(),
            ]],
        ),
        OutputFormat::Pretty => print_pairs(&[
            ("channel", report.channel.clone()),
            ("format", report.format.clone()),
            ("frames", format!("{}/{}", report.frames_received, report.frames_sent)),
            ("elements", report.elements.to_string()),
            ("elapsed", format!("{:.2}ms", report.elapsed_ms)),
            ("msps", format!("{:.3}", report.msps)),
            ("mismatches", report.mismatches.to_string()),
        ]),
        OutputFormat::Raw => println!("{}", report.elements),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("us") {
        (num, "us")
    } else if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "us")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    match unit {
        "us" => Ok(Duration::from_micros(value)),
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
