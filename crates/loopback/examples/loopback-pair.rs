//! Producer/consumer example: streams CS16 frames across a named channel.
//!
//! Run with:
//!   cargo run --example loopback-pair

use std::thread;
use std::time::Duration;

use loopback::channel::ChannelRegistry;
use loopback::stream::{ItemFormat, RxStream, StreamConfig, TxStream};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = ChannelRegistry::new();
    let config = StreamConfig::new("pair", ItemFormat::Cs16, 2048, 4)?;

    let mut tx = TxStream::setup(&registry, config.clone());
    let mut rx = RxStream::setup(&registry, config);
    tx.activate()?;
    rx.activate();

    let producer = thread::spawn(
        move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            for burst in 0..8u8 {
                let samples = vec![burst; 1024];
                let written = tx.write(&samples, Duration::from_millis(100))?;
                eprintln!("[tx] burst {burst}: wrote {written} elements");
            }
            tx.deactivate();
            Ok(())
        },
    );

    let mut buf = vec![0u8; 300 * 4];
    loop {
        let outcome = rx.read(&mut buf, Duration::from_millis(100))?;
        if outcome.elements == 0 && !rx.is_active() {
            break;
        }
        eprintln!(
            "[rx] frame {:?}: read {} elements (more: {})",
            outcome.tag, outcome.elements, outcome.more_fragments
        );
    }

    producer
        .join()
        .expect("producer thread should not panic")
        .expect("producer should complete without error");
    eprintln!("[rx] pool after run: {:?}", rx.channel().stats());
    Ok(())
}
