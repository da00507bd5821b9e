use clap::{Args, Subcommand};
use loopback_stream::{DEFAULT_BUFFER_LENGTH, DEFAULT_CHANNEL_NAME, DEFAULT_NUM_BUFFERS};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod envinfo;
pub mod formats;
pub mod pump;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream frames from a producer thread to a consumer thread and verify them.
    Pump(PumpArgs),
    /// List supported sample formats and stream arguments.
    Formats(FormatsArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Pump(args) => pump::run(args, format),
        Command::Formats(args) => formats::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct PumpArgs {
    /// Channel name both streams attach to.
    #[arg(long, default_value = DEFAULT_CHANNEL_NAME)]
    pub pipe: String,
    /// Sample format (CS8, CS12, CS16, CF32).
    #[arg(long, default_value = "CS16")]
    pub item_format: String,
    /// Bytes per frame (multiple of 512).
    #[arg(long, default_value_t = DEFAULT_BUFFER_LENGTH)]
    pub bufflen: usize,
    /// Frames in the pool.
    #[arg(long, default_value_t = DEFAULT_NUM_BUFFERS)]
    pub buffers: usize,
    /// Frames to send before closing the stream.
    #[arg(long, default_value_t = 1000)]
    pub frames: u64,
    /// Elements requested per read. Default: one full frame.
    #[arg(long)]
    pub read_elems: Option<usize>,
    /// Per-poll timeout for acquiring frames (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub timeout: String,
}

#[derive(Args, Debug, Default)]
pub struct FormatsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}
