use std::collections::BTreeMap;

use loopback_stream::{DEFAULT_BUFFER_LENGTH, DEFAULT_CHANNEL_NAME, DEFAULT_NUM_BUFFERS};
use serde::Serialize;

use crate::cmd::EnvinfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct PlatformInfo {
    os: String,
    arch: String,
    cpus: usize,
}

#[derive(Serialize)]
struct StreamDefaults {
    channel: &'static str,
    bufflen: usize,
    buffers: usize,
}

#[derive(Serialize)]
struct EnvInfoOutput {
    version: String,
    target: String,
    rust_version: String,
    git_hash: String,
    platform: PlatformInfo,
    defaults: StreamDefaults,
    environment: BTreeMap<String, Option<String>>,
}

pub fn run(_args: EnvinfoArgs, format: OutputFormat) -> CliResult<i32> {
    let mut env = BTreeMap::new();
    env.insert(
        "LOOPBACK_LOG_LEVEL".to_string(),
        std::env::var("LOOPBACK_LOG_LEVEL").ok(),
    );

    let output = EnvInfoOutput {
        version: env!("CARGO_PKG_VERSION").to_string(),
        target: target_triple(),
        rust_version: option_env!("RUSTC_VERSION")
            .unwrap_or("unknown")
            .to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        platform: PlatformInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        },
        defaults: StreamDefaults {
            channel: DEFAULT_CHANNEL_NAME,
            bufflen: DEFAULT_BUFFER_LENGTH,
            buffers: DEFAULT_NUM_BUFFERS,
        },
        environment: env,
    };

    print_envinfo(&output, format);
    Ok(SUCCESS)
}

fn target_triple() -> String {
    if let Some(target) = option_env!("LOOPBACK_BUILD_TARGET") {
        return target.to_string();
    }
    format!(
        "{}-unknown-{}",
        std::env::consts::ARCH,
        std::env::consts::OS
    )
}

fn print_envinfo(output: &EnvInfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("loopback environment\n");
            println!("  Version:    {}", output.version);
            println!("  Target:     {}", output.target);
            println!("  Rust:       {}", output.rust_version);
            println!("  Git hash:   {}", output.git_hash);
            println!(
                "  Platform:   {} ({}, {} cpus)",
                output.platform.os, output.platform.arch, output.platform.cpus
            );
            println!("\n  Stream defaults:");
            println!("    pipe       {}", output.defaults.channel);
            println!("    bufflen    {}", output.defaults.bufflen);
            println!("    buffers    {}", output.defaults.buffers);
            println!("\n  Environment:");
            for (k, v) in &output.environment {
                println!("    {:<20} {}", k, v.as_deref().unwrap_or("(not set)"));
            }
        }
        OutputFormat::Raw => println!("{}", output.version),
    }
}
