use loopback_stream::{ItemFormat, FRAME_ALIGNMENT};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("loopback {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    for (key, value) in build_details() {
        println!("{key}: {value}");
    }
    Ok(SUCCESS)
}

/// Build provenance plus the stream capabilities compiled into this binary.
fn build_details() -> Vec<(&'static str, String)> {
    let formats = ItemFormat::ALL
        .map(ItemFormat::name)
        .join(",");

    vec![
        ("name", env!("CARGO_PKG_NAME").to_string()),
        ("version", env!("CARGO_PKG_VERSION").to_string()),
        (
            "target",
            option_env!("LOOPBACK_BUILD_TARGET")
                .unwrap_or("unknown")
                .to_string(),
        ),
        ("rustc", option_env!("RUSTC_VERSION").unwrap_or("unknown").to_string()),
        ("git_hash", option_env!("GIT_HASH").unwrap_or("unknown").to_string()),
        ("native_format", ItemFormat::NATIVE.to_string()),
        ("formats", formats),
        ("frame_alignment", FRAME_ALIGNMENT.to_string()),
    ]
}
