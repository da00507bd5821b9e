use loopback_stream::{stream_args_info, ArgInfo, ItemFormat};
use serde::Serialize;

use crate::cmd::FormatsArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct FormatInfo {
    name: &'static str,
    item_size: usize,
    native: bool,
}

#[derive(Serialize)]
struct FormatsOutput {
    formats: Vec<FormatInfo>,
    stream_args: Vec<ArgInfo>,
}

pub fn run(_args: FormatsArgs, format: OutputFormat) -> CliResult<i32> {
    let output = FormatsOutput {
        formats: ItemFormat::ALL
            .into_iter()
            .map(|item| FormatInfo {
                name: item.name(),
                item_size: item.item_size(),
                native: item == ItemFormat::NATIVE,
            })
            .collect(),
        stream_args: stream_args_info(),
    };

    print_formats(&output, format);
    Ok(SUCCESS)
}

fn print_formats(output: &FormatsOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => {
            print_table(
                &["FORMAT", "BYTES/ITEM", "NATIVE"],
                output
                    .formats
                    .iter()
                    .map(|f| {
                        vec![
                            f.name.to_string(),
                            f.item_size.to_string(),
                            if f.native { "yes" } else { "" }.to_string(),
                        ]
                    })
                    .collect(),
            );
            print_table(
                &["ARG", "DEFAULT", "UNITS", "DESCRIPTION"],
                output
                    .stream_args
                    .iter()
                    .map(|a| {
                        vec![
                            a.key.to_string(),
                            a.value.clone(),
                            a.units.to_string(),
                            a.description.to_string(),
                        ]
                    })
                    .collect(),
            );
        }
        OutputFormat::Pretty => {
            println!("Formats:");
            for f in &output.formats {
                let native = if f.native { " (native)" } else { "" };
                println!("  {:<6} {} bytes/item{native}", f.name, f.item_size);
            }
            println!("\nStream arguments:");
            for a in &output.stream_args {
                println!("  {:<8} default={:<8} {}", a.key, a.value, a.description);
            }
        }
        OutputFormat::Raw => {
            let names: Vec<&str> = output.formats.iter().map(|f| f.name).collect();
            println!("{}", names.join(","));
        }
    }
}
