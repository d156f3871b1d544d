//! Conversion helper between raw DNS payloads and their base64url form.
//!
//! Useful for preparing `?dns=` GET parameters from captured wire-format
//! queries, and for decoding them back. The direction is auto-detected:
//! input that decodes as unpadded base64url is treated as text, anything
//! else as binary.

use anyhow::{Context, Result};
use clap::Parser;
use data_encoding::BASE64URL_NOPAD;
use std::fs;
use std::path::PathBuf;

/// b64 - convert DNS payloads between binary and base64url
#[derive(Parser, Debug)]
#[command(name = "b64", version, about)]
struct Cli {
    /// Input file name (required)
    #[arg(long)]
    infile: PathBuf,

    /// Output file name (required)
    #[arg(long)]
    outfile: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let payload = fs::read(&cli.infile)
        .with_context(|| format!("reading input file '{}'", cli.infile.display()))?;

    let decoded = std::str::from_utf8(&payload)
        .ok()
        .and_then(|text| BASE64URL_NOPAD.decode(text.trim_end().as_bytes()).ok());

    let converted = match decoded {
        Some(binary) => {
            println!(
                "input file '{}': looks like base64 format, converting to binary",
                cli.infile.display()
            );
            binary
        }
        None => {
            println!(
                "input file '{}': looks like binary format, converting to base64",
                cli.infile.display()
            );
            BASE64URL_NOPAD.encode(&payload).into_bytes()
        }
    };

    fs::write(&cli.outfile, converted)
        .with_context(|| format!("writing output file '{}'", cli.outfile.display()))?;

    println!("conversion done");
    Ok(())
}
