//! Decode barcodes from image files with the software decoder.
//!
//! Each file is tried on plain luminance first, then on the normalized
//! bitmap used by the snapshot path.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::error;

use masbarato_lib::decode::{DecodedSymbol, FallbackDecoder, SymbolFormat};
use masbarato_lib::init_logging;
use masbarato_lib::preprocess::{luminance, normalize};

#[derive(Parser)]
#[command(name = "scan_image", version, about = "Decode retail barcodes from image files")]
struct Cli {
    /// Images to decode
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn scan(decoder: &FallbackDecoder, path: &Path) -> Result<Option<(DecodedSymbol, &'static str)>> {
    let raw = image::open(path)
        .with_context(|| format!("failed to load {}", path.display()))?
        .to_rgb8();

    if let Some(symbol) = decoder.decode_luma(&luminance(&raw)) {
        return Ok(Some((symbol, "live")));
    }
    Ok(decoder
        .decode_snapshot(&normalize(&raw))
        .map(|symbol| (symbol, "snapshot")))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let formats = [
        SymbolFormat::Ean13,
        SymbolFormat::UpcA,
        SymbolFormat::Ean8,
        SymbolFormat::QrCode,
    ]
    .into_iter()
    .collect();
    let decoder = FallbackDecoder::new(&formats);

    let mut failed = false;
    for path in &cli.files {
        let file = path.display();
        match scan(&decoder, path) {
            Ok(Some((symbol, stage))) => {
                println!("{file}: {} ({:?}, {stage})", symbol.value, symbol.format)
            }
            Ok(None) => println!("{file}: no barcode found"),
            Err(err) => {
                error!("{err:#}");
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
