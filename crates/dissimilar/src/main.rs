//! Dissimilar CLI - compare two images with PSNR and SSIM.
//!
//! Used in format-migration QA to check that a re-encoding (e.g. TIFF to
//! JPEG2000) preserved visual content. Both metrics are computed by
//! default; `-p`/`-s` restrict the run to one of them.
//!
//! # Usage
//!
//! ```bash
//! # Compare two images
//! dissimilar master.tif access.jp2
//!
//! # SSIM only, with a per-window heatmap
//! dissimilar -s -m heatmap.png master.tif access.jp2
//!
//! # Machine-readable report
//! dissimilar --json master.tif access.jp2
//! ```

use std::path::PathBuf;

use clap::Parser;

use dissimilar_core::{compare_files, CompareOptions, Config, FormatRouter};

mod logging;
mod report;

/// Dissimilar - calculate SSIM and PSNR values between two images.
#[derive(Parser, Debug)]
#[command(name = "dissimilar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// First image to compare
    file_one: PathBuf,

    /// Second image to compare
    file_two: PathBuf,

    /// Calculate just psnr
    #[arg(short = 'p', long)]
    psnr: bool,

    /// Calculate just ssim
    #[arg(short = 's', long)]
    ssim: bool,

    /// File to save the ssim heatmap to (png)
    #[arg(short = 'm', long = "heatmap", value_name = "PATH")]
    heatmap: Option<PathBuf>,

    /// Print the report as JSON instead of the XML-style block
    #[arg(long)]
    json: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging from config, with CLI verbose override.
    // Note: logging isn't initialized yet, so use eprintln for config warnings.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Failed to load config: {e}\n  Using default configuration.");
            Config::default()
        }
    };
    logging::init(&config.logging, cli.verbose, cli.json_logs);

    tracing::debug!("Dissimilar v{}", dissimilar_core::VERSION);

    // Both metrics are on by default, and stay on when both flags are given.
    let (want_psnr, want_ssim) = match (cli.psnr, cli.ssim) {
        (true, false) => (true, false),
        (false, true) => (false, true),
        _ => (true, true),
    };
    let options = CompareOptions {
        psnr: want_psnr,
        ssim: want_ssim,
        heatmap: cli.heatmap.clone(),
        window_size: config.ssim.window_size,
    };

    let decoder = FormatRouter::from_config(&config);
    match compare_files(&decoder, &cli.file_one, &cli.file_two, &options).await {
        Ok(result) => {
            println!(
                "{}",
                report::format_report(&result, cli.json)?
            );
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                report::format_error(&cli.file_one, &cli.file_two, &e, cli.json)?
            );
            std::process::exit(1);
        }
    }
}
