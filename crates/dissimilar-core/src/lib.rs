//! Dissimilar Core - image comparison library for format-migration QA.
//!
//! Dissimilar compares pairs of raster images and produces two objective
//! similarity metrics, PSNR and windowed SSIM, so that archival workflows
//! can validate that a re-encoding preserved visual content.
//!
//! # Architecture
//!
//! ```text
//! Pair list -> Decode (native or external) -> PSNR / SSIM (+ heatmap) -> CSV
//! ```
//!
//! The review pipeline adds a single-flight claim protocol and a one-ahead
//! precache on top, so an interactive reviewer never waits for a decode
//! that could have happened while they looked at the previous pair.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dissimilar_core::{compare_metrics, Config, FormatRouter};
//!
//! #[tokio::main]
//! async fn main() -> dissimilar_core::Result<()> {
//!     let config = Config::load()?;
//!     let decoder = FormatRouter::from_config(&config);
//!     let metrics = compare_metrics(&decoder, "a.tif".as_ref(), "b.jp2".as_ref()).await?;
//!     println!("SSIM mean: {}", metrics.ssim.mean);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod compare;
pub mod config;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod pairs;
pub mod pipeline;
pub mod stats;
pub mod types;

// Re-exports for convenient access
pub use compare::{compare_files, compare_metrics, CompareOptions};
pub use config::Config;
pub use decode::{DecodeService, ExternalDecoder, FormatRouter, NativeDecoder};
pub use error::{ConfigError, DissimilarError, PipelineError, PipelineResult, Result};
pub use pipeline::{PairOutcome, PairSnapshot, Progress, RecordState, ReviewPipeline};
pub use types::{
    ComparisonReport, FileLoad, ManualCheck, PairMetrics, PixelBuffer, Psnr, SsimScore,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
