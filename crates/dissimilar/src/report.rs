//! Report formatting for the comparison CLI.
//!
//! The text format is the legacy XML-ish block, byte-compatible with the
//! original tool's output (SSIM values to 7 decimal places, PSNR to 4);
//! `--json` emits the same data as JSON for machine consumption.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use dissimilar_core::{ComparisonReport, PipelineError, Psnr};

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Render a successful comparison report.
pub fn format_report(report: &ComparisonReport, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut out = String::new();
    writeln!(out, "<dissimilar version=\"{}\">", report.version)?;
    for file in &report.files {
        writeln!(
            out,
            "     <file loadTimeMS=\"{}\">{}</file>",
            file.load_time_ms,
            file.path.display()
        )?;
    }
    if let (Some(ssim), Some(calc_ms)) = (&report.ssim, report.ssim_calc_ms) {
        writeln!(out, "     <ssim calcTimeMS=\"{}\">", calc_ms)?;
        writeln!(out, "          <mean>{:.7}</mean>", ssim.mean)?;
        writeln!(out, "          <min>{:.7}</min>", ssim.min)?;
        writeln!(out, "          <variance>{:.7}</variance>", ssim.variance)?;
        writeln!(out, "     </ssim>")?;
    }
    if let (Some(psnr), Some(calc_ms)) = (&report.psnr, report.psnr_calc_ms) {
        let value = match psnr {
            Psnr::Identical => "inf".to_string(),
            Psnr::Decibels(db) => format!("{:.4}", db),
        };
        writeln!(out, "     <psnr calcTimeMS=\"{}\">{}</psnr>", calc_ms, value)?;
    }
    write!(out, "</dissimilar>")?;
    Ok(out)
}

/// Render a structured error block for a failed comparison.
///
/// Decode failures mark the failing file; the second file only appears if
/// a decode of it was attempted (the first file loads first, so its
/// failure means the second was never tried).
pub fn format_error(
    file_one: &Path,
    file_two: &Path,
    error: &PipelineError,
    json: bool,
) -> anyhow::Result<String> {
    let one_failed = error.path() == Some(file_one);
    let two_failed = error.path() == Some(file_two);
    let tried_two = !one_failed;

    if json {
        let mut files = vec![serde_json::json!({
            "path": absolute(file_one),
            "error": one_failed,
        })];
        if tried_two {
            files.push(serde_json::json!({
                "path": absolute(file_two),
                "error": two_failed,
            }));
        }
        return Ok(serde_json::to_string_pretty(&serde_json::json!({
            "version": dissimilar_core::VERSION,
            "error": error.to_string(),
            "files": files,
        }))?);
    }

    let mut out = String::new();
    writeln!(out, "<dissimilar version=\"{}\">", dissimilar_core::VERSION)?;
    writeln!(out, "     <error>{}</error>", error)?;
    writeln!(
        out,
        "     <file error=\"{}\">{}</file>",
        one_failed,
        absolute(file_one).display()
    )?;
    if tried_two {
        writeln!(
            out,
            "     <file error=\"{}\">{}</file>",
            two_failed,
            absolute(file_two).display()
        )?;
    }
    write!(out, "</dissimilar>")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dissimilar_core::{FileLoad, SsimScore};

    fn sample_report() -> ComparisonReport {
        ComparisonReport {
            version: "3.0.0".to_string(),
            files: vec![
                FileLoad {
                    path: PathBuf::from("/scans/one.tif"),
                    load_time_ms: 12,
                },
                FileLoad {
                    path: PathBuf::from("/scans/two.jp2"),
                    load_time_ms: 34,
                },
            ],
            psnr: Some(Psnr::Decibels(48.13080361)),
            psnr_calc_ms: Some(1),
            ssim: Some(SsimScore {
                mean: 0.99999988,
                min: 0.99999881,
                variance: 0.00000002,
            }),
            ssim_calc_ms: Some(7),
        }
    }

    #[test]
    fn test_text_report_precision() {
        let text = format_report(&sample_report(), false).unwrap();
        assert!(text.starts_with("<dissimilar version=\"3.0.0\">"));
        assert!(text.contains("<file loadTimeMS=\"12\">/scans/one.tif</file>"));
        assert!(text.contains("<mean>0.9999999</mean>"));
        assert!(text.contains("<psnr calcTimeMS=\"1\">48.1308</psnr>"));
        assert!(text.ends_with("</dissimilar>"));
    }

    #[test]
    fn test_text_report_identical_psnr() {
        let mut report = sample_report();
        report.psnr = Some(Psnr::Identical);
        let text = format_report(&report, false).unwrap();
        assert!(text.contains(">inf</psnr>"));
    }

    #[test]
    fn test_text_report_omits_unrequested_metric() {
        let mut report = sample_report();
        report.ssim = None;
        report.ssim_calc_ms = None;
        let text = format_report(&report, false).unwrap();
        assert!(!text.contains("<ssim"));
        assert!(text.contains("<psnr"));
    }

    #[test]
    fn test_json_report_roundtrip() {
        let json = format_report(&sample_report(), true).unwrap();
        let parsed: ComparisonReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.files.len(), 2);
    }

    #[test]
    fn test_error_block_first_file_failed() {
        let err = PipelineError::FileNotFound(PathBuf::from("/scans/one.tif"));
        let text = format_error(
            Path::new("/scans/one.tif"),
            Path::new("/scans/two.jp2"),
            &err,
            false,
        )
        .unwrap();
        assert!(text.contains("<file error=\"true\">/scans/one.tif</file>"));
        // second file never tried, so it is not listed
        assert!(!text.contains("two.jp2"));
    }

    #[test]
    fn test_error_block_second_file_failed() {
        let err = PipelineError::Decode {
            path: PathBuf::from("/scans/two.jp2"),
            message: "broken codestream".to_string(),
        };
        let text = format_error(
            Path::new("/scans/one.tif"),
            Path::new("/scans/two.jp2"),
            &err,
            false,
        )
        .unwrap();
        assert!(text.contains("<file error=\"false\">/scans/one.tif</file>"));
        assert!(text.contains("<file error=\"true\">/scans/two.jp2</file>"));
    }

    #[test]
    fn test_error_block_dimension_mismatch_lists_both() {
        let err = PipelineError::DimensionMismatch {
            one_width: 10,
            one_height: 10,
            two_width: 12,
            two_height: 12,
        };
        let text = format_error(Path::new("a.png"), Path::new("b.png"), &err, false).unwrap();
        assert!(text.contains("<error>Dimension mismatch: 10x10 vs 12x12</error>"));
        assert!(text.contains("<file error=\"false\">"));
    }
}
