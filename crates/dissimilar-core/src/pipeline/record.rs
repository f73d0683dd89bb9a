//! The mutable unit of work: one before/after image pair and its results.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::types::{ManualCheck, PairMetrics};

/// Claim state of a pair record.
///
/// A single explicit state machine instead of separate `processed` /
/// `is_processing` booleans, so there is no torn-state window: every
/// transition happens under the owning lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Nobody has computed this pair yet
    Unclaimed,
    /// Exactly one worker is computing it right now
    Claimed,
    /// Metrics are written and final
    Done,
    /// Decode or computation failed; may be reclaimed for a retry
    Failed,
}

/// One comparison: two source files, computed metrics, reviewer verdict.
///
/// Metric fields are written only by the worker holding the claim; readers
/// see them only after observing `Done`.
pub struct PairRecord {
    pub file_one: PathBuf,
    pub file_two: PathBuf,
    pub metrics: Option<PairMetrics>,
    pub manual_check: ManualCheck,
    pub state: RecordState,
    /// Scoped SSIM heatmap artifact; the file is deleted when the record
    /// is dropped with the pipeline.
    heatmap: Option<NamedTempFile>,
}

impl PairRecord {
    /// Create an unprocessed record for a pair of files.
    pub fn new(file_one: PathBuf, file_two: PathBuf) -> Self {
        Self {
            file_one,
            file_two,
            metrics: None,
            manual_check: ManualCheck::Unknown,
            state: RecordState::Unclaimed,
            heatmap: None,
        }
    }

    /// Claim this record for processing.
    ///
    /// Single-flight: succeeds only from `Unclaimed` (or `Failed`, which is
    /// the retry path). A `Done` record is never reclaimed.
    pub fn try_claim(&mut self) -> bool {
        match self.state {
            RecordState::Unclaimed | RecordState::Failed => {
                self.state = RecordState::Claimed;
                true
            }
            RecordState::Claimed | RecordState::Done => false,
        }
    }

    /// Write metrics and finish processing. Caller must hold the claim.
    pub fn finish(&mut self, metrics: PairMetrics, heatmap: Option<NamedTempFile>) {
        debug_assert_eq!(self.state, RecordState::Claimed);
        self.metrics = Some(metrics);
        self.heatmap = heatmap;
        self.state = RecordState::Done;
    }

    /// Release the claim after a failed decode or computation so the
    /// record can be retried.
    pub fn fail(&mut self) {
        debug_assert_eq!(self.state, RecordState::Claimed);
        self.state = RecordState::Failed;
    }

    /// Path of the heatmap artifact, when one was rendered.
    pub fn heatmap_path(&self) -> Option<&Path> {
        self.heatmap.as_ref().map(|f| f.path())
    }

    /// Immutable copy of the record for consumers.
    pub fn snapshot(&self, index: usize) -> PairSnapshot {
        PairSnapshot {
            index,
            file_one: self.file_one.clone(),
            file_two: self.file_two.clone(),
            metrics: self.metrics,
            manual_check: self.manual_check,
            state: self.state,
        }
    }

    /// This record as a legacy CSV line (absolute paths, raw values,
    /// trailing separator kept for compatibility with existing tooling).
    pub fn to_csv(&self) -> String {
        fn absolute(path: &Path) -> PathBuf {
            std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
        }
        let (psnr, mean, min, variance) = match &self.metrics {
            Some(m) => (
                m.psnr.to_string(),
                m.ssim.mean.to_string(),
                m.ssim.min.to_string(),
                m.ssim.variance.to_string(),
            ),
            None => ("0".into(), "0".into(), "0".into(), "0".into()),
        };
        format!(
            "{}, {}, {}, {}, {}, {}, {}, ",
            absolute(&self.file_one).display(),
            absolute(&self.file_two).display(),
            psnr,
            mean,
            min,
            variance,
            self.manual_check
        )
    }
}

/// Read-only view of a [`PairRecord`] handed to consumers.
#[derive(Debug, Clone)]
pub struct PairSnapshot {
    pub index: usize,
    pub file_one: PathBuf,
    pub file_two: PathBuf,
    pub metrics: Option<PairMetrics>,
    pub manual_check: ManualCheck,
    pub state: RecordState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Psnr, SsimScore};
    use std::sync::{Arc, Mutex};

    fn record() -> PairRecord {
        PairRecord::new(PathBuf::from("/a/one.png"), PathBuf::from("/a/two.png"))
    }

    fn metrics() -> PairMetrics {
        PairMetrics {
            psnr: Psnr::Decibels(40.0),
            ssim: SsimScore {
                mean: 0.9,
                min: 0.5,
                variance: 0.01,
            },
        }
    }

    #[test]
    fn test_claim_lifecycle() {
        let mut r = record();
        assert!(r.try_claim());
        assert!(!r.try_claim());
        r.finish(metrics(), None);
        assert_eq!(r.state, RecordState::Done);
        assert!(!r.try_claim());
    }

    #[test]
    fn test_failed_record_is_reclaimable() {
        let mut r = record();
        assert!(r.try_claim());
        r.fail();
        assert_eq!(r.state, RecordState::Failed);
        assert!(r.try_claim());
    }

    #[tokio::test]
    async fn test_try_claim_single_flight() {
        let record = Arc::new(Mutex::new(record()));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let record = Arc::clone(&record);
            handles.push(tokio::spawn(async move {
                record.lock().unwrap().try_claim()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_csv_line() {
        let mut r = record();
        r.try_claim();
        r.finish(metrics(), None);
        r.manual_check = crate::types::ManualCheck::Ok;
        let line = r.to_csv();
        assert!(line.starts_with("/a/one.png, /a/two.png, 40, 0.9, 0.5, 0.01, OK, "));
    }

    #[test]
    fn test_csv_line_unprocessed() {
        let line = record().to_csv();
        assert!(line.contains(", 0, 0, 0, 0, UNKNOWN, "));
    }
}
