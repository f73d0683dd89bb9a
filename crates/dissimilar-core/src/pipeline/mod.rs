//! The pair-review pipeline: claim protocol, one-ahead precache, and
//! GUI-agnostic waiting for consumers that need a definite result.
//!
//! All shared state lives behind one owned [`ReviewPipeline`]; consumers
//! interact only through its operations. Waiting never sleep-polls: a
//! worker signals `Claimed -> Done`/`Failed` transitions on a per-record
//! `Notify`, and an abandoned wait is just a dropped future, so claim
//! state cannot be corrupted by cancellation.

mod record;

pub use record::{PairRecord, PairSnapshot, RecordState};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Notify};

use crate::config::{Config, SsimConfig};
use crate::decode::{decode_pair, DecodeService};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::pairs;
use crate::types::{ManualCheck, PairMetrics, PixelBuffer};

/// Outcome of [`ReviewPipeline::request_pair`].
#[derive(Debug)]
pub enum PairOutcome {
    /// The index is outside the queue; nothing happened
    NoSuchRecord,
    /// Precache hit: decoded buffers handed over without re-decoding
    Cached {
        snapshot: PairSnapshot,
        buffers: (PixelBuffer, PixelBuffer),
    },
    /// This call claimed the record and computed its metrics
    Computed {
        snapshot: PairSnapshot,
        buffers: (PixelBuffer, PixelBuffer),
    },
    /// Metrics are already known; the consumer should re-decode the images
    /// itself (images are deliberately not kept in memory)
    Reload { snapshot: PairSnapshot },
}

/// Coarse progress of one record's computation, published on a watch
/// channel so any UI toolkit can subscribe without the core depending on
/// a GUI runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub step: u32,
    pub steps: u32,
}

impl Progress {
    const STEPS: u32 = 3;

    fn at(index: usize, step: u32) -> Self {
        Self {
            index,
            step,
            steps: Self::STEPS,
        }
    }
}

struct RecordSlot {
    record: Mutex<PairRecord>,
    /// Signalled on every `Claimed -> Done`/`Failed` transition
    done: Notify,
}

/// Single-slot lookahead cache. The generation counter invalidates an
/// in-flight population when a newer precache request supersedes it.
#[derive(Default)]
struct PrecacheSlot {
    index: Option<usize>,
    buffers: Option<(PixelBuffer, PixelBuffer)>,
    generation: u64,
}

struct Inner {
    records: Vec<RecordSlot>,
    decoder: Arc<dyn DecodeService>,
    ssim: SsimConfig,
    precache: Mutex<PrecacheSlot>,
    /// Signalled when a precache population completes or is abandoned
    precache_done: Notify,
    progress_tx: watch::Sender<Progress>,
}

/// Owns the ordered queue of [`PairRecord`]s and schedules their
/// decode + metric computation.
pub struct ReviewPipeline {
    inner: Arc<Inner>,
}

impl ReviewPipeline {
    /// Create a pipeline over an ordered list of file pairs.
    pub fn new(
        pairs: Vec<(PathBuf, PathBuf)>,
        decoder: Arc<dyn DecodeService>,
        config: &Config,
    ) -> Self {
        let records = pairs
            .into_iter()
            .map(|(one, two)| RecordSlot {
                record: Mutex::new(PairRecord::new(one, two)),
                done: Notify::new(),
            })
            .collect();
        let (progress_tx, _) = watch::channel(Progress::default());
        Self {
            inner: Arc::new(Inner {
                records,
                decoder,
                ssim: config.ssim.clone(),
                precache: Mutex::new(PrecacheSlot::default()),
                precache_done: Notify::new(),
                progress_tx,
            }),
        }
    }

    /// Create a pipeline from an input pair-list CSV file.
    pub fn from_pair_file(
        path: &Path,
        decoder: Arc<dyn DecodeService>,
        config: &Config,
    ) -> std::io::Result<Self> {
        let pairs = pairs::load_pair_file(path)?;
        Ok(Self::new(pairs, decoder, config))
    }

    /// Number of pairs in the queue.
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Subscribe to computation progress updates.
    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.inner.progress_tx.subscribe()
    }

    /// Read-only copy of record `index`, if it exists.
    pub fn snapshot(&self, index: usize) -> Option<PairSnapshot> {
        let slot = self.inner.records.get(index)?;
        Some(slot.record.lock().expect("record lock").snapshot(index))
    }

    /// Path of the SSIM heatmap artifact for record `index`, when rendered.
    pub fn heatmap_path(&self, index: usize) -> Option<PathBuf> {
        let slot = self.inner.records.get(index)?;
        let record = slot.record.lock().expect("record lock");
        record.heatmap_path().map(Path::to_path_buf)
    }

    /// Record the reviewer's verdict. Returns false for an invalid index.
    pub fn set_manual_check(&self, index: usize, check: ManualCheck) -> bool {
        match self.inner.records.get(index) {
            Some(slot) => {
                slot.record.lock().expect("record lock").manual_check = check;
                true
            }
            None => false,
        }
    }

    /// Export all records as legacy CSV.
    pub fn export_csv<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "{}", pairs::CSV_HEADER)?;
        for slot in &self.inner.records {
            let line = slot.record.lock().expect("record lock").to_csv();
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }

    /// Entry point for a consumer that wants pair `index`.
    ///
    /// Policy, in order: precache hit, reload of a finished record, wait
    /// for another worker's in-flight claim, or claim-and-compute here.
    /// An out-of-range index is a no-op reported as `NoSuchRecord`.
    pub async fn request_pair(&self, index: usize) -> PipelineResult<PairOutcome> {
        let inner = &self.inner;
        if index >= inner.records.len() {
            tracing::trace!("No record at index {}", index);
            return Ok(PairOutcome::NoSuchRecord);
        }

        // Precache hit, or wait for a population in flight for this index.
        loop {
            // register for the notification before checking the slot, so a
            // completion between check and await cannot be missed
            let mut notified = std::pin::pin!(inner.precache_done.notified());
            notified.as_mut().enable();
            {
                let mut slot = inner.precache.lock().expect("precache lock");
                if slot.index != Some(index) {
                    break;
                }
                if let Some(buffers) = slot.buffers.take() {
                    slot.index = None;
                    tracing::trace!("Precache hit for record {}", index);
                    let snapshot = self.snapshot(index).expect("index checked");
                    return Ok(PairOutcome::Cached { snapshot, buffers });
                }
            }
            tracing::trace!("Waiting for precache of record {}", index);
            notified.await;
        }

        let slot = &inner.records[index];
        loop {
            let mut notified = std::pin::pin!(slot.done.notified());
            notified.as_mut().enable();
            enum Action {
                Reload,
                Compute,
                Wait,
            }
            let action = {
                let mut record = slot.record.lock().expect("record lock");
                match record.state {
                    RecordState::Done => Action::Reload,
                    RecordState::Claimed => Action::Wait,
                    RecordState::Unclaimed | RecordState::Failed => {
                        let claimed = record.try_claim();
                        debug_assert!(claimed);
                        Action::Compute
                    }
                }
            };
            match action {
                Action::Reload => {
                    let snapshot = self.snapshot(index).expect("index checked");
                    tracing::trace!("Reloading record {}", index);
                    return Ok(PairOutcome::Reload { snapshot });
                }
                Action::Compute => {
                    // Run on a spawned task so that cancelling this request
                    // cannot abandon the record in `Claimed`.
                    let file_one = {
                        let record = slot.record.lock().expect("record lock");
                        record.file_one.clone()
                    };
                    let task_inner = Arc::clone(inner);
                    let handle =
                        tokio::spawn(async move { task_inner.compute_record(index).await });
                    let buffers = handle.await.map_err(|e| PipelineError::Decode {
                        path: file_one,
                        message: format!("compute task join error: {}", e),
                    })??;
                    let snapshot = self.snapshot(index).expect("index checked");
                    return Ok(PairOutcome::Computed { snapshot, buffers });
                }
                Action::Wait => {
                    tracing::trace!("Waiting for in-flight claim on record {}", index);
                    notified.await;
                }
            }
        }
    }

    /// Opportunistically populate the lookahead slot for `index`.
    ///
    /// Goes through the same claim path as `request_pair`; a record that is
    /// already `Done` only gets its images decoded. Requesting a new index
    /// invalidates the previous cache entry.
    pub fn precache(&self, index: usize) {
        let inner = &self.inner;
        if index >= inner.records.len() {
            tracing::trace!("Precache: no record at index {}", index);
            return;
        }

        let token = {
            let mut slot = inner.precache.lock().expect("precache lock");
            slot.generation += 1;
            slot.index = Some(index);
            slot.buffers = None;
            slot.generation
        };
        tracing::trace!("Precaching record {}", index);

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let claimed = {
                let mut record = inner.records[index].record.lock().expect("record lock");
                match record.state {
                    RecordState::Done => false,
                    _ => record.try_claim(),
                }
            };

            let result = if claimed {
                inner.compute_record(index).await
            } else {
                // Done, or claimed by another worker which will fill in the
                // metrics; either way only the pixels are needed here.
                let (one, two) = {
                    let record = inner.records[index].record.lock().expect("record lock");
                    (record.file_one.clone(), record.file_two.clone())
                };
                decode_pair(inner.decoder.as_ref(), &one, &two).await
            };

            let mut slot = inner.precache.lock().expect("precache lock");
            if slot.generation == token {
                match result {
                    Ok(buffers) => {
                        slot.buffers = Some(buffers);
                        tracing::trace!("Precaching done for record {}", index);
                    }
                    Err(e) => {
                        slot.index = None;
                        tracing::debug!("Precache of record {} failed: {}", index, e);
                    }
                }
            } else {
                tracing::trace!("Precache of record {} superseded", index);
            }
            drop(slot);
            inner.precache_done.notify_waiters();
        });
    }

    /// Background pre-computation of every record in queue order, skipping
    /// any record another worker has already claimed or finished.
    pub fn process_all(&self) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            for index in 0..inner.records.len() {
                let claimed = {
                    let mut record = inner.records[index].record.lock().expect("record lock");
                    match record.state {
                        RecordState::Unclaimed => record.try_claim(),
                        _ => false,
                    }
                };
                if !claimed {
                    tracing::trace!("Batch worker skipping record {}", index);
                    continue;
                }
                if let Err(e) = inner.compute_record(index).await {
                    tracing::warn!("Batch worker failed on record {}: {}", index, e);
                }
            }
        })
    }
}

impl Inner {
    /// Decode both files and compute metrics for record `index`.
    ///
    /// Must only be called by the claim holder. On success the record
    /// transitions `Claimed -> Done`; on failure `Claimed -> Failed` and
    /// the error is surfaced, so a record is never left claimed forever.
    async fn compute_record(&self, index: usize) -> PipelineResult<(PixelBuffer, PixelBuffer)> {
        let slot = &self.records[index];
        let (file_one, file_two) = {
            let record = slot.record.lock().expect("record lock");
            debug_assert_eq!(record.state, RecordState::Claimed);
            (record.file_one.clone(), record.file_two.clone())
        };

        let _ = self.progress_tx.send_replace(Progress::at(index, 0));
        tracing::debug!("Processing record {}: {:?} vs {:?}", index, file_one, file_two);

        let result = self
            .decode_and_measure(&file_one, &file_two, index)
            .await;

        match result {
            Ok((metrics, heatmap, buffers)) => {
                {
                    let mut record = slot.record.lock().expect("record lock");
                    record.finish(metrics, heatmap);
                }
                slot.done.notify_waiters();
                let _ = self.progress_tx.send_replace(Progress::at(index, 3));
                Ok(buffers)
            }
            Err(e) => {
                {
                    let mut record = slot.record.lock().expect("record lock");
                    record.fail();
                }
                slot.done.notify_waiters();
                tracing::warn!("Record {} failed: {}", index, e);
                Err(e)
            }
        }
    }

    async fn decode_and_measure(
        &self,
        file_one: &Path,
        file_two: &Path,
        index: usize,
    ) -> PipelineResult<(
        PairMetrics,
        Option<tempfile::NamedTempFile>,
        (PixelBuffer, PixelBuffer),
    )> {
        let (one, two) = decode_pair(self.decoder.as_ref(), file_one, file_two).await?;
        let _ = self.progress_tx.send_replace(Progress::at(index, 1));

        let heatmap = if self.ssim.heatmaps {
            let file = tempfile::Builder::new()
                .prefix("dissimilar-ssim-")
                .suffix(".png")
                .tempfile()
                .map_err(|e| PipelineError::HeatmapWrite {
                    path: file_two.to_path_buf(),
                    message: format!("cannot create heatmap temp file: {}", e),
                })?;
            Some(file)
        } else {
            None
        };
        let heatmap_path = heatmap.as_ref().map(|f| f.path().to_path_buf());

        let window_size = self.ssim.window_size;
        let (metrics, one, two) = tokio::task::spawn_blocking(move || {
            let psnr = metrics::psnr(&one, &two)?;
            let ssim = metrics::ssim(&one, &two, window_size, heatmap_path.as_deref())?;
            Ok::<_, PipelineError>((PairMetrics { psnr, ssim }, one, two))
        })
        .await
        .map_err(|e| PipelineError::Decode {
            path: file_one.to_path_buf(),
            message: format!("metric task join error: {}", e),
        })??;
        let _ = self.progress_tx.send_replace(Progress::at(index, 2));

        Ok((metrics, heatmap, (one, two)))
    }
}
