//! Batch orchestration over the file list.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::control::{BatchControl, BatchError, BatchState};
use super::coordinator::{FileConverter, FileRequest};
use super::formats::{EncodeOptions, FormatSelection, OutputFormat};
use super::job::{ConversionResult, FileEntry, FileId, FileStatus};
use super::runner::{Prober, Transcoder};

/// Events published while files are added and converted.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// Batch started with this many files to convert
    BatchStarted { total_pending: usize },
    /// File started converting
    FileStarted { id: FileId },
    /// Progress of one format of the current file
    FormatProgress {
        id: FileId,
        format: OutputFormat,
        percent: u8,
    },
    /// Overall batch progress (0-100)
    OverallProgress(u8),
    /// File settled
    FileFinished { id: FileId, status: FileStatus },
    /// Batch finished, normally or after cancellation
    BatchFinished(BatchSummary),
}

/// Parameters of one batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub formats: FormatSelection,
    /// Defaults to each input file's own directory
    pub output_dir: Option<PathBuf>,
    pub options: EncodeOptions,
}

/// Final tally of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total_pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    fn record(&mut self, status: &FileStatus) {
        match status {
            FileStatus::Success => self.succeeded += 1,
            FileStatus::Error(_) => self.failed += 1,
            _ => self.cancelled += 1,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} cancelled ({} pending)",
            self.succeeded, self.failed, self.cancelled, self.total_pending
        )
    }
}

/// Requests cancellation of the running batch from another task or thread.
#[derive(Clone)]
pub struct CancelHandle(Arc<BatchControl>);

impl CancelHandle {
    pub fn request_cancel(&self) -> bool {
        self.0.request_cancel()
    }
}

/// Owns the file list and converts it one file at a time.
#[derive(Clone)]
pub struct BatchOrchestrator {
    files: Arc<Mutex<Vec<FileEntry>>>,
    control: Arc<BatchControl>,
    converter: FileConverter,
    prober: Arc<dyn Prober>,
    event_tx: Sender<BatchEvent>,
    event_rx: Receiver<BatchEvent>,
}

impl BatchOrchestrator {
    pub fn new(transcoder: Arc<dyn Transcoder>, prober: Arc<dyn Prober>) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            files: Arc::new(Mutex::new(Vec::new())),
            control: Arc::new(BatchControl::new()),
            converter: FileConverter::new(transcoder),
            prober,
            event_tx,
            event_rx,
        }
    }

    /// Probe and add files, skipping paths already in the list. A file that
    /// fails to probe is still added, marked as failed.
    pub fn add_files<I>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut added = 0;
        for path in paths {
            if self.files.lock().iter().any(|f| f.path == path) {
                log::debug!("{:?} is already in the list", path);
                continue;
            }

            let entry = match self.prober.probe(&path) {
                Ok(info) => {
                    log::info!(
                        "Added {} ({}x{}, {}, {})",
                        info.file_name,
                        info.width,
                        info.height,
                        info.codec,
                        if info.has_alpha { "alpha" } else { "no alpha" }
                    );
                    FileEntry::new(path, Some(info))
                }
                Err(e) => {
                    log::warn!("Probe failed for {:?}: {}", path, e);
                    let mut entry = FileEntry::new(path, None);
                    entry.fail(format!("Probe failed: {}", e));
                    entry
                }
            };

            self.files.lock().push(entry);
            added += 1;
        }
        added
    }

    /// Remove a file from the list. The file being converted cannot be removed.
    pub fn remove_file(&self, id: FileId) -> bool {
        let mut files = self.files.lock();
        match files.iter().position(|f| f.id == id) {
            Some(idx) if files[idx].status.is_converting() => {
                log::warn!("Cannot remove {} while it is converting", files[idx].file_name());
                false
            }
            Some(idx) => {
                files.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Get all files (for display).
    pub fn files(&self) -> Vec<FileEntry> {
        self.files.lock().clone()
    }

    pub fn file(&self, id: FileId) -> Option<FileEntry> {
        self.files.lock().iter().find(|f| f.id == id).cloned()
    }

    pub fn batch_state(&self) -> BatchState {
        self.control.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_active()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.control))
    }

    /// Stop starting files and kill the in-flight job. Idempotent.
    pub fn request_cancel(&self) -> bool {
        self.control.request_cancel()
    }

    /// Receiver for a presentation thread that blocks on events.
    pub fn events(&self) -> Receiver<BatchEvent> {
        self.event_rx.clone()
    }

    /// Drain pending events (non-blocking).
    pub fn poll_events(&self) -> Vec<BatchEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Validate `request` and move to Running. Files already converted are
    /// left out of the batch.
    pub fn begin(&self, request: BatchRequest) -> Result<BatchRun<'_>, BatchError> {
        let formats = request.formats.selected();
        if formats.is_empty() {
            return Err(BatchError::NoFormatSelected);
        }

        let pending: Vec<FileId> = self
            .files
            .lock()
            .iter()
            .filter(|f| !f.status.is_success())
            .map(|f| f.id)
            .collect();

        self.control.begin(pending.len())?;
        log::info!(
            "Starting batch: {} file(s), formats {:?}",
            pending.len(),
            formats
        );
        self.emit(BatchEvent::BatchStarted {
            total_pending: pending.len(),
        });

        Ok(BatchRun {
            orchestrator: self,
            summary: BatchSummary {
                total_pending: pending.len(),
                ..Default::default()
            },
            pending,
            formats,
            request,
            finished: false,
        })
    }

    /// Run a whole batch.
    pub async fn start(&self, request: BatchRequest) -> Result<BatchSummary, BatchError> {
        Ok(self.begin(request)?.run().await)
    }

    fn emit(&self, event: BatchEvent) {
        // The orchestrator holds a receiver, so the channel never disconnects
        let _ = self.event_tx.send(event);
    }

    fn update_file<F>(&self, id: FileId, update: F)
    where
        F: FnOnce(&mut FileEntry),
    {
        if let Some(entry) = self.files.lock().iter_mut().find(|f| f.id == id) {
            update(entry);
        }
    }

    fn report_progress(&self, id: FileId, format: OutputFormat, percent: u8, formats: &[OutputFormat]) {
        let mut fraction = 0.0;
        self.update_file(id, |entry| {
            entry.update_progress(format, percent);
            fraction = entry.fraction_of(formats);
        });
        self.emit(BatchEvent::FormatProgress { id, format, percent });
        self.emit(BatchEvent::OverallProgress(
            self.control.snapshot().overall_percent(fraction),
        ));
    }
}

/// A batch that has moved to Running and is ready to execute.
pub struct BatchRun<'a> {
    orchestrator: &'a BatchOrchestrator,
    request: BatchRequest,
    formats: Vec<OutputFormat>,
    pending: Vec<FileId>,
    summary: BatchSummary,
    finished: bool,
}

impl BatchRun<'_> {
    /// Convert every pending file in list order.
    pub async fn run(mut self) -> BatchSummary {
        let orch = self.orchestrator;
        let pending = std::mem::take(&mut self.pending);

        for id in pending {
            let Some(entry) = orch.file(id) else {
                // Removed from the list after the batch began
                self.settle(id, FileStatus::Cancelled);
                continue;
            };

            if orch.control.is_cancel_requested() {
                orch.update_file(id, FileEntry::cancel);
                self.settle(id, FileStatus::Cancelled);
                continue;
            }

            orch.update_file(id, |f| f.start(&self.formats));
            orch.control.set_current(Some(id));
            orch.emit(BatchEvent::FileStarted { id });

            let output_dir = self.output_dir_for(&entry.path);
            let formats = self.formats.as_slice();
            let request = FileRequest {
                input: &entry.path,
                duration_secs: entry.info.as_ref().map(|i| i.duration_secs),
                formats,
                output_dir: &output_dir,
                options: &self.request.options,
            };

            let results = orch
                .converter
                .convert_file(request, &orch.control, |format, percent| {
                    orch.report_progress(id, format, percent, formats)
                })
                .await;

            let status = classify(&results, orch.control.is_cancel_requested());
            match &status {
                FileStatus::Success => {
                    log::info!("{} converted", entry.file_name());
                    orch.update_file(id, |f| f.complete(formats));
                }
                FileStatus::Error(message) => {
                    log::warn!("{} failed: {}", entry.file_name(), message);
                    orch.update_file(id, |f| f.fail(message.clone()));
                }
                _ => {
                    log::info!("{} cancelled", entry.file_name());
                    orch.update_file(id, FileEntry::cancel);
                }
            }
            self.settle(id, status);
        }

        orch.control.finish();
        self.finished = true;
        log::info!("Batch finished: {}", self.summary);
        orch.emit(BatchEvent::BatchFinished(self.summary));
        self.summary
    }

    fn settle(&mut self, id: FileId, status: FileStatus) {
        let orch = self.orchestrator;
        self.summary.record(&status);
        let state = orch.control.file_done();
        orch.emit(BatchEvent::FileFinished { id, status });
        orch.emit(BatchEvent::OverallProgress(state.overall_percent(0.0)));
    }

    fn output_dir_for(&self, input: &Path) -> PathBuf {
        self.request.output_dir.clone().unwrap_or_else(|| {
            input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }
}

impl Drop for BatchRun<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Dropped before completing: stop the engine and return to Idle
        let orch = self.orchestrator;
        orch.control.request_cancel();
        if let Some(id) = orch.control.snapshot().current_file {
            orch.update_file(id, FileEntry::cancel);
        }
        orch.control.finish();
    }
}

/// Decide a file's status from its per-format results. Cancellation wins over
/// failure; a job that completed despite a kill request still counts.
fn classify(results: &[ConversionResult], cancel_requested: bool) -> FileStatus {
    if !results.is_empty() && results.iter().all(ConversionResult::is_success) {
        return FileStatus::Success;
    }
    if cancel_requested || results.iter().any(ConversionResult::is_cancelled) {
        return FileStatus::Cancelled;
    }
    let message = results
        .iter()
        .filter_map(|r| r.error().map(|e| format!("{}: {}", r.format, e)))
        .collect::<Vec<_>>()
        .join("; ");
    FileStatus::Error(message)
}
