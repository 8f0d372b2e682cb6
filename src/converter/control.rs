//! Batch state machine shared between the batch loop and cancel requests.

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::job::FileId;
use super::runner::clamp_percent;

/// Reasons a batch cannot start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("No output format selected")]
    NoFormatSelected,
    #[error("A batch is already running")]
    AlreadyRunning,
}

/// Snapshot of the batch bookkeeping. Reset to the default when a batch ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchState {
    /// Whether a batch is running
    pub active: bool,
    /// Whether the user asked to stop
    pub cancel_requested: bool,
    /// File currently being converted
    pub current_file: Option<FileId>,
    /// Files that were not yet converted when the batch started
    pub total_pending: usize,
    /// Files settled so far (success, error or cancelled)
    pub done_count: usize,
}

impl BatchState {
    /// Overall progress given the current file's completion fraction.
    pub fn overall_percent(&self, current_fraction: f64) -> u8 {
        if self.total_pending == 0 {
            return 100;
        }
        let done = self.done_count as f64 + current_fraction.clamp(0.0, 1.0);
        clamp_percent(done / self.total_pending as f64 * 100.0)
    }
}

#[derive(Default)]
struct Inner {
    state: BatchState,
    // Kill switch of the one engine invocation allowed at a time
    active_job: Option<CancellationToken>,
}

/// Idle/Running state machine for one batch at a time.
#[derive(Default)]
pub struct BatchControl {
    inner: Mutex<Inner>,
}

impl BatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition Idle -> Running.
    pub fn begin(&self, total_pending: usize) -> Result<(), BatchError> {
        let mut inner = self.inner.lock();
        if inner.state.active {
            return Err(BatchError::AlreadyRunning);
        }
        inner.state = BatchState {
            active: true,
            cancel_requested: false,
            current_file: None,
            total_pending,
            done_count: 0,
        };
        inner.active_job = None;
        Ok(())
    }

    /// Transition Running -> Idle, clearing the cancel flag and file pointer.
    pub fn finish(&self) {
        let mut inner = self.inner.lock();
        inner.state = BatchState::default();
        inner.active_job = None;
    }

    /// Stop starting new work and kill the in-flight job. Idempotent; does
    /// nothing when no batch is running.
    pub fn request_cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.active {
            return false;
        }
        if !inner.state.cancel_requested {
            log::info!("Cancellation requested");
        }
        inner.state.cancel_requested = true;
        if let Some(token) = &inner.active_job {
            token.cancel();
        }
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.lock().state.cancel_requested
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().state.active
    }

    pub fn set_current(&self, file: Option<FileId>) {
        self.inner.lock().state.current_file = file;
    }

    /// Hold the kill switch of the job that was just started. A cancel that
    /// arrived before the job existed is applied immediately.
    pub fn attach_job(&self, token: CancellationToken) {
        let mut inner = self.inner.lock();
        if inner.state.cancel_requested {
            token.cancel();
        }
        inner.active_job = Some(token);
    }

    /// Drop the kill switch once the job has settled.
    pub fn release_job(&self) {
        self.inner.lock().active_job = None;
    }

    pub fn has_active_job(&self) -> bool {
        self.inner.lock().active_job.is_some()
    }

    /// Record one settled file and return the updated state.
    pub fn file_done(&self) -> BatchState {
        let mut inner = self.inner.lock();
        inner.state.done_count += 1;
        inner.state.current_file = None;
        inner.state.clone()
    }

    pub fn snapshot(&self) -> BatchState {
        self.inner.lock().state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_rejects_second_batch() {
        let control = BatchControl::new();
        control.begin(3).unwrap();
        assert_eq!(control.begin(1), Err(BatchError::AlreadyRunning));

        control.finish();
        assert!(control.begin(1).is_ok());
    }

    #[test]
    fn test_cancel_is_ignored_when_idle() {
        let control = BatchControl::new();
        assert!(!control.request_cancel());
        assert!(!control.is_cancel_requested());
    }

    #[test]
    fn test_cancel_kills_attached_job() {
        let control = BatchControl::new();
        control.begin(2).unwrap();

        let token = CancellationToken::new();
        control.attach_job(token.clone());
        assert!(control.request_cancel());
        assert!(control.request_cancel());
        assert!(token.is_cancelled());

        control.release_job();
        assert!(!control.has_active_job());
    }

    #[test]
    fn test_attach_after_cancel_kills_immediately() {
        let control = BatchControl::new();
        control.begin(1).unwrap();
        control.request_cancel();

        let token = CancellationToken::new();
        control.attach_job(token.clone());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_finish_resets_state() {
        let control = BatchControl::new();
        control.begin(2).unwrap();
        control.set_current(Some(FileId(7)));
        control.request_cancel();
        control.file_done();

        control.finish();
        assert_eq!(control.snapshot(), BatchState::default());
    }

    #[test]
    fn test_overall_percent() {
        let mut state = BatchState {
            active: true,
            total_pending: 4,
            ..Default::default()
        };
        assert_eq!(state.overall_percent(0.0), 0);
        assert_eq!(state.overall_percent(0.5), 13);

        state.done_count = 3;
        assert_eq!(state.overall_percent(1.0), 100);
        assert_eq!(state.overall_percent(7.0), 100);

        state.total_pending = 0;
        assert_eq!(state.overall_percent(0.0), 100);
    }
}
