//! Job runner: the seam between the batch logic and the external engine.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ffmpeg::{FFmpegError, MediaInfo};
use super::job::ConversionJob;

/// Starts engine invocations for single (input, format) jobs.
pub trait Transcoder: Send + Sync {
    /// Start converting `job`. Must be called from within a Tokio runtime.
    fn start(&self, job: &ConversionJob) -> Result<RunningJob, FFmpegError>;
}

/// Extracts metadata from an input file.
pub trait Prober: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaInfo, FFmpegError>;
}

/// Handle for an in-flight engine invocation.
pub struct RunningJob {
    progress: mpsc::UnboundedReceiver<u8>,
    cancel: CancellationToken,
    task: JoinHandle<Result<PathBuf, FFmpegError>>,
}

impl RunningJob {
    pub fn new(
        progress: mpsc::UnboundedReceiver<u8>,
        cancel: CancellationToken,
        task: JoinHandle<Result<PathBuf, FFmpegError>>,
    ) -> Self {
        Self {
            progress,
            cancel,
            task,
        }
    }

    /// Token that force-terminates the invocation when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request forceful termination. The job may still complete successfully
    /// if it finished before the kill took effect.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Forward progress updates to `on_progress` until the job settles.
    pub async fn finish<F>(self, mut on_progress: F) -> Result<PathBuf, FFmpegError>
    where
        F: FnMut(u8),
    {
        let RunningJob {
            mut progress,
            cancel: _cancel,
            mut task,
        } = self;

        let joined = loop {
            tokio::select! {
                Some(percent) = progress.recv() => on_progress(percent),
                joined = &mut task => break joined,
            }
        };

        // Updates sent just before the task returned
        while let Ok(percent) = progress.try_recv() {
            on_progress(percent);
        }

        match joined {
            Ok(result) => result,
            Err(e) => Err(FFmpegError::TaskFailed(e.to_string())),
        }
    }
}

/// Round and clamp an engine-reported percentage to [0, 100].
pub fn clamp_percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}
