//! Scripted engine and prober used by the converter tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use super::ffmpeg::{FFmpegError, MediaInfo};
use super::formats::OutputFormat;
use super::job::ConversionJob;
use super::runner::{Prober, RunningJob, Transcoder};

/// What a scripted job does once started.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    /// Write a partial output file, then fail with the message
    Fail(String),
    /// Block until killed, then fail
    HangUntilKilled,
    /// Block until killed, then report success anyway
    SucceedDespiteKill,
}

pub struct ScriptedTranscoder {
    scripts: HashMap<(String, OutputFormat), Script>,
    invocations: Mutex<Vec<(PathBuf, OutputFormat)>>,
    /// Notified every time a job starts
    pub started: Arc<Notify>,
}

impl ScriptedTranscoder {
    /// Every job succeeds unless scripted otherwise.
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            invocations: Mutex::new(Vec::new()),
            started: Arc::new(Notify::new()),
        }
    }

    /// Script the job for input file stem `stem` and `format`.
    pub fn script(mut self, stem: &str, format: OutputFormat, script: Script) -> Self {
        self.scripts.insert((stem.to_string(), format), script);
        self
    }

    /// Output paths and formats of every job started so far.
    pub fn invocations(&self) -> Vec<(PathBuf, OutputFormat)> {
        self.invocations.lock().clone()
    }
}

impl Transcoder for ScriptedTranscoder {
    fn start(&self, job: &ConversionJob) -> Result<RunningJob, FFmpegError> {
        self.invocations
            .lock()
            .push((job.output_path.clone(), job.format));

        let stem = job
            .input_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let script = self
            .scripts
            .get(&(stem, job.format))
            .cloned()
            .unwrap_or(Script::Succeed);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let output = job.output_path.clone();

        let task = tokio::spawn(async move {
            let _ = tx.send(50);
            match script {
                Script::Succeed => Ok(output),
                Script::Fail(message) => {
                    let _ = std::fs::write(&output, b"partial");
                    Err(FFmpegError::ConversionFailed(message))
                }
                Script::HangUntilKilled => {
                    token.cancelled().await;
                    Err(FFmpegError::Killed)
                }
                Script::SucceedDespiteKill => {
                    token.cancelled().await;
                    Ok(output)
                }
            }
        });

        self.started.notify_one();
        Ok(RunningJob::new(rx, cancel, task))
    }
}

/// Reports a 10 second 1920x1080 alpha clip, or no video stream for any
/// file whose name contains "broken".
pub struct ScriptedProber;

impl Prober for ScriptedProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo, FFmpegError> {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if file_name.contains("broken") {
            return Err(FFmpegError::NoVideoStream);
        }
        Ok(MediaInfo {
            duration_secs: 10.0,
            codec: "prores".to_string(),
            pix_fmt: "yuva444p12le".to_string(),
            width: 1920,
            height: 1080,
            has_alpha: true,
            file_name,
        })
    }
}
