//! Conversion job, file entry and per-format result definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::ffmpeg::MediaInfo;
use super::formats::{EncodeOptions, OutputFormat};

/// Unique identifier for a file in the conversion list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u64);

impl FileId {
    /// Create a new unique file ID.
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        FileId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One engine invocation: a single input converted to a single format.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionJob {
    /// Input file path
    pub input_path: PathBuf,
    /// Output file path
    pub output_path: PathBuf,
    /// Target format
    pub format: OutputFormat,
    /// Encoder options
    pub options: EncodeOptions,
    /// Probed input duration, used to turn engine timestamps into percent
    pub duration_secs: Option<f64>,
}

/// Status of a file in the conversion list.
///
/// Moves `Pending -> Converting -> {Success | Error | Cancelled}`. A file in
/// `Success` is never converted again.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileStatus {
    /// Not yet converted
    #[default]
    Pending,
    /// Currently being converted
    Converting,
    /// All selected formats were produced
    Success,
    /// At least one format failed
    Error(String),
    /// Batch was cancelled before this file finished
    Cancelled,
}

impl FileStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FileStatus::Success)
    }

    pub fn is_converting(&self) -> bool {
        matches!(self, FileStatus::Converting)
    }

    /// Get a display string for the status.
    pub fn display(&self) -> String {
        match self {
            FileStatus::Pending => "Pending".to_string(),
            FileStatus::Converting => "Converting...".to_string(),
            FileStatus::Success => "Converted successfully".to_string(),
            FileStatus::Error(message) => format!("Failed: {}", message),
            FileStatus::Cancelled => "Cancelled".to_string(),
        }
    }
}

/// An input file in the conversion list.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Unique identifier
    pub id: FileId,
    /// Input file path
    pub path: PathBuf,
    /// Probed metadata, absent when probing failed
    pub info: Option<MediaInfo>,
    /// Percent complete per output format (0-100)
    pub progress: BTreeMap<OutputFormat, u8>,
    /// Current status
    pub status: FileStatus,
}

impl FileEntry {
    /// Create a new entry with probed metadata.
    pub fn new(path: PathBuf, info: Option<MediaInfo>) -> Self {
        Self {
            id: FileId::new(),
            path,
            info,
            progress: OutputFormat::all().iter().map(|f| (*f, 0)).collect(),
            status: FileStatus::Pending,
        }
    }

    /// Get the display file name.
    pub fn file_name(&self) -> String {
        if let Some(info) = &self.info {
            return info.file_name.clone();
        }
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Get the resolution string (e.g., "1920x1080").
    pub fn resolution_string(&self) -> String {
        self.info
            .as_ref()
            .map(|info| format!("{}x{}", info.width, info.height))
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn has_alpha(&self) -> bool {
        self.info.as_ref().map(|i| i.has_alpha).unwrap_or(false)
    }

    pub fn progress_for(&self, format: OutputFormat) -> u8 {
        self.progress.get(&format).copied().unwrap_or(0)
    }

    /// Highest progress across formats, as shown on a single progress bar.
    pub fn display_progress(&self) -> u8 {
        self.progress.values().copied().max().unwrap_or(0)
    }

    /// Mean completion of `formats`, as a fraction in [0, 1].
    pub fn fraction_of(&self, formats: &[OutputFormat]) -> f64 {
        if formats.is_empty() {
            return 0.0;
        }
        let sum: f64 = formats.iter().map(|f| self.progress_for(*f) as f64).sum();
        (sum / formats.len() as f64 / 100.0).clamp(0.0, 1.0)
    }

    /// Mark the file as converting and reset progress for `formats`.
    pub fn start(&mut self, formats: &[OutputFormat]) {
        for format in formats {
            self.progress.insert(*format, 0);
        }
        self.status = FileStatus::Converting;
    }

    /// Update progress for one format.
    pub fn update_progress(&mut self, format: OutputFormat, percent: u8) {
        if self.status.is_converting() {
            self.progress.insert(format, percent.min(100));
        }
    }

    /// Mark the file as converted.
    pub fn complete(&mut self, formats: &[OutputFormat]) {
        for format in formats {
            self.progress.insert(*format, 100);
        }
        self.status = FileStatus::Success;
    }

    /// Mark the file as failed.
    pub fn fail(&mut self, error: String) {
        self.status = FileStatus::Error(error);
    }

    /// Mark the file as cancelled.
    pub fn cancel(&mut self) {
        self.status = FileStatus::Cancelled;
    }
}

/// How a single (file, format) attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Result of converting one file to one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub format: OutputFormat,
    pub output_path: PathBuf,
    pub outcome: JobOutcome,
}

impl ConversionResult {
    pub fn succeeded(format: OutputFormat, output_path: PathBuf) -> Self {
        Self {
            format,
            output_path,
            outcome: JobOutcome::Succeeded,
        }
    }

    pub fn failed(format: OutputFormat, output_path: PathBuf, error: impl Into<String>) -> Self {
        Self {
            format,
            output_path,
            outcome: JobOutcome::Failed(error.into()),
        }
    }

    pub fn cancelled(format: OutputFormat, output_path: PathBuf) -> Self {
        Self {
            format,
            output_path,
            outcome: JobOutcome::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == JobOutcome::Succeeded
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == JobOutcome::Cancelled
    }

    /// Error message of a failed attempt.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            JobOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }
}
