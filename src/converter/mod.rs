//! ProRes Alpha Converter Module
//!
//! Converts ProRes 4444 files with alpha to VP9/WebM and HEVC/MOV using FFmpeg.

mod batch;
mod control;
mod coordinator;
mod ffmpeg;
mod formats;
mod job;
mod runner;

#[cfg(test)]
mod testing;

pub use batch::{BatchEvent, BatchOrchestrator, BatchRequest, BatchRun, BatchSummary, CancelHandle};
pub use control::{BatchControl, BatchError, BatchState};
pub use coordinator::{remove_partial_output, FileConverter, FileRequest};
pub use ffmpeg::{
    find_ffmpeg, find_ffprobe, parse_probe_output, FFmpegError, FFmpegTranscoder, FfprobeProber,
    MediaInfo, ProgressParser,
};
pub use formats::{
    is_supported_input, supported_input_extensions, EncodeOptions, FormatSelection, OutputFormat,
    QualityPreset, HEVC_ALPHA_QUALITY,
};
pub use job::{ConversionJob, ConversionResult, FileEntry, FileId, FileStatus, JobOutcome};
pub use runner::{clamp_percent, Prober, RunningJob, Transcoder};
