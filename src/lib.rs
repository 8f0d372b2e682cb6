//! ProRes Web Converter Library
//!
//! Batch conversion of ProRes 4444 files with alpha into web-playable
//! VP9/WebM and HEVC/MOV using FFmpeg.

pub mod converter;
pub mod settings;

// Re-export commonly used types
pub use converter::{
    BatchEvent, BatchOrchestrator, BatchRequest, BatchSummary, FFmpegError, FileStatus,
    OutputFormat, QualityPreset,
};
pub use settings::ConverterSettings;
