//! Per-file conversion: runs each selected format in order for one input.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use super::control::BatchControl;
use super::ffmpeg::FFmpegError;
use super::formats::{EncodeOptions, OutputFormat};
use super::job::{ConversionJob, ConversionResult};
use super::runner::Transcoder;

/// Everything needed to convert one input file.
#[derive(Debug, Clone, Copy)]
pub struct FileRequest<'a> {
    pub input: &'a Path,
    pub duration_secs: Option<f64>,
    pub formats: &'a [OutputFormat],
    pub output_dir: &'a Path,
    pub options: &'a EncodeOptions,
}

/// Runs the formats for one file sequentially against a [`Transcoder`].
#[derive(Clone)]
pub struct FileConverter {
    transcoder: Arc<dyn Transcoder>,
}

impl FileConverter {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// Convert one file to every requested format, WebM first.
    ///
    /// One format failing does not stop the next from being attempted. Once
    /// `control` reports a cancel request, formats not yet started are
    /// recorded as cancelled and a failed in-flight job counts as cancelled.
    /// The running job's kill switch is held by `control` until it settles.
    pub async fn convert_file<F>(
        &self,
        request: FileRequest<'_>,
        control: &BatchControl,
        mut on_progress: F,
    ) -> Vec<ConversionResult>
    where
        F: FnMut(OutputFormat, u8),
    {
        let mut results = Vec::with_capacity(request.formats.len());

        for &format in request.formats {
            let output_path = format.output_path(request.input, request.output_dir);

            if control.is_cancel_requested() {
                results.push(ConversionResult::cancelled(format, output_path));
                continue;
            }

            let job = ConversionJob {
                input_path: request.input.to_path_buf(),
                output_path: output_path.clone(),
                format,
                options: request.options.clone(),
                duration_secs: request.duration_secs,
            };

            log::info!("Converting {:?} -> {:?}", job.input_path, job.output_path);

            let outcome = match self.transcoder.start(&job) {
                Ok(running) => {
                    control.attach_job(running.cancel_token());
                    let outcome = running.finish(|percent| on_progress(format, percent)).await;
                    control.release_job();
                    outcome
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(path) => {
                    // The engine does not always report 100 before exiting
                    on_progress(format, 100);
                    log::info!("Finished {} output {:?}", format, path);
                    results.push(ConversionResult::succeeded(format, path));
                }
                Err(e) => {
                    remove_partial_output(&output_path).await;

                    if control.is_cancel_requested() || matches!(e, FFmpegError::Killed) {
                        log::info!("{} conversion of {:?} cancelled", format, job.input_path);
                        results.push(ConversionResult::cancelled(format, output_path));
                    } else {
                        log::error!("{} conversion of {:?} failed: {}", format, job.input_path, e);
                        results.push(ConversionResult::failed(format, output_path, e.to_string()));
                    }
                }
            }
        }

        results
    }
}

/// Best-effort removal of a partially written output file.
pub async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("Removed partial output {:?}", path),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::debug!("Could not remove partial output {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::job::JobOutcome;
    use crate::converter::testing::{Script, ScriptedTranscoder};
    use std::path::PathBuf;

    fn request<'a>(
        input: &'a Path,
        formats: &'a [OutputFormat],
        output_dir: &'a Path,
        options: &'a EncodeOptions,
    ) -> FileRequest<'a> {
        FileRequest {
            input,
            duration_secs: Some(10.0),
            formats,
            output_dir,
            options,
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_format() {
        let transcoder = Arc::new(
            ScriptedTranscoder::new()
                .script("clip", OutputFormat::WebM, Script::Fail("vp9 exploded".into())),
        );
        let converter = FileConverter::new(transcoder.clone());
        let control = BatchControl::new();
        let options = EncodeOptions::default();
        let formats = [OutputFormat::WebM, OutputFormat::Hevc];

        let results = converter
            .convert_file(
                request(Path::new("/in/clip.mov"), &formats, Path::new("/out"), &options),
                &control,
                |_, _| {},
            )
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].format, OutputFormat::WebM);
        assert_eq!(results[0].error(), Some("vp9 exploded"));
        assert_eq!(results[1].format, OutputFormat::Hevc);
        assert!(results[1].is_success());
        assert_eq!(results[1].output_path, PathBuf::from("/out/clip_safari.mov"));
        assert_eq!(
            transcoder.invocations(),
            vec![
                (PathBuf::from("/out/clip.webm"), OutputFormat::WebM),
                (PathBuf::from("/out/clip_safari.mov"), OutputFormat::Hevc),
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_output_removed_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(
            ScriptedTranscoder::new()
                .script("clip", OutputFormat::Hevc, Script::Fail("videotoolbox not available".into())),
        );
        let converter = FileConverter::new(transcoder);
        let control = BatchControl::new();
        let options = EncodeOptions::default();
        let formats = [OutputFormat::Hevc];

        let results = converter
            .convert_file(
                request(Path::new("/in/clip.mov"), &formats, dir.path(), &options),
                &control,
                |_, _| {},
            )
            .await;

        assert_eq!(results[0].error(), Some("videotoolbox not available"));
        assert!(!dir.path().join("clip_safari.mov").exists());
    }

    #[tokio::test]
    async fn test_success_reports_full_progress() {
        let transcoder = Arc::new(ScriptedTranscoder::new());
        let converter = FileConverter::new(transcoder);
        let control = BatchControl::new();
        let options = EncodeOptions::default();
        let formats = [OutputFormat::WebM];
        let mut progress = Vec::new();

        let results = converter
            .convert_file(
                request(Path::new("/in/clip.mov"), &formats, Path::new("/out"), &options),
                &control,
                |format, percent| progress.push((format, percent)),
            )
            .await;

        assert!(results[0].is_success());
        assert_eq!(progress.last(), Some(&(OutputFormat::WebM, 100)));
        assert!(!control.has_active_job());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_engine() {
        let transcoder = Arc::new(ScriptedTranscoder::new());
        let converter = FileConverter::new(transcoder.clone());
        let control = BatchControl::new();
        control.begin(1).unwrap();
        control.request_cancel();
        let options = EncodeOptions::default();
        let formats = [OutputFormat::WebM, OutputFormat::Hevc];

        let results = converter
            .convert_file(
                request(Path::new("/in/clip.mov"), &formats, Path::new("/out"), &options),
                &control,
                |_, _| {},
            )
            .await;

        assert!(results.iter().all(|r| r.outcome == JobOutcome::Cancelled));
        assert!(transcoder.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        remove_partial_output(&dir.path().join("missing.webm")).await;
    }
}
