//! FFmpeg wrapper for probing and converting video files.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, ExitStatus, Stdio};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::job::ConversionJob;
use super::runner::{clamp_percent, Prober, RunningJob, Transcoder};

/// Lines of engine stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 8;

/// Errors that can occur during FFmpeg operations.
#[derive(Error, Debug)]
pub enum FFmpegError {
    #[error("FFmpeg binary not found. Please install FFmpeg or set ffmpeg_path in the settings")]
    NotFound,
    #[error("FFprobe binary not found. Please install FFmpeg or set ffprobe_path in the settings")]
    ProbeNotFound,
    #[error("Failed to spawn FFmpeg process: {0}")]
    SpawnFailed(#[from] std::io::Error),
    /// Engine exited abnormally; carries its diagnostics verbatim.
    #[error("{0}")]
    ConversionFailed(String),
    #[error("FFmpeg was terminated")]
    Killed,
    #[error("FFmpeg timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("No video stream found")]
    NoVideoStream,
    #[error("Failed to parse video info: {0}")]
    ParseError(String),
    #[error("Conversion task failed: {0}")]
    TaskFailed(String),
}

/// Video metadata extracted from an input file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub codec: String,
    pub pix_fmt: String,
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub file_name: String,
}

/// Find the FFmpeg binary: configured path, then PATH, then common locations.
pub fn find_ffmpeg(configured: Option<&Path>) -> Result<PathBuf, FFmpegError> {
    let common_paths: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/usr/local/bin/ffmpeg",
            "/opt/homebrew/bin/ffmpeg",
            "/opt/local/bin/ffmpeg",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\ffmpeg\\bin\\ffmpeg.exe",
            "C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe",
        ]
    } else {
        &["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg"]
    };

    locate("ffmpeg", configured, common_paths).ok_or(FFmpegError::NotFound)
}

/// Find the FFprobe binary.
pub fn find_ffprobe(configured: Option<&Path>) -> Result<PathBuf, FFmpegError> {
    let common_paths: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/usr/local/bin/ffprobe",
            "/opt/homebrew/bin/ffprobe",
            "/opt/local/bin/ffprobe",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\ffmpeg\\bin\\ffprobe.exe",
            "C:\\Program Files\\ffmpeg\\bin\\ffprobe.exe",
        ]
    } else {
        &["/usr/bin/ffprobe", "/usr/local/bin/ffprobe"]
    };

    locate("ffprobe", configured, common_paths).ok_or(FFmpegError::ProbeNotFound)
}

fn locate(name: &str, configured: Option<&Path>, common_paths: &[&str]) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        log::warn!("Configured {} path {:?} does not exist", name, path);
    }

    if let Ok(path) = which::which(name) {
        return Some(path);
    }

    common_paths.iter().map(PathBuf::from).find(|p| p.exists())
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    pix_fmt: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    // ffprobe prints numbers in the format section as strings
    duration: Option<String>,
}

/// Parse FFprobe JSON output for `path`.
pub fn parse_probe_output(json: &str, path: &Path) -> Result<MediaInfo, FFmpegError> {
    let output: ProbeOutput =
        serde_json::from_str(json).map_err(|e| FFmpegError::ParseError(e.to_string()))?;

    let video = output
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(FFmpegError::NoVideoStream)?;

    let duration_secs = output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .unwrap_or(0.0);

    let pix_fmt = video.pix_fmt.unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(MediaInfo {
        duration_secs,
        codec: video.codec_name.unwrap_or_else(|| "unknown".to_string()),
        has_alpha: pix_fmt.contains('a'),
        pix_fmt,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        file_name,
    })
}

/// Probes input files with FFprobe.
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }
}

impl Prober for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo, FFmpegError> {
        let output = StdCommand::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(FFmpegError::ParseError(if stderr.is_empty() {
                format!("ffprobe exited with code: {}", exit_code(&output.status))
            } else {
                stderr
            }));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout), path)
    }
}

/// Turns `-progress` key/value lines into percentages.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    duration_secs: Option<f64>,
}

impl ProgressParser {
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| *d > 0.0),
        }
    }

    /// Feed one line; returns a percent when the line carries one.
    pub fn feed(&self, line: &str) -> Option<u8> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // FFmpeg reports out_time_ms in microseconds as well
            "out_time_us" | "out_time_ms" => {
                let duration = self.duration_secs?;
                let us = value.trim().parse::<i64>().ok()?;
                let seconds = us as f64 / 1_000_000.0;
                Some(clamp_percent(seconds / duration * 100.0))
            }
            "progress" if value.trim() == "end" => Some(100),
            _ => None,
        }
    }
}

/// Runs conversions with the FFmpeg CLI.
pub struct FFmpegTranscoder {
    ffmpeg_path: PathBuf,
    timeout: Option<Duration>,
}

impl FFmpegTranscoder {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            timeout: None,
        }
    }

    /// Kill any invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument list for a job.
    pub fn build_args(job: &ConversionJob) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-i".to_string(),
            job.input_path.to_string_lossy().to_string(),
        ];
        args.extend(job.format.encoder_args(&job.options));
        args.push(job.output_path.to_string_lossy().to_string());
        args
    }
}

impl Transcoder for FFmpegTranscoder {
    fn start(&self, job: &ConversionJob) -> Result<RunningJob, FFmpegError> {
        let args = Self::build_args(job);
        log::debug!("Running FFmpeg: {:?} {}", self.ffmpeg_path, args.join(" "));

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep terminal signals (Ctrl-C) away from the engine; only the
        // cancellation token stops it
        #[cfg(unix)]
        command.process_group(0);
        let child = command.spawn()?;

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let parser = ProgressParser::new(job.duration_secs);
        let task = tokio::spawn(drive(
            child,
            job.output_path.clone(),
            parser,
            progress_tx,
            cancel.clone(),
            self.timeout,
        ));

        Ok(RunningJob::new(progress_rx, cancel, task))
    }
}

/// How the wait on the engine process ended.
#[derive(Debug, Clone, Copy)]
enum Stop {
    Exited,
    Killed,
    TimedOut(Duration),
}

async fn drive(
    mut child: Child,
    output: PathBuf,
    parser: ProgressParser,
    progress_tx: mpsc::UnboundedSender<u8>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> Result<PathBuf, FFmpegError> {
    let progress_task = child.stdout.take().map(|stdout| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(percent) = parser.feed(&line) {
                    let _ = progress_tx.send(percent);
                }
            }
        })
    });
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(stderr_tail(stderr, STDERR_TAIL_LINES)));

    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let stop = tokio::select! {
        _ = child.wait() => Stop::Exited,
        _ = cancel.cancelled() => Stop::Killed,
        _ = deadline => Stop::TimedOut(timeout.unwrap_or_default()),
    };

    match stop {
        Stop::Exited => {}
        Stop::Killed => {
            log::info!("Killing FFmpeg for {:?}", output);
            let _ = child.start_kill();
        }
        Stop::TimedOut(limit) => {
            log::warn!("FFmpeg timed out after {}s, killing process", limit.as_secs());
            let _ = child.start_kill();
        }
    }

    // Exit status is cached by the child, so waiting again is fine
    let status = child.wait().await?;

    if let Some(task) = progress_task {
        let _ = task.await;
    }
    let diagnostics = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    // A kill can race a process that already wrote its output and exited
    // cleanly; the exit status decides.
    if status.success() {
        return Ok(output);
    }

    match stop {
        Stop::Killed => Err(FFmpegError::Killed),
        Stop::TimedOut(limit) => Err(FFmpegError::TimedOut(limit)),
        Stop::Exited => {
            Err(FFmpegError::ConversionFailed(if diagnostics.is_empty() {
                format!("FFmpeg exited with code: {}", exit_code(&status))
            } else {
                diagnostics
            }))
        }
    }
}

/// Exit code for messages, or "signal" when the process was killed by one.
fn exit_code(status: &ExitStatus) -> String {
    status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Keep the last `max_lines` non-empty lines of a stream.
async fn stderr_tail<R>(stream: R, max_lines: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(max_lines);
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if tail.len() == max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}
