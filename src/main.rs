//! ProRes Web Converter - command-line front end
//!
//! Converts the given ProRes alpha files one at a time and prints the outcome.

mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;

use prores_web_converter::converter::{
    find_ffmpeg, find_ffprobe, is_supported_input, FFmpegTranscoder, FfprobeProber,
};
use prores_web_converter::{BatchEvent, BatchOrchestrator, ConverterSettings};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    log::info!("Starting ProRes Web Converter v{}", env!("CARGO_PKG_VERSION"));

    let mut settings = ConverterSettings::load_or_default(cli.config.as_deref())
        .context("Failed to load settings")?;
    cli.apply(&mut settings);
    if let Some(path) = &cli.save_config {
        settings
            .save(path)
            .with_context(|| format!("Failed to save settings to {:?}", path))?;
    }

    for format in settings.formats.selected() {
        log::info!("Output: {} ({})", format.display_name(), format.description());
    }

    let ffmpeg = find_ffmpeg(settings.ffmpeg_path.as_deref())?;
    let ffprobe = find_ffprobe(settings.ffprobe_path.as_deref())?;
    log::info!("Using FFmpeg at {:?}", ffmpeg);

    let (inputs, skipped): (Vec<PathBuf>, Vec<PathBuf>) =
        cli.files.iter().cloned().partition(|p| is_supported_input(p));
    for path in &skipped {
        log::warn!("Skipping {:?}: not a .mov file", path);
    }
    if inputs.is_empty() {
        anyhow::bail!("No .mov files to convert");
    }

    let orchestrator = BatchOrchestrator::new(
        Arc::new(FFmpegTranscoder::new(ffmpeg).with_timeout(settings.timeout())),
        Arc::new(FfprobeProber::new(ffprobe)),
    );

    // Probing runs ffprobe synchronously
    let adder = orchestrator.clone();
    tokio::task::spawn_blocking(move || adder.add_files(inputs)).await?;

    for entry in orchestrator.files() {
        println!(
            "{}  {}  {}  {}",
            entry.file_name(),
            entry.resolution_string(),
            if entry.has_alpha() { "alpha" } else { "no alpha" },
            entry.status.display()
        );
    }

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling batch");
            cancel.request_cancel();
        }
    });

    let events = orchestrator.events();
    let names = orchestrator.clone();
    let printer = std::thread::spawn(move || {
        let mut last_overall = None;
        for event in events.iter() {
            match event {
                BatchEvent::FileStarted { id } => {
                    if let Some(entry) = names.file(id) {
                        println!("Converting {}", entry.file_name());
                    }
                }
                BatchEvent::FormatProgress { id, format, percent } => {
                    if let Some(entry) = names.file(id) {
                        log::debug!(
                            "{} {}: {}% (file {}%)",
                            entry.file_name(),
                            format.display_name(),
                            percent,
                            entry.display_progress()
                        );
                    }
                }
                BatchEvent::OverallProgress(percent) => {
                    if last_overall != Some(percent) {
                        log::debug!("Overall progress {}%", percent);
                        last_overall = Some(percent);
                    }
                }
                BatchEvent::FileFinished { id, status } => {
                    let name = names
                        .file(id)
                        .map(|e| e.file_name())
                        .unwrap_or_else(|| id.to_string());
                    println!("{}: {}", name, status.display());
                }
                BatchEvent::BatchFinished(_) => break,
                _ => {}
            }
        }
    });

    let summary = orchestrator.start(settings.batch_request()).await?;
    let _ = printer.join();

    println!("Done: {}", summary);

    Ok(if summary.failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
