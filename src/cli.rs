use clap::Parser;
use std::path::PathBuf;

use prores_web_converter::converter::{FormatSelection, OutputFormat, QualityPreset};
use prores_web_converter::ConverterSettings;

#[derive(Parser)]
#[command(name = "prores-web-converter")]
#[command(author, version, about = "Convert ProRes 4444 alpha videos to WebM and Safari HEVC")]
pub struct Cli {
    /// ProRes .mov files to convert
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output folder (defaults to each input's folder)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Formats to produce, comma separated (webm, hevc)
    #[arg(short, long, value_delimiter = ',')]
    pub formats: Option<Vec<OutputFormat>>,

    /// Quality preset (small, balanced, high)
    #[arg(short, long)]
    pub preset: Option<QualityPreset>,

    /// WebM target bitrate, e.g. 2M (overrides the preset)
    #[arg(long)]
    pub bitrate: Option<String>,

    /// WebM quality factor 0-63, lower is better (overrides the preset)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=63))]
    pub crf: Option<u8>,

    /// Kill any single FFmpeg run after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Path to FFmpeg binary
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Path to FFprobe binary
    #[arg(long)]
    pub ffprobe: Option<PathBuf>,

    /// Path to settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the effective settings to this file
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Override loaded settings with the flags given on the command line.
    pub fn apply(&self, settings: &mut ConverterSettings) {
        if let Some(dir) = &self.output_dir {
            settings.output_dir = Some(dir.clone());
        }
        if let Some(formats) = &self.formats {
            settings.formats = FormatSelection::from_formats(formats);
        }
        if let Some(preset) = self.preset {
            settings.options = preset.options();
        }
        if let Some(bitrate) = &self.bitrate {
            settings.options.bitrate = bitrate.clone();
        }
        if let Some(crf) = self.crf {
            settings.options.crf = crf;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = Some(timeout);
        }
        if let Some(path) = &self.ffmpeg {
            settings.ffmpeg_path = Some(path.clone());
        }
        if let Some(path) = &self.ffprobe {
            settings.ffprobe_path = Some(path.clone());
        }
    }
}
