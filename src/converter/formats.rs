//! Output format definitions, encoder option sets and quality presets.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Alpha quality passed to the HEVC encoder. Not user-tunable.
pub const HEVC_ALPHA_QUALITY: f32 = 0.75;

/// Web delivery formats produced for every input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// VP9 with alpha in a WebM container
    WebM,
    /// HEVC with alpha in a QuickTime container, for Safari
    Hevc,
}

impl OutputFormat {
    /// Short lowercase key, used in per-file error messages.
    pub fn key(&self) -> &'static str {
        match self {
            OutputFormat::WebM => "webm",
            OutputFormat::Hevc => "hevc",
        }
    }

    /// Returns a human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            OutputFormat::WebM => "WebM (VP9)",
            OutputFormat::Hevc => "HEVC (Safari)",
        }
    }

    /// Returns a description of the format.
    pub fn description(&self) -> &'static str {
        match self {
            OutputFormat::WebM => "VP9 + alpha, Chrome/Firefox/Edge",
            OutputFormat::Hevc => "HEVC + alpha, Safari/iOS (hardware encoder when available)",
        }
    }

    /// File name suffix appended to the input's base name.
    pub fn output_suffix(&self) -> &'static str {
        match self {
            OutputFormat::WebM => ".webm",
            OutputFormat::Hevc => "_safari.mov",
        }
    }

    /// All formats, in the order they run for a single file.
    pub fn all() -> &'static [OutputFormat] {
        &[OutputFormat::WebM, OutputFormat::Hevc]
    }

    /// Build the output path for `input` inside `output_dir`.
    pub fn output_path(&self, input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());

        output_dir.join(format!("{}{}", stem, self.output_suffix()))
    }

    /// Encoder arguments placed between the input and the output path.
    pub fn encoder_args(&self, options: &EncodeOptions) -> Vec<String> {
        match self {
            OutputFormat::WebM => vec![
                "-c:v".into(),
                "libvpx-vp9".into(),
                "-pix_fmt".into(),
                "yuva420p".into(),
                "-b:v".into(),
                options.bitrate.clone(),
                "-crf".into(),
                options.crf.to_string(),
                "-auto-alt-ref".into(),
                "0".into(),
                "-an".into(),
                "-deadline".into(),
                "good".into(),
                "-cpu-used".into(),
                "2".into(),
                "-row-mt".into(),
                "1".into(),
            ],
            OutputFormat::Hevc => vec![
                "-c:v".into(),
                "hevc_videotoolbox".into(),
                "-allow_sw".into(),
                "1".into(),
                "-alpha_quality".into(),
                HEVC_ALPHA_QUALITY.to_string(),
                "-tag:v".into(),
                "hvc1".into(),
                "-an".into(),
            ],
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webm" | "vp9" => Ok(OutputFormat::WebM),
            "hevc" | "safari" | "mov" => Ok(OutputFormat::Hevc),
            other => Err(format!("unknown output format '{}' (expected webm or hevc)", other)),
        }
    }
}

/// Which output formats a batch produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSelection {
    pub webm: bool,
    pub hevc: bool,
}

impl Default for FormatSelection {
    fn default() -> Self {
        Self {
            webm: true,
            hevc: true,
        }
    }
}

impl FormatSelection {
    /// Select exactly the given formats.
    pub fn from_formats(formats: &[OutputFormat]) -> Self {
        Self {
            webm: formats.contains(&OutputFormat::WebM),
            hevc: formats.contains(&OutputFormat::Hevc),
        }
    }

    pub fn contains(&self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::WebM => self.webm,
            OutputFormat::Hevc => self.hevc,
        }
    }

    /// Selected formats in run order (WebM before HEVC).
    pub fn selected(&self) -> Vec<OutputFormat> {
        OutputFormat::all()
            .iter()
            .copied()
            .filter(|f| self.contains(*f))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !self.webm && !self.hevc
    }
}

/// User-tunable encoder options. Only the WebM encoder consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// Target video bitrate in FFmpeg notation (e.g. "2M")
    pub bitrate: String,
    /// VP9 quality factor, 0-63, lower is better
    pub crf: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        QualityPreset::default().options()
    }
}

/// Bitrate/quality presets offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// Smallest files for bandwidth-constrained pages
    Small,
    /// Balanced size and quality (default)
    #[default]
    Balanced,
    /// Best quality, larger files
    High,
}

impl QualityPreset {
    /// Returns the encoder options for this preset.
    pub fn options(&self) -> EncodeOptions {
        let (bitrate, crf) = match self {
            QualityPreset::Small => ("1M", 36),
            QualityPreset::Balanced => ("2M", 30),
            QualityPreset::High => ("4M", 24),
        };
        EncodeOptions {
            bitrate: bitrate.to_string(),
            crf,
        }
    }

    /// Returns a human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            QualityPreset::Small => "Small",
            QualityPreset::Balanced => "Balanced",
            QualityPreset::High => "High",
        }
    }

    /// All available presets.
    pub fn all() -> &'static [QualityPreset] {
        &[QualityPreset::Small, QualityPreset::Balanced, QualityPreset::High]
    }
}

impl FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QualityPreset::all()
            .iter()
            .copied()
            .find(|p| p.display_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown preset '{}' (expected small, balanced or high)", s))
    }
}

/// Supported input file extensions.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &["mov"]
}

/// Check if a file extension is supported for conversion.
pub fn is_supported_extension(ext: &str) -> bool {
    supported_input_extensions()
        .iter()
        .any(|e| e.eq_ignore_ascii_case(ext))
}

/// Check if a path has a supported input extension.
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(is_supported_extension)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths() {
        let input = Path::new("/videos/clip.mov");
        let out = Path::new("/out");

        assert_eq!(
            OutputFormat::WebM.output_path(input, out),
            PathBuf::from("/out/clip.webm")
        );
        assert_eq!(
            OutputFormat::Hevc.output_path(input, out),
            PathBuf::from("/out/clip_safari.mov")
        );
    }

    #[test]
    fn test_format_names() {
        assert_eq!(OutputFormat::WebM.display_name(), "WebM (VP9)");
        assert_eq!(OutputFormat::Hevc.display_name(), "HEVC (Safari)");
        assert!(OutputFormat::Hevc.description().contains("Safari"));
        assert_eq!(OutputFormat::Hevc.to_string(), "hevc");
    }

    #[test]
    fn test_selection_order() {
        let both = FormatSelection { webm: true, hevc: true };
        assert_eq!(both.selected(), vec![OutputFormat::WebM, OutputFormat::Hevc]);

        let reversed = FormatSelection::from_formats(&[OutputFormat::Hevc, OutputFormat::WebM]);
        assert_eq!(reversed.selected(), vec![OutputFormat::WebM, OutputFormat::Hevc]);

        assert!(FormatSelection { webm: false, hevc: false }.is_empty());
    }

    #[test]
    fn test_webm_args_use_options() {
        let options = EncodeOptions {
            bitrate: "3M".to_string(),
            crf: 28,
        };
        let args = OutputFormat::WebM.encoder_args(&options);

        let pos = args.iter().position(|a| a == "-b:v").unwrap();
        assert_eq!(args[pos + 1], "3M");
        let pos = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[pos + 1], "28");
        assert!(args.contains(&"yuva420p".to_string()));
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_hevc_args_ignore_options() {
        let args = OutputFormat::Hevc.encoder_args(&QualityPreset::High.options());
        assert!(!args.contains(&"-b:v".to_string()));
        let pos = args.iter().position(|a| a == "-alpha_quality").unwrap();
        assert_eq!(args[pos + 1], "0.75");
        assert!(args.contains(&"hvc1".to_string()));
    }

    #[test]
    fn test_default_options() {
        let options = EncodeOptions::default();
        assert_eq!(options.bitrate, "2M");
        assert_eq!(options.crf, 30);
    }

    #[test]
    fn test_parse_format_and_preset() {
        assert_eq!("WebM".parse::<OutputFormat>(), Ok(OutputFormat::WebM));
        assert_eq!("hevc".parse::<OutputFormat>(), Ok(OutputFormat::Hevc));
        assert!("h264".parse::<OutputFormat>().is_err());
        assert_eq!("high".parse::<QualityPreset>(), Ok(QualityPreset::High));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension("mov"));
        assert!(is_supported_extension("MOV"));
        assert!(!is_supported_extension("mp4"));
        assert!(is_supported_input(Path::new("/a/b/clip.Mov")));
        assert!(!is_supported_input(Path::new("/a/b/clip")));
    }
}
