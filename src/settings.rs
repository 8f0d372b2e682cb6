//! Converter settings
//!
//! Persisted as pretty-printed JSON. Missing fields fall back to defaults so
//! older files keep loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::converter::{BatchRequest, EncodeOptions, FormatSelection};

/// User-facing converter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConverterSettings {
    /// Output folder; each input's own folder when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Formats produced per file
    pub formats: FormatSelection,
    /// WebM bitrate and quality factor
    pub options: EncodeOptions,
    /// Kill any single engine invocation running longer than this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Explicit FFmpeg binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit FFprobe binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<PathBuf>,
}

impl ConverterSettings {
    /// Save to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Load from a file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&json)?;
        log::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Load `path` if given and present, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                log::debug!("No settings file at {:?}, using defaults", path);
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Batch parameters described by these settings.
    pub fn batch_request(&self) -> BatchRequest {
        BatchRequest {
            formats: self.formats,
            output_dir: self.output_dir.clone(),
            options: self.options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::QualityPreset;

    #[test]
    fn test_default_settings() {
        let settings = ConverterSettings::default();
        assert!(settings.formats.webm);
        assert!(settings.formats.hevc);
        assert_eq!(settings.options, QualityPreset::Balanced.options());
        assert_eq!(settings.timeout(), None);
        assert!(settings.batch_request().output_dir.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = ConverterSettings {
            output_dir: Some(PathBuf::from("/out")),
            formats: FormatSelection {
                webm: true,
                hevc: false,
            },
            options: QualityPreset::High.options(),
            timeout_secs: Some(600),
            ..Default::default()
        };
        settings.save(&path).unwrap();

        let loaded = ConverterSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: ConverterSettings =
            serde_json::from_str(r#"{"options": {"bitrate": "3M", "crf": 28}}"#).unwrap();
        assert_eq!(settings.formats, FormatSelection::default());
        assert_eq!(settings.options.bitrate, "3M");
        assert!(settings.ffmpeg_path.is_none());
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(
            ConverterSettings::load_or_default(Some(&missing)).unwrap(),
            ConverterSettings::default()
        );

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "not json").unwrap();
        assert!(ConverterSettings::load_or_default(Some(&broken)).is_err());
    }

    #[test]
    fn test_zero_timeout_disables_limit() {
        let settings = ConverterSettings {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(settings.timeout(), None);
    }
}
