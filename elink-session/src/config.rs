use crate::error::ConfigError;
use elink_core::{EyeSelection, HostKey};
pub use elink_core::{Palette, Rgb};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Host calibration geometry, e.g. `HV9`.
    pub kind: String,
    /// Fraction of the display (x, y) spanned by calibration targets.
    pub calibration_area: (f64, f64),
    pub validation_area: (f64, f64),
    /// Host key that accepts a fixation during calibration and validation.
    pub accept_key: HostKey,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            kind: "HV9".into(),
            calibration_area: (0.5, 0.5),
            validation_area: (0.5, 0.5),
            accept_key: HostKey::Space,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,
    pub eye: EyeSelection,
    /// Prepended to every EDF name, e.g. experiment and participant id.
    pub prefix: String,
    pub download_dir: PathBuf,
    pub sample_rate: u32,
    pub render_fps: u32,
    /// Written into the EDF preamble as `RECORDED BY <tag>`.
    pub preamble_tag: String,
    pub calibration: CalibrationConfig,
    pub palette: Palette,
    /// TTF/OTF used for status text. Text is skipped when unset.
    pub font: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "100.1.1.1".into(),
            eye: EyeSelection::Both,
            prefix: String::new(),
            download_dir: PathBuf::from("./eye_tracking/"),
            sample_rate: 1000,
            render_fps: 60,
            preamble_tag: "elink connector".into(),
            calibration: CalibrationConfig::default(),
            palette: Palette::default(),
            font: None,
        }
    }
}

impl SessionConfig {
    /// Reads a JSON config. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.sample_rate, 250 | 500 | 1000 | 2000) {
            return Err(ConfigError::UnsupportedSampleRate(self.sample_rate));
        }
        if self.eye.is_binocular() && self.sample_rate > 1000 {
            return Err(ConfigError::BinocularRateTooHigh(self.sample_rate));
        }
        if self.render_fps == 0 {
            return Err(ConfigError::ZeroFps);
        }
        Ok(())
    }
}
