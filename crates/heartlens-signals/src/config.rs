use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Settings shared by the extractor, the spectral estimator and the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum number of samples before an assessment pass may run
    pub min_window: usize,
    /// Sample rate of the PPG sequence in Hz (used by the PSD path)
    pub sample_rate_hz: f32,
    /// Histogram bins for the entropy feature
    pub histogram_bins: usize,
    /// Division / log guard
    pub epsilon: f32,
    /// Welch periodogram settings
    pub welch: WelchConfig,
    /// Location of the quality model, loaded once per session
    pub model_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WelchConfig {
    /// Segment length in samples
    pub segment_len: usize,
    /// Fractional overlap between consecutive segments, in [0, 1)
    pub overlap: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_window: 100,
            sample_rate_hz: 30.0,
            histogram_bins: 10,
            epsilon: 1e-7,
            welch: WelchConfig::default(),
            model_path: PathBuf::from("models/quality.json"),
        }
    }
}

impl Default for WelchConfig {
    fn default() -> Self {
        Self {
            segment_len: 256,
            overlap: 0.5,
        }
    }
}

impl WelchConfig {
    /// Hop between segment starts for a given segment length, at least one sample.
    pub fn step(&self, segment_len: usize) -> usize {
        let overlap = (segment_len as f32 * self.overlap).floor() as usize;
        segment_len.saturating_sub(overlap).max(1)
    }
}

impl QualityConfig {
    /// Parse and validate a TOML file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: QualityConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// `from_file`, then any `HEARTLENS_*` variables on top
    /// (`HEARTLENS_SAMPLE_RATE_HZ=60` overrides `sample_rate_hz`).
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config: QualityConfig = toml::from_str(&fs::read_to_string(path)?)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the session config. A user file that exists replaces the
    /// default file outright; `HEARTLENS_*` variables win over both, and
    /// built-in values fill whatever no layer sets.
    pub fn load_layered(
        default_path: Option<&Path>,
        user_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let file = [user_path, default_path]
            .into_iter()
            .flatten()
            .find(|path| path.exists());
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => QualityConfig::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        fn parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
            match std::env::var(key) {
                Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
                    ConfigError::Validation(format!("{} is not a valid value: {:?}", key, raw))
                }),
                Err(_) => Ok(None),
            }
        }

        if let Some(n) = parsed("HEARTLENS_MIN_WINDOW")? {
            self.min_window = n;
        }
        if let Some(hz) = parsed("HEARTLENS_SAMPLE_RATE_HZ")? {
            self.sample_rate_hz = hz;
        }
        if let Some(len) = parsed("HEARTLENS_WELCH_SEGMENT_LEN")? {
            self.welch.segment_len = len;
        }
        if let Ok(path) = std::env::var("HEARTLENS_MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_window == 0 {
            return Err(ConfigError::Validation(
                "min_window must be at least 1".to_string(),
            ));
        }
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(ConfigError::Validation(
                "sample_rate_hz must be positive".to_string(),
            ));
        }
        if self.histogram_bins < 2 {
            return Err(ConfigError::Validation(
                "histogram_bins must be at least 2".to_string(),
            ));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 1e-2) {
            return Err(ConfigError::Validation(
                "epsilon must be in (0, 0.01)".to_string(),
            ));
        }
        if self.welch.segment_len < 2 {
            return Err(ConfigError::Validation(
                "welch.segment_len must be at least 2".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.welch.overlap) {
            return Err(ConfigError::Validation(
                "welch.overlap must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
