//! Configuration loading from a TOML file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use worker::WhisperOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the ggml whisper model.
    #[serde(default = "default_model")]
    pub model: PathBuf,

    /// Inference tuning for `whisper-cli`.
    #[serde(default)]
    pub engine: WhisperOptions,
}

fn default_model() -> PathBuf {
    PathBuf::from("models/ggml-base.en.bin")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            engine: WhisperOptions::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
