//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the worker before or while serving.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The configured default language is not one whisper knows.
    #[error("unknown language '{0}'")]
    UnknownLanguage(String),

    /// The config file given with `--config` could not be loaded.
    #[error("config error in {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    /// Reading requests or writing responses failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
