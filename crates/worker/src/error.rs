//! Worker error types.

use std::path::PathBuf;

use protocol::{ErrorObject, codes};
use thiserror::Error;

/// A method failed; becomes an error response with the matching code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// Missing or malformed required argument (-32602).
    #[error("{0}")]
    InvalidParams(String),

    /// Unknown method or unknown tool name (-32601).
    #[error("{0}")]
    MethodNotFound(String),

    /// Model load failure, inference failure, missing model (-32603).
    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }
}

impl From<DispatchError> for ErrorObject {
    fn from(err: DispatchError) -> Self {
        ErrorObject::new(err.code(), err.to_string())
    }
}

/// Failures of the transcription engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("failed to read model {}: {source}", .path.display())]
    ModelIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model file {}: {reason}", .path.display())]
    InvalidModel { path: PathBuf, reason: String },

    #[error("Model not loaded")]
    NotLoaded,

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Failed to load audio file: {}", .0.display())]
    AudioNotFound(PathBuf),

    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Whisper inference failed: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
