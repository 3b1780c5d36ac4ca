//! Transcription capability boundary.
//!
//! The dispatcher only sees this trait. Calls are synchronous and may be
//! slow; failures come back as [`EngineError`](crate::EngineError) and are
//! turned into internal-error responses by the caller.

use std::path::Path;

use crate::error::Result;

/// Metadata of a loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub vocab_size: i32,
    pub n_text_ctx: i32,
    pub n_audio_ctx: i32,
    pub is_multilingual: bool,
}

/// A speech-to-text engine.
pub trait Transcriber {
    /// Load the model at `model_path`. Called at most once per successful load.
    fn load(&mut self, model_path: &Path) -> Result<()>;

    /// Transcribe an audio file. `language` is `"auto"` or a language code.
    fn transcribe(&mut self, file: &Path, language: &str, translate: bool) -> Result<String>;

    /// Metadata of the loaded model, `None` before a successful load.
    fn model_info(&self) -> Option<ModelInfo>;
}
