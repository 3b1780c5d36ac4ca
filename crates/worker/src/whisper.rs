//! [`Transcriber`] backed by a ggml whisper model and the `whisper-cli` binary.
//!
//! Loading parses the model's ggml header for its hyper-parameters; the
//! actual inference runs in an external `whisper-cli` process.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{ModelInfo, Transcriber};
use crate::error::{EngineError, Result};
use crate::logfmt::clip;

/// `"ggml"` as a little-endian u32.
pub(crate) const GGML_MAGIC: u32 = 0x6767_6d6c;

/// Multilingual whisper vocabularies have at least this many tokens.
const MULTILINGUAL_VOCAB: i32 = 51865;

/// How much of whisper-cli's stderr to keep in an error message.
const STDERR_TAIL: usize = 512;

/// Language codes accepted by whisper.
const LANGUAGES: &[&str] = &[
    "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar", "sv",
    "it", "id", "hi", "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta", "no",
    "th", "ur", "hr", "bg", "lt", "la", "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn", "sr",
    "az", "sl", "kn", "et", "mk", "br", "eu", "is", "hy", "ne", "mn", "bs", "kk", "sq", "sw",
    "gl", "mr", "pa", "si", "km", "sn", "yo", "so", "af", "oc", "ka", "be", "tg", "sd", "gu",
    "am", "yi", "lo", "uz", "fo", "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo", "tl",
    "mg", "as", "tt", "haw", "ln", "ha", "ba", "jw", "su", "yue",
];

/// True for `"auto"` and every language code whisper knows.
pub fn is_known_language(language: &str) -> bool {
    language == "auto" || LANGUAGES.contains(&language)
}

/// Inference tuning passed through to `whisper-cli`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperOptions {
    /// Path or name of the `whisper-cli` executable.
    pub binary: String,
    pub threads: u32,
    pub processors: u32,
    /// Checked against the known languages at startup. Calls that do not
    /// name a language still auto-detect.
    pub language: String,
    /// Beam size; `-1` keeps whisper's greedy default.
    pub beam_size: i32,
    pub best_of: i32,
    pub prompt: String,
    pub use_gpu: bool,
    pub flash_attn: bool,
}

impl Default for WhisperOptions {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get() as u32);
        Self {
            binary: "whisper-cli".to_string(),
            threads: cores.min(4),
            processors: 1,
            language: "auto".to_string(),
            beam_size: -1,
            best_of: 2,
            prompt: String::new(),
            use_gpu: true,
            flash_attn: false,
        }
    }
}

/// Hyper-parameters stored at the start of a ggml whisper model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelHeader {
    pub n_vocab: i32,
    pub n_audio_ctx: i32,
    pub n_audio_state: i32,
    pub n_audio_head: i32,
    pub n_audio_layer: i32,
    pub n_text_ctx: i32,
    pub n_text_state: i32,
    pub n_text_head: i32,
    pub n_text_layer: i32,
    pub n_mels: i32,
    pub ftype: i32,
}

impl ModelHeader {
    /// Parse the magic and hyper-parameters. Returns a human-readable reason
    /// on failure.
    pub fn read(reader: &mut impl Read) -> std::result::Result<Self, String> {
        let magic = read_u32(reader)?;
        if magic != GGML_MAGIC {
            return Err(format!("bad magic 0x{magic:08x}"));
        }

        let mut fields = [0i32; 11];
        for field in &mut fields {
            *field = read_u32(reader)? as i32;
        }
        let [
            n_vocab,
            n_audio_ctx,
            n_audio_state,
            n_audio_head,
            n_audio_layer,
            n_text_ctx,
            n_text_state,
            n_text_head,
            n_text_layer,
            n_mels,
            ftype,
        ] = fields;

        Ok(Self {
            n_vocab,
            n_audio_ctx,
            n_audio_state,
            n_audio_head,
            n_audio_layer,
            n_text_ctx,
            n_text_state,
            n_text_head,
            n_text_layer,
            n_mels,
            ftype,
        })
    }

    pub fn is_multilingual(&self) -> bool {
        self.n_vocab >= MULTILINGUAL_VOCAB
    }
}

fn read_u32(reader: &mut impl Read) -> std::result::Result<u32, String> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| format!("truncated header: {e}"))?;
    Ok(u32::from_le_bytes(buf))
}

struct LoadedModel {
    path: PathBuf,
    header: ModelHeader,
}

/// Runs `whisper-cli` against a loaded ggml model.
pub struct WhisperCli {
    options: WhisperOptions,
    model: Option<LoadedModel>,
}

impl WhisperCli {
    pub fn new(options: WhisperOptions) -> Self {
        Self {
            options,
            model: None,
        }
    }

    pub fn options(&self) -> &WhisperOptions {
        &self.options
    }

    pub fn header(&self) -> Option<&ModelHeader> {
        self.model.as_ref().map(|m| &m.header)
    }

    fn command(&self, model: &Path, file: &Path, language: &str, translate: bool) -> Command {
        let opts = &self.options;
        let mut cmd = Command::new(&opts.binary);
        cmd.arg("-m")
            .arg(model)
            .arg("-f")
            .arg(file)
            .args(["-l", language])
            .args(["-t", &opts.threads.to_string()])
            .args(["-p", &opts.processors.to_string()])
            .args(["-bo", &opts.best_of.to_string()])
            .args(["-nt", "-np"]);
        if opts.beam_size > 0 {
            cmd.args(["-bs", &opts.beam_size.to_string()]);
        }
        if translate {
            cmd.arg("-tr");
        }
        if !opts.prompt.is_empty() {
            cmd.args(["--prompt", &opts.prompt]);
        }
        if !opts.use_gpu {
            cmd.arg("-ng");
        }
        if opts.flash_attn {
            cmd.arg("-fa");
        }
        cmd
    }
}

impl Transcriber for WhisperCli {
    fn load(&mut self, model_path: &Path) -> Result<()> {
        info!(path = %model_path.display(), "loading whisper model");
        let file = File::open(model_path).map_err(|source| EngineError::ModelIo {
            path: model_path.to_path_buf(),
            source,
        })?;
        let header = ModelHeader::read(&mut BufReader::new(file)).map_err(|reason| {
            EngineError::InvalidModel {
                path: model_path.to_path_buf(),
                reason,
            }
        })?;
        info!(
            n_vocab = header.n_vocab,
            n_text_ctx = header.n_text_ctx,
            n_audio_ctx = header.n_audio_ctx,
            multilingual = header.is_multilingual(),
            "model loaded"
        );
        self.model = Some(LoadedModel {
            path: model_path.to_path_buf(),
            header,
        });
        Ok(())
    }

    fn transcribe(&mut self, file: &Path, language: &str, translate: bool) -> Result<String> {
        let model = self.model.as_ref().ok_or(EngineError::NotLoaded)?;
        if !is_known_language(language) {
            return Err(EngineError::UnknownLanguage(language.to_string()));
        }
        if !file.is_file() {
            return Err(EngineError::AudioNotFound(file.to_path_buf()));
        }

        let mut cmd = self.command(&model.path, file, language, translate);
        let shown = format!("{cmd:?}");
        debug!(command = %clip(&shown), "running whisper-cli");
        let output = cmd.output().map_err(|source| EngineError::Launch {
            binary: self.options.binary.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let tail = match stderr.char_indices().rev().nth(STDERR_TAIL) {
                Some((at, _)) => &stderr[at..],
                None => stderr,
            };
            return Err(EngineError::Inference(format!("{}: {tail}", output.status)));
        }

        let text = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(text)
    }

    fn model_info(&self) -> Option<ModelInfo> {
        self.header().map(|h| ModelInfo {
            vocab_size: h.n_vocab,
            n_text_ctx: h.n_text_ctx,
            n_audio_ctx: h.n_audio_ctx,
            is_multilingual: h.is_multilingual(),
        })
    }
}
