//! Model fixtures for tests in this and downstream crates.
//!
//! Compiled for unit tests and behind the `test-support` feature.

use std::io::{self, Write};

use crate::whisper::{GGML_MAGIC, ModelHeader};

/// Hyper-parameters of the multilingual `base` model.
pub const BASE_HEADER: ModelHeader = ModelHeader {
    n_vocab: 51865,
    n_audio_ctx: 1500,
    n_audio_state: 512,
    n_audio_head: 8,
    n_audio_layer: 6,
    n_text_ctx: 448,
    n_text_state: 512,
    n_text_head: 8,
    n_text_layer: 6,
    n_mels: 80,
    ftype: 1,
};

/// Write a ggml header with the given hyper-parameters.
pub fn write_header(out: &mut impl Write, header: &ModelHeader) -> io::Result<()> {
    out.write_all(&GGML_MAGIC.to_le_bytes())?;
    for field in [
        header.n_vocab,
        header.n_audio_ctx,
        header.n_audio_state,
        header.n_audio_head,
        header.n_audio_layer,
        header.n_text_ctx,
        header.n_text_state,
        header.n_text_head,
        header.n_text_layer,
        header.n_mels,
        header.ftype,
    ] {
        out.write_all(&field.to_le_bytes())?;
    }
    Ok(())
}
