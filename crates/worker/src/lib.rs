//! Worker side of the whisper MCP protocol.
//!
//! [`serve`] reads JSON-RPC lines from an input stream, hands each valid
//! envelope to a [`Handler`], and writes responses to a [`ResponseSink`].
//! [`WhisperHandler`] implements the MCP methods (`initialize`,
//! `tools/list`, `tools/call`, `notifications/initialized`) on top of a
//! [`Transcriber`]; [`WhisperCli`] is the production transcriber.
//!
//! # Example
//!
//! ```no_run
//! use worker::{StdioSink, WhisperCli, WhisperHandler, WhisperOptions, serve};
//!
//! let engine = WhisperCli::new(WhisperOptions::default());
//! let mut handler = WhisperHandler::new(engine, "models/ggml-base.en.bin");
//! let stdin = std::io::stdin();
//! serve(stdin.lock(), &mut handler, &mut StdioSink::stdout())?;
//! # Ok::<(), std::io::Error>(())
//! ```

mod engine;
mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;
mod handler;
mod logfmt;
mod server;
mod sink;
pub mod tools;
pub mod whisper;

pub use engine::{ModelInfo, Transcriber};
pub use error::{DispatchError, EngineError, Result};
pub use handler::{SERVER_NAME, WhisperHandler};
pub use logfmt::MAX_LOGGED_CHARS;
pub use server::{Handler, ServeStats, serve};
pub use sink::{MemorySink, ResponseSink, StdioSink};
pub use whisper::{WhisperCli, WhisperOptions, is_known_language};
