//! Client-side error types.

use protocol::ErrorObject;
use thiserror::Error;

/// Errors raised while supervising or talking to a worker.
///
/// None of these are retried: a retry would re-send into a worker whose
/// state is unknown.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Pipe creation, process creation, or stream wrapping failed.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// `start` was called while a worker is already supervised.
    #[error("worker already running")]
    AlreadyRunning,

    /// The worker is not running or writing the request failed.
    #[error("failed to write request: {0}")]
    Write(#[source] std::io::Error),

    /// End of stream or I/O error before a full response line arrived.
    #[error("failed to read response: {0}")]
    Read(#[source] std::io::Error),

    /// The response line was not a valid envelope.
    #[error("malformed response {line:?}: {source}")]
    MalformedResponse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response line did not end within `max` bytes.
    #[error("response exceeds {max} bytes")]
    ResponseTooLarge { max: usize },

    /// No response within the configured read deadline.
    #[error("timeout waiting for response")]
    Timeout,

    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The worker answered with a JSON-RPC error object.
    #[error("JSON-RPC error: {0}")]
    Rpc(#[from] ErrorObject),

    /// The result did not have the shape the method promises.
    #[error("unexpected result shape: {0}")]
    InvalidResult(#[source] serde_json::Error),

    /// The worker marked a tool result with `isError`.
    #[error("tool call failed: {0}")]
    ToolCallFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
