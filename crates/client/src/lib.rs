//! Controlling side of the whisper MCP worker protocol.
//!
//! This crate spawns a worker process with its three standard streams
//! redirected to pipes, talks line-delimited JSON-RPC to it one request at a
//! time, drains its stderr without blocking, and shuts it down with a
//! `SIGTERM`-then-`SIGKILL` escalation that always reaps the child.
//!
//! # Example
//!
//! ```no_run
//! use client::{RpcClient, ServerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> client::Result<()> {
//! let config = ServerConfig::new("whisper-mcp-server")
//!     .args(["--model", "models/ggml-base.en.bin"]);
//!
//! let mut client = RpcClient::new();
//! client.start(&config)?;
//! if !client.wait_for_ready(Duration::from_secs(2)).await {
//!     return Ok(());
//! }
//!
//! let init = client.initialize("mcp-demo-client", "1.0.0").await?;
//! println!("connected to {}", init.server_info.name);
//! client.send_initialized().await?;
//!
//! let result = client.call_tool("transcribe", serde_json::json!({
//!     "file": "samples/jfk.wav"
//! })).await?;
//! println!("{}", result.joined_text());
//!
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod drain;
mod error;
mod pipe;
mod supervisor;
mod transport;

pub use client::RpcClient;
pub use drain::{LogDrain, MAX_PENDING_LOG};
pub use error::{Error, Result};
pub use supervisor::{GRACE_PERIOD, ProcessHandle, ProcessSupervisor, ServerConfig};
pub use transport::{MAX_RESPONSE_SIZE, RpcTransport, read_envelope, write_line};
