//! Line-delimited JSON-RPC 2.0 wire types for the whisper MCP worker.
//!
//! Both sides of the pipe speak in [`Envelope`]s: one JSON object per line,
//! newline-terminated. The presence of an `id` is what separates a request
//! (which gets exactly one response line) from a notification (which gets
//! none).
//!
//! # Example
//!
//! ```
//! use protocol::{Envelope, RequestId, methods};
//!
//! let request = Envelope::request(1, methods::TOOLS_LIST, None);
//! let line = request.to_line()?;
//! assert!(line.ends_with('\n'));
//!
//! let parsed = Envelope::from_line(&line)?;
//! assert_eq!(parsed.id, Some(RequestId::Number(1)));
//! # Ok::<(), serde_json::Error>(())
//! ```

mod envelope;
mod mcp;

pub use envelope::{Envelope, ErrorObject, JSONRPC_VERSION, RequestId, codes};
pub use mcp::{
    CallToolParams, CallToolResult, ClientCapabilities, ClientInfo, InitializeParams,
    InitializeResult, ListToolsResult, PROTOCOL_VERSION, ServerCapabilities, ServerInfo,
    ToolContent, ToolDescriptor, ToolsCapability, methods,
};
