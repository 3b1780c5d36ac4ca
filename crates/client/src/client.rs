//! MCP protocol operations on top of [`RpcTransport`].

use std::io;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use protocol::{
    CallToolParams, CallToolResult, Envelope, InitializeParams, InitializeResult,
    ListToolsResult, RequestId, methods,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::supervisor::{ProcessSupervisor, ServerConfig};
use crate::transport::RpcTransport;

/// Poll interval for [`RpcClient::wait_for_ready`].
const READY_POLL: Duration = Duration::from_millis(10);

/// Extra time given to the worker after it is marked running.
const READY_SETTLE: Duration = Duration::from_millis(100);

/// A client session with one worker process.
///
/// Request ids start at 1 and increase by one per request for the whole
/// life of the session; they are never reset, even across restarts.
pub struct RpcClient {
    transport: RpcTransport,
    next_id: i64,
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcClient {
    pub fn new() -> Self {
        Self::with_transport(RpcTransport::new(ProcessSupervisor::new()))
    }

    pub fn with_transport(transport: RpcTransport) -> Self {
        Self {
            transport,
            next_id: 0,
        }
    }

    /// Start the worker process.
    pub fn start(&mut self, config: &ServerConfig) -> Result<()> {
        self.transport.supervisor_mut().start(config)
    }

    /// Stop the worker process. Safe to call repeatedly.
    pub async fn stop(&mut self) -> Option<ExitStatus> {
        self.transport.supervisor_mut().stop().await
    }

    pub fn is_running(&self) -> bool {
        self.transport.supervisor().is_running()
    }

    pub fn pid(&self) -> Option<u32> {
        self.transport.supervisor().pid()
    }

    /// Poll until the worker is marked running, then give it a short settle
    /// period. Returns `false` on timeout; never errors.
    pub async fn wait_for_ready(&self, limit: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < limit {
            if self.is_running() {
                tokio::time::sleep(READY_SETTLE).await;
                return true;
            }
            tokio::time::sleep(READY_POLL).await;
        }
        false
    }

    /// Worker stderr written since the last drain. Never blocks.
    pub fn drain_logs(&mut self) -> io::Result<String> {
        self.transport.supervisor_mut().drain_logs()
    }

    /// Re-emit worker stderr lines as `tracing` events. Never blocks.
    pub fn forward_logs(&mut self) -> io::Result<usize> {
        self.transport.supervisor_mut().forward_logs()
    }

    pub fn transport_mut(&mut self) -> &mut RpcTransport {
        &mut self.transport
    }

    /// Perform the `initialize` handshake request.
    pub async fn initialize(
        &mut self,
        client_name: &str,
        client_version: &str,
    ) -> Result<InitializeResult> {
        let params = InitializeParams::new(client_name, client_version);
        self.request(methods::INITIALIZE, Some(to_value(params)?))
            .await
    }

    /// Tell the worker the handshake is complete. No response is read.
    pub async fn send_initialized(&mut self) -> Result<()> {
        self.notify(methods::INITIALIZED, None).await
    }

    /// Fetch the tool catalog.
    pub async fn list_tools(&mut self) -> Result<ListToolsResult> {
        self.request(methods::TOOLS_LIST, None).await
    }

    /// Call a tool by name.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let result: CallToolResult = self
            .request(methods::TOOLS_CALL, Some(to_value(params)?))
            .await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.joined_text()));
        }
        Ok(result)
    }

    /// Send an arbitrary request and decode its result.
    pub async fn request<R>(&mut self, method: &str, params: Option<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let request = Envelope::request(id.clone(), method, params);
        debug!(%id, method, "request");

        let response = self
            .transport
            .send(&request)
            .await?
            .ok_or_else(|| Error::Read(io::Error::other("no response to request")))?;

        // Correlation is positional; a foreign id is suspicious but not fatal.
        if response.id.as_ref() != Some(&id) {
            warn!(expected = %id, got = ?response.id, method, "response id mismatch");
        }

        let value = response.into_result()?;
        serde_json::from_value(value).map_err(Error::InvalidResult)
    }

    /// Send an arbitrary notification.
    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        debug!(method, "notification");
        self.transport
            .send(&Envelope::notification(method, params))
            .await
            .map(|_| ())
    }

    /// Next request id: 1, 2, 3, ...
    pub fn next_request_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId::Number(self.next_id)
    }
}

fn to_value(params: impl serde::Serialize) -> Result<Value> {
    serde_json::to_value(params).map_err(Error::Serialize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::codes;

    /// Answers every line with a canned response whose id is 1.
    fn fixed_responder(response: &str) -> ServerConfig {
        let script = format!("while read -r line; do printf '%s\\n' '{response}'; done");
        ServerConfig::new("sh").args(["-c".to_string(), script])
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut client = RpcClient::new();
        assert_eq!(client.next_request_id(), RequestId::Number(1));
        assert_eq!(client.next_request_id(), RequestId::Number(2));
        assert_eq!(client.next_request_id(), RequestId::Number(3));
    }

    #[tokio::test]
    async fn wait_for_ready_times_out_without_worker() {
        let client = RpcClient::new();
        let started = Instant::now();
        assert!(!client.wait_for_ready(Duration::from_millis(50)).await);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn wait_for_ready_after_start() {
        let mut client = RpcClient::new();
        client.start(&ServerConfig::new("cat")).unwrap();
        assert!(client.wait_for_ready(Duration::from_secs(1)).await);
        client.stop().await;
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn error_response_surfaces_code() {
        let mut client = RpcClient::new();
        client
            .start(&fixed_responder(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Unknown tool: nonexistent"}}"#,
            ))
            .unwrap();

        let err = client
            .call_tool("nonexistent", serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            Error::Rpc(e) => assert_eq!(e.code, codes::METHOD_NOT_FOUND),
            other => panic!("unexpected error: {other}"),
        }
        client.stop().await;
    }

    #[tokio::test]
    async fn mismatched_id_still_returns_result() {
        let mut client = RpcClient::new();
        client
            .start(&fixed_responder(r#"{"jsonrpc":"2.0","id":99,"result":{"tools":[]}}"#))
            .unwrap();

        let tools = client.list_tools().await.unwrap();
        assert!(tools.tools.is_empty());
        client.stop().await;
    }

    #[tokio::test]
    async fn ids_keep_increasing_across_restarts() {
        let mut client = RpcClient::new();
        client.start(&ServerConfig::new("cat")).unwrap();
        // `cat` echoes the request back, which has neither result nor error.
        let first: Value = client.request("ping", None).await.unwrap();
        assert_eq!(first, Value::Null);
        client.stop().await;

        client.start(&ServerConfig::new("cat")).unwrap();
        assert_eq!(client.next_request_id(), RequestId::Number(2));
        client.stop().await;
    }
}
