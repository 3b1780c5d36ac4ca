//! Drives the real `whisper-mcp-server` binary over its standard streams.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use client::{Error, ProcessSupervisor, RpcClient, RpcTransport, ServerConfig};
use protocol::codes;
use serde_json::json;
use worker::fixtures::{BASE_HEADER, write_header};

const SERVER: &str = env!("CARGO_BIN_EXE_whisper-mcp-server");

fn write_model(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("ggml-base.bin");
    let mut file = std::fs::File::create(&path).unwrap();
    write_header(&mut file, &BASE_HEADER).unwrap();
    path
}

fn rpc_code(err: Error) -> i32 {
    match err {
        Error::Rpc(e) => e.code,
        other => panic!("expected rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn full_session() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let audio = dir.path().join("clip.wav");
    std::fs::write(&audio, b"RIFF").unwrap();

    // `echo` stands in for whisper-cli and prints its own argument list.
    let config = ServerConfig::new(SERVER)
        .args(["--model", model.to_str().unwrap(), "--whisper-bin", "echo"])
        .env("WHISPER_MCP_LOG", "debug");

    let mut client = RpcClient::new();
    client.start(&config).unwrap();
    assert!(client.wait_for_ready(Duration::from_secs(2)).await);

    let init = client.initialize("mcp-test-client", "1.0.0").await.unwrap();
    assert_eq!(init.protocol_version, protocol::PROTOCOL_VERSION);
    assert_eq!(init.server_info.name, "whisper-mcp-server");
    client.send_initialized().await.unwrap();

    let logs = client.drain_logs().unwrap();
    assert!(logs.contains("loading whisper model"), "logs: {logs}");

    let tools = client.list_tools().await.unwrap();
    let names: Vec<_> = tools.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["transcribe", "model_info"]);

    let info = client.call_tool("model_info", json!({})).await.unwrap();
    let text = info.joined_text();
    assert!(text.starts_with("Model Information:\n"));
    assert!(text.contains("\"vocab_size\": 51865"));
    assert!(text.contains("\"is_multilingual\": true"));

    let heard = client
        .call_tool("transcribe", json!({"file": audio, "language": "en"}))
        .await
        .unwrap();
    let heard = heard.joined_text();
    assert!(heard.contains(audio.to_str().unwrap()));
    assert!(heard.contains("-l en"));

    let err = client.call_tool("transcribe", json!({})).await.unwrap_err();
    assert_eq!(rpc_code(err), codes::INVALID_PARAMS);

    let err = client
        .call_tool("transcribe", json!({"file": dir.path().join("missing.wav")}))
        .await
        .unwrap_err();
    assert_eq!(rpc_code(err), codes::INTERNAL_ERROR);

    let err = client.call_tool("nonexistent", json!({})).await.unwrap_err();
    assert_eq!(rpc_code(err), codes::METHOD_NOT_FOUND);

    let err = client
        .request::<serde_json::Value>("resources/list", None)
        .await
        .unwrap_err();
    assert_eq!(rpc_code(err), codes::METHOD_NOT_FOUND);

    client.stop().await;
    assert!(!client.is_running());
    assert!(client.stop().await.is_none());
}

#[tokio::test]
async fn huge_method_names_still_get_method_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let config = ServerConfig::new(SERVER)
        .args(["--model", model.to_str().unwrap()])
        .env("WHISPER_MCP_LOG", "debug");

    let transport =
        RpcTransport::new(ProcessSupervisor::new()).with_read_timeout(Duration::from_secs(10));
    let mut client = RpcClient::with_transport(transport);
    client.start(&config).unwrap();

    let method = "x".repeat(100_000);
    for _ in 0..20 {
        let err = client
            .request::<serde_json::Value>(&method, None)
            .await
            .unwrap_err();
        assert_eq!(rpc_code(err), codes::METHOD_NOT_FOUND);
    }

    // Log fields are clipped, so the worker logs far less than it receives.
    let logs = client.drain_logs().unwrap();
    assert!(logs.contains("request failed"), "logs: {logs}");
    assert!(logs.len() < 100_000, "worker logged {} bytes", logs.len());

    client.stop().await;
}

#[tokio::test]
async fn transcribe_without_language_auto_detects() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let audio = dir.path().join("clip.wav");
    std::fs::write(&audio, b"RIFF").unwrap();

    // The configured language is validated at startup only.
    let config = ServerConfig::new(SERVER).args([
        "--model",
        model.to_str().unwrap(),
        "--whisper-bin",
        "echo",
        "--language",
        "en",
    ]);
    let mut client = RpcClient::new();
    client.start(&config).unwrap();
    client.initialize("mcp-test-client", "1.0.0").await.unwrap();

    let heard = client
        .call_tool("transcribe", json!({"file": audio}))
        .await
        .unwrap()
        .joined_text();
    assert!(heard.contains("-l auto"), "args: {heard}");
    assert!(!heard.contains("-tr"));

    client.stop().await;
}

#[tokio::test]
async fn unreadable_model_fails_initialize() {
    let config = ServerConfig::new(SERVER).args(["--model", "/nonexistent/ggml.bin"]);
    let mut client = RpcClient::new();
    client.start(&config).unwrap();

    let err = client.initialize("mcp-test-client", "1.0.0").await.unwrap_err();
    match err {
        Error::Rpc(e) => {
            assert_eq!(e.code, codes::INTERNAL_ERROR);
            assert_eq!(e.message, "Failed to load whisper model");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    client.stop().await;
}

#[test]
fn exits_cleanly_when_input_closes() {
    let mut child = Command::new(SERVER)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    writeln!(stdin, "this is not json").unwrap();
    writeln!(stdin, r#"{{"jsonrpc":"2.0","method":"notifications/initialized"}}"#).unwrap();
    writeln!(stdin, r#"{{"jsonrpc":"2.0","id":7,"method":"tools/list"}}"#).unwrap();
    drop(stdin);

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    let response: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(response["id"], 7);
    assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 2);
}

#[test]
fn unknown_language_exits_nonzero() {
    let output = Command::new(SERVER)
        .args(["--language", "klingon"])
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error: unknown language 'klingon'"));
    assert!(output.stdout.is_empty());
}
