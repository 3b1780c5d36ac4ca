use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use client::{RpcClient, ServerConfig};

const READY_LIMIT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "whisper-mcp-demo")]
#[command(about = "Drive a whisper MCP worker end to end", long_about = None)]
#[command(version)]
struct Cli {
    /// Worker executable
    #[arg(long, default_value = "whisper-mcp-server")]
    server: String,

    /// Audio file to transcribe after listing tools
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Extra arguments passed to the worker
    #[arg(last = true)]
    server_args: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("worker did not become ready within {0:?}")]
    NotReady(Duration),

    #[error(transparent)]
    Client(#[from] client::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let mut client = RpcClient::new();
    let outcome = run(&cli, &mut client).await;

    if let Err(e) = client.forward_logs() {
        warn!(error = %e, "failed to drain worker logs");
    }
    if let Some(status) = client.stop().await {
        info!(%status, "worker stopped");
    }

    if let Err(e) = outcome {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let directives = std::env::var("WHISPER_MCP_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(directives))
        .try_init();
}

async fn run(cli: &Cli, client: &mut RpcClient) -> Result<()> {
    let config = ServerConfig::new(&cli.server).args(&cli.server_args);
    client.start(&config)?;
    info!(server = %cli.server, pid = ?client.pid(), "worker started");

    if !client.wait_for_ready(READY_LIMIT).await {
        return Err(Error::NotReady(READY_LIMIT));
    }

    let init = client.initialize("mcp-demo-client", env!("CARGO_PKG_VERSION")).await?;
    banner("initialize", &init)?;
    client.send_initialized().await?;

    let tools = client.list_tools().await?;
    banner("tools/list", &tools)?;

    let model = client.call_tool("model_info", json!({})).await?;
    section("model_info");
    println!("{}", model.joined_text());

    if let Some(audio) = &cli.audio {
        let transcript = client
            .call_tool("transcribe", json!({ "file": audio }))
            .await?;
        section("transcribe");
        println!("{}", transcript.joined_text());
    }

    section("worker logs");
    print!("{}", client.drain_logs().unwrap_or_default());
    Ok(())
}

fn section(title: &str) {
    println!("\n=== {title} {}", "=".repeat(60usize.saturating_sub(title.len())));
}

fn banner(title: &str, value: &impl Serialize) -> Result<()> {
    section(title);
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
