//! Tracing setup. Standard output carries protocol frames, so every log
//! line goes to standard error.

use tracing_subscriber::EnvFilter;

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "WHISPER_MCP_LOG";

/// Install the global subscriber. Safe to call more than once.
pub fn init() {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(directives))
        .with_ansi(false)
        .try_init();
}
