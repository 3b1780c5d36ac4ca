mod config;
mod error;
mod logging;

use std::io;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use worker::{StdioSink, WhisperCli, WhisperHandler, is_known_language, serve};

use config::Config;
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "whisper-mcp-server")]
#[command(about = "Whisper speech-to-text MCP server over stdio", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the ggml whisper model
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// whisper-cli executable
    #[arg(long = "whisper-bin")]
    whisper_bin: Option<String>,

    /// Number of threads per processor
    #[arg(short, long)]
    threads: Option<u32>,

    /// Number of processors
    #[arg(short, long)]
    processors: Option<u32>,

    /// Spoken language the model is expected to handle ("auto" to detect)
    #[arg(short, long)]
    language: Option<String>,

    /// Beam size for beam search
    #[arg(long, allow_negative_numbers = true)]
    beam_size: Option<i32>,

    /// Number of best candidates to keep
    #[arg(long)]
    best_of: Option<i32>,

    /// Initial prompt
    #[arg(long)]
    prompt: Option<String>,

    /// Disable GPU inference
    #[arg(long)]
    no_gpu: bool,

    /// Enable flash attention
    #[arg(long)]
    flash_attn: bool,
}

impl Cli {
    fn apply(self, mut config: Config) -> Config {
        let engine = &mut config.engine;
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(binary) = self.whisper_bin {
            engine.binary = binary;
        }
        if let Some(threads) = self.threads {
            engine.threads = threads;
        }
        if let Some(processors) = self.processors {
            engine.processors = processors;
        }
        if let Some(language) = self.language {
            engine.language = language;
        }
        if let Some(beam_size) = self.beam_size {
            engine.beam_size = beam_size;
        }
        if let Some(best_of) = self.best_of {
            engine.best_of = best_of;
        }
        if let Some(prompt) = self.prompt {
            engine.prompt = prompt;
        }
        engine.use_gpu &= !self.no_gpu;
        engine.flash_attn |= self.flash_attn;
        config
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    if let Err(e) = run(cli) {
        error!(error = %e, "worker failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path).map_err(|source| Error::Config {
            path: path.clone(),
            source,
        })?,
        None => Config::default(),
    };
    let config = cli.apply(config);

    if !is_known_language(&config.engine.language) {
        return Err(Error::UnknownLanguage(config.engine.language));
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.model.display(),
        binary = %config.engine.binary,
        "starting whisper MCP server"
    );

    let mut handler = WhisperHandler::new(WhisperCli::new(config.engine), config.model);

    let stdin = io::stdin();
    serve(stdin.lock(), &mut handler, &mut StdioSink::stdout())?;

    info!("whisper MCP server exiting");
    Ok(())
}
