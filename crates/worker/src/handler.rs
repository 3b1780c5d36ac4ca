//! MCP method dispatch for the whisper worker.

use std::path::{Path, PathBuf};

use protocol::{
    CallToolResult, Envelope, InitializeResult, ListToolsResult, PROTOCOL_VERSION,
    ServerCapabilities, ServerInfo, ToolsCapability, methods,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::engine::Transcriber;
use crate::error::DispatchError;
use crate::logfmt::clip;
use crate::server::Handler;
use crate::tools;

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "whisper-mcp-server";

/// Language used when a `transcribe` call does not name one.
const DEFAULT_LANGUAGE: &str = "auto";

type DispatchResult = Result<Option<Value>, DispatchError>;

/// Dispatches MCP methods to a [`Transcriber`], loading the model on the
/// first `initialize`.
pub struct WhisperHandler<T> {
    engine: T,
    model_path: PathBuf,
    model_loaded: bool,
}

impl<T: Transcriber> WhisperHandler<T> {
    pub fn new(engine: T, model_path: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            model_path: model_path.into(),
            model_loaded: false,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.model_loaded
    }

    pub fn engine(&self) -> &T {
        &self.engine
    }

    fn dispatch(&mut self, method: &str, params: Value) -> DispatchResult {
        match method {
            methods::INITIALIZE => self.initialize(),
            methods::TOOLS_LIST => list_tools(),
            methods::TOOLS_CALL => self.call_tool(params),
            methods::INITIALIZED => {
                info!("client initialization completed");
                Ok(None)
            }
            other => Err(DispatchError::MethodNotFound(format!(
                "Method not found: {other}"
            ))),
        }
    }

    fn load_model(&mut self) -> Result<(), DispatchError> {
        if self.model_loaded {
            return Ok(());
        }
        self.engine.load(&self.model_path).map_err(|e| {
            error!(error = %e, path = %self.model_path.display(), "failed to load model");
            DispatchError::Internal("Failed to load whisper model".to_string())
        })?;
        self.model_loaded = true;
        Ok(())
    }

    fn initialize(&mut self) -> DispatchResult {
        info!(path = %self.model_path.display(), "initialize");
        self.load_model()?;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };
        to_result(&result)
    }

    fn call_tool(&mut self, params: Value) -> DispatchResult {
        let name = match params.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                return Err(DispatchError::InvalidParams(
                    "Invalid tool name: expected a string".to_string(),
                ));
            }
            None => return Err(DispatchError::InvalidParams("Missing tool name".to_string())),
        };
        let arguments = match params.get("arguments") {
            Some(Value::Object(args)) => args.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(DispatchError::InvalidParams(
                    "Invalid arguments: expected an object".to_string(),
                ));
            }
        };

        debug!(tool = %clip(&name), "tools/call");
        match name.as_str() {
            tools::TRANSCRIBE => self.transcribe(&arguments),
            tools::MODEL_INFO => self.model_info(),
            other => Err(DispatchError::MethodNotFound(format!("Unknown tool: {other}"))),
        }
    }

    fn transcribe(&mut self, arguments: &Map<String, Value>) -> DispatchResult {
        let file = match arguments.get("file") {
            Some(Value::String(file)) => Path::new(file),
            Some(_) => {
                return Err(DispatchError::InvalidParams(
                    "Invalid parameter: file must be a string".to_string(),
                ));
            }
            None => {
                return Err(DispatchError::InvalidParams(
                    "Missing required parameter: file".to_string(),
                ));
            }
        };
        let language = match arguments.get("language") {
            Some(Value::String(language)) => language.as_str(),
            None | Some(Value::Null) => DEFAULT_LANGUAGE,
            Some(_) => {
                return Err(DispatchError::InvalidParams(
                    "Invalid parameter: language must be a string".to_string(),
                ));
            }
        };
        let translate = match arguments.get("translate") {
            Some(Value::Bool(translate)) => *translate,
            None | Some(Value::Null) => false,
            Some(_) => {
                return Err(DispatchError::InvalidParams(
                    "Invalid parameter: translate must be a boolean".to_string(),
                ));
            }
        };

        let shown_file = file.display().to_string();
        info!(
            file = %clip(&shown_file),
            language = %clip(language),
            translate,
            "transcribing"
        );
        let text = self
            .engine
            .transcribe(file, language, translate)
            .map_err(|e| DispatchError::Internal(format!("Transcription failed: {e}")))?;
        to_result(&CallToolResult::text(text))
    }

    fn model_info(&self) -> DispatchResult {
        let info = match self.engine.model_info() {
            Some(info) if self.model_loaded => info,
            _ => return Err(DispatchError::Internal("No model loaded".to_string())),
        };

        let report = ModelReport {
            model_path: self.model_path.display().to_string(),
            model_loaded: self.model_loaded,
            vocab_size: info.vocab_size,
            n_text_ctx: info.n_text_ctx,
            n_audio_ctx: info.n_audio_ctx,
            is_multilingual: info.is_multilingual,
        };
        let pretty = serde_json::to_string_pretty(&report)
            .map_err(|e| DispatchError::Internal(e.to_string()))?;
        to_result(&CallToolResult::text(format!("Model Information:\n{pretty}")))
    }
}

impl<T: Transcriber> Handler for WhisperHandler<T> {
    fn handle(&mut self, request: Envelope) -> Option<Envelope> {
        let Envelope {
            id, method, params, ..
        } = request;
        let method = method.unwrap_or_default();
        let outcome = self.dispatch(&method, params.unwrap_or(Value::Null));

        // Only the id on this exact message decides whether anything is sent.
        let id = id?;
        match outcome {
            Ok(Some(result)) => Some(Envelope::success(id, result)),
            Ok(None) => None,
            Err(e) => {
                let (shown_id, message) = (id.to_string(), e.to_string());
                error!(
                    id = %clip(&shown_id),
                    method = %clip(&method),
                    error = %clip(&message),
                    "request failed"
                );
                Some(Envelope::failure(id, e.into()))
            }
        }
    }
}

#[derive(Serialize)]
struct ModelReport {
    model_path: String,
    model_loaded: bool,
    vocab_size: i32,
    n_text_ctx: i32,
    n_audio_ctx: i32,
    is_multilingual: bool,
}

fn list_tools() -> DispatchResult {
    to_result(&ListToolsResult {
        tools: tools::catalog(),
    })
}

fn to_result(value: &impl Serialize) -> DispatchResult {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| DispatchError::Internal(e.to_string()))
}
