//! Static tool catalog.

use protocol::ToolDescriptor;
use serde_json::json;

pub const TRANSCRIBE: &str = "transcribe";
pub const MODEL_INFO: &str = "model_info";

/// The two tools this worker exposes.
pub fn catalog() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: TRANSCRIBE.to_string(),
            description: Some("Transcribe audio file using persistent whisper.cpp model".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file": {
                        "type": "string",
                        "description": "Path to audio file"
                    },
                    "language": {
                        "type": "string",
                        "description": "Language code (optional, auto-detect if not specified)",
                        "default": "auto"
                    },
                    "translate": {
                        "type": "boolean",
                        "description": "Translate to English",
                        "default": false
                    }
                },
                "required": ["file"]
            }),
        },
        ToolDescriptor {
            name: MODEL_INFO.to_string(),
            description: Some("Get information about loaded model".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_transcribe_and_model_info() {
        let tools = catalog();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec![TRANSCRIBE, MODEL_INFO]);
        assert_eq!(tools[0].required(), vec!["file"]);
        assert!(tools[1].required().is_empty());
    }
}
