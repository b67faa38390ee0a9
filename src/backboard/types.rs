//! Wire types for the Backboard assistant service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
pub const STATUS_REQUIRES_ACTION: &str = "REQUIRES_ACTION";
pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_CANCELLED: &str = "CANCELLED";

/// The service returns status strings in mixed case across variants;
/// compare only after normalizing.
pub fn normalize_status(status: &str) -> String {
    status.trim().to_uppercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAssistantRequest {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assistant {
    pub assistant_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub thread_id: String,
}

/// Fields for the multipart message post. Empty fields are omitted from the
/// form; `send_to_llm` defaults to `"true"` on the wire.
#[derive(Debug, Clone, Default)]
pub struct AddMessageRequest {
    pub thread_id: String,
    pub content: String,
    pub llm_provider: String,
    pub model_name: String,
    pub memory: String,
    pub web_search: String,
    pub send_to_llm: String,
    pub stream: bool,
    pub metadata_json: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub parsed_arguments: Option<Value>,
}

impl ToolCall {
    /// Structured arguments for the call. Prefers the pre-parsed form when
    /// the service sends one, otherwise decodes the raw JSON string; empty
    /// arguments yield the empty map.
    pub fn arguments_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        if let Some(parsed) = &self.function.parsed_arguments {
            if !parsed.is_null() {
                return serde_json::from_value(parsed.clone());
            }
        }
        if self.function.arguments.is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&self.function.arguments)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitToolOutputsRequest {
    pub tool_outputs: Vec<ToolOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_map_prefers_parsed_form() {
        let call = ToolCall {
            id: "1".to_string(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: "read".to_string(),
                arguments: "{\"path\":\"raw.txt\"}".to_string(),
                parsed_arguments: Some(json!({"path": "parsed.txt"})),
            },
        };
        let args = call.arguments_map().unwrap();
        assert_eq!(args.get("path").and_then(|v| v.as_str()), Some("parsed.txt"));
    }

    #[test]
    fn arguments_map_falls_back_to_raw_string() {
        let call = ToolCall {
            function: ToolCallFunction {
                name: "read".to_string(),
                arguments: "{\"path\":\"raw.txt\"}".to_string(),
                parsed_arguments: None,
            },
            ..ToolCall::default()
        };
        let args = call.arguments_map().unwrap();
        assert_eq!(args.get("path").and_then(|v| v.as_str()), Some("raw.txt"));
    }

    #[test]
    fn empty_arguments_parse_to_empty_map() {
        let call = ToolCall::default();
        assert!(call.arguments_map().unwrap().is_empty());

        let call = ToolCall {
            function: ToolCallFunction {
                parsed_arguments: Some(Value::Null),
                ..ToolCallFunction::default()
            },
            ..ToolCall::default()
        };
        assert!(call.arguments_map().unwrap().is_empty());
    }

    #[test]
    fn status_normalization_uppercases() {
        assert_eq!(normalize_status("requires_action"), STATUS_REQUIRES_ACTION);
        assert_eq!(normalize_status(" Completed "), STATUS_COMPLETED);
        assert_eq!(normalize_status("in_progress"), STATUS_IN_PROGRESS);
        assert_eq!(normalize_status("failed"), STATUS_FAILED);
        assert_eq!(normalize_status("Cancelled"), STATUS_CANCELLED);
    }
}
