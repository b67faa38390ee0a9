//! Allow-listed tool dispatch.
//!
//! The registry maps tool names to handlers and mediates every call the LLM
//! makes. Outputs sent back to the model are kept small: `message` and
//! `finish` report only `{"ok":true}`, since their payloads already reach
//! the user through events and the run summary, and echoing them back
//! inflates the conversation.

use crate::backboard::types::{ToolCall, ToolDefinition, ToolOutput};
use crate::gateway::events::EventBroadcaster;
use crate::state::TodoStore;
use crate::types::{Event, Role};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Error raised by a tool handler. The message is what the model sees in
/// the `{"ok":false,"error":...}` payload.
#[derive(Debug)]
pub struct ToolError(String);

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        ToolError(message.into())
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ToolError {}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError(err.to_string())
    }
}

impl From<regex::Error> for ToolError {
    fn from(err: regex::Error) -> Self {
        ToolError(err.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError(err.to_string())
    }
}

impl From<glob::PatternError> for ToolError {
    fn from(err: glob::PatternError) -> Self {
        ToolError(err.to_string())
    }
}

/// Everything a tool handler may touch while executing one call batch.
pub struct ExecutionContext {
    pub run_id: String,
    pub agent_id: String,
    pub role: Role,
    pub workspace_root: PathBuf,
    pub jina_api_key: String,
    pub request_timeout: Duration,
    pub todos: Arc<TodoStore>,
    pub emitter: Option<Arc<EventBroadcaster>>,
    finish_summary: Mutex<String>,
}

impl ExecutionContext {
    pub fn new(workspace_root: impl Into<PathBuf>, todos: Arc<TodoStore>) -> Self {
        Self {
            run_id: String::new(),
            agent_id: String::new(),
            role: Role::default(),
            workspace_root: workspace_root.into(),
            jina_api_key: String::new(),
            request_timeout: Duration::ZERO,
            todos,
            emitter: None,
            finish_summary: Mutex::new(String::new()),
        }
    }

    pub fn with_agent(mut self, run_id: &str, agent_id: &str, role: Role) -> Self {
        self.run_id = run_id.to_string();
        self.agent_id = agent_id.to_string();
        self.role = role;
        self
    }

    pub fn with_web(mut self, jina_api_key: &str, request_timeout: Duration) -> Self {
        self.jina_api_key = jina_api_key.to_string();
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<EventBroadcaster>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn set_finish_summary(&self, summary: &str) {
        *self.finish_summary.lock() = summary.to_string();
    }

    pub fn finish_summary(&self) -> String {
        self.finish_summary.lock().clone()
    }

    pub fn emit(&self, event: Event) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(event);
        }
    }
}

/// A single callable tool: a wire-advertised definition plus its handler.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError>;

    fn name(&self) -> String {
        self.definition().function.name
    }
}

/// Result of dispatching one tool call.
pub struct ToolExecution {
    pub output: ToolOutput,
    pub is_finish: bool,
    pub finish_summary: String,
    pub error: Option<ToolError>,
}

/// Registry of allow-listed tools. Registration is open at runtime so
/// plugins can add tools; the last registration for a name wins.
pub struct Registry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        self.tools.write().insert(name, tool);
    }

    /// Definitions advertised to the LLM service at assistant creation.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .values()
            .map(|tool| tool.definition())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Dispatch one call. Handler failures and unknown tools produce an
    /// `{"ok":false,...}` payload for the model *and* an error for the
    /// caller; the caller decides whether to keep going.
    pub async fn execute(&self, call: &ToolCall, ctx: &ExecutionContext) -> ToolExecution {
        let name = call.function.name.clone();

        let tool = self.tools.read().get(&name).cloned();
        let Some(tool) = tool else {
            let err = ToolError::new(format!("tool {:?} is not allowlisted", name));
            return failed_execution(call, err);
        };

        let args = match call.arguments_map() {
            Ok(args) => args,
            Err(err) => {
                let err = ToolError::new(format!("invalid arguments for {}: {}", name, err));
                return failed_execution(call, err);
            }
        };

        match tool.execute(&args, ctx).await {
            Err(err) => failed_execution(call, err),
            Ok(result) => {
                let is_finish = name == "finish";
                let payload = if name == "message" || name == "finish" {
                    json!({"ok": true})
                } else {
                    json!({"ok": true, "result": result})
                };
                ToolExecution {
                    output: ToolOutput {
                        tool_call_id: call.id.clone(),
                        output: payload.to_string(),
                    },
                    is_finish,
                    finish_summary: ctx.finish_summary(),
                    error: None,
                }
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn failed_execution(call: &ToolCall, err: ToolError) -> ToolExecution {
    ToolExecution {
        output: ToolOutput {
            tool_call_id: call.id.clone(),
            output: json!({"ok": false, "error": err.to_string()}).to_string(),
        },
        is_finish: false,
        finish_summary: String::new(),
        error: Some(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backboard::types::ToolCallFunction;
    use crate::tools::builtin;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: "1".to_string(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: name.to_string(),
                arguments: String::new(),
                parsed_arguments: Some(args),
            },
        }
    }

    fn test_ctx(root: &std::path::Path) -> ExecutionContext {
        ExecutionContext::new(root, Arc::new(TodoStore::new()))
    }

    #[tokio::test]
    async fn read_and_unknown_tool() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "hello world").unwrap();

        let registry = Registry::new();
        builtin::register_builtins(&registry);
        let ctx = test_ctx(tmp.path());

        let exec = registry
            .execute(&call("read", json!({"path": "a.txt"})), &ctx)
            .await;
        assert!(exec.error.is_none());
        assert!(exec.output.output.contains("hello world"));

        let exec = registry.execute(&call("not_allowed", json!({})), &ctx).await;
        assert!(exec.error.is_some());
        let payload: Value = serde_json::from_str(&exec.output.output).unwrap();
        assert_eq!(payload["ok"], json!(false));
        assert_eq!(
            payload["error"],
            json!("tool \"not_allowed\" is not allowlisted")
        );
    }

    #[tokio::test]
    async fn plugin_registration_is_dispatchable() {
        struct EchoTool;

        #[async_trait]
        impl Tool for EchoTool {
            fn definition(&self) -> ToolDefinition {
                ToolDefinition::function(
                    "echo",
                    "echo input",
                    builtin::object_schema(json!({"value": {"type": "string"}}), &["value"]),
                )
            }

            async fn execute(
                &self,
                args: &Map<String, Value>,
                _ctx: &ExecutionContext,
            ) -> Result<Value, ToolError> {
                Ok(json!({"value": args.get("value").cloned()}))
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        registry.register(Arc::new(EchoTool));

        let exec = registry
            .execute(&call("echo", json!({"value": "ok"})), &test_ctx(tmp.path()))
            .await;
        assert!(exec.error.is_none());
        assert!(exec.output.output.contains("ok"));
    }

    #[tokio::test]
    async fn message_and_finish_outputs_are_minimal() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        builtin::register_builtins(&registry);
        let ctx = test_ctx(tmp.path());

        let exec = registry
            .execute(&call("message", json!({"content": "verbose agent text"})), &ctx)
            .await;
        assert!(exec.error.is_none());
        assert!(!exec.is_finish);
        assert!(exec.finish_summary.is_empty());
        assert!(!exec.output.output.contains("verbose agent text"));

        let exec = registry
            .execute(
                &call("finish", json!({"summary": "final detailed summary"})),
                &ctx,
            )
            .await;
        assert!(exec.error.is_none());
        assert!(exec.is_finish);
        assert_eq!(exec.finish_summary, "final detailed summary");
        assert!(!exec.output.output.contains("final detailed summary"));

        let payload: Value = serde_json::from_str(&exec.output.output).unwrap();
        assert_eq!(payload, json!({"ok": true}));
    }

    #[tokio::test]
    async fn last_registration_wins() {
        struct FixedTool(&'static str);

        #[async_trait]
        impl Tool for FixedTool {
            fn definition(&self) -> ToolDefinition {
                ToolDefinition::function("fixed", "", builtin::object_schema(json!({}), &[]))
            }

            async fn execute(
                &self,
                _args: &Map<String, Value>,
                _ctx: &ExecutionContext,
            ) -> Result<Value, ToolError> {
                Ok(json!(self.0))
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        registry.register(Arc::new(FixedTool("first")));
        registry.register(Arc::new(FixedTool("second")));
        assert_eq!(registry.len(), 1);

        let exec = registry
            .execute(&call("fixed", json!({})), &test_ctx(tmp.path()))
            .await;
        assert!(exec.output.output.contains("second"));
    }
}
