//! Agent control tools: human-facing status messages and the distinguished
//! `finish` tool that ends a run with its summary.

use super::{object_schema, str_arg};
use crate::backboard::types::ToolDefinition;
use crate::tools::{ExecutionContext, Tool, ToolError};
use crate::types::{Event, EventType};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct MessageTool;

#[async_trait]
impl Tool for MessageTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "message",
            "Emit a human-facing agent status message",
            object_schema(json!({"content": {"type": "string"}}), &["content"]),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let content = str_arg(args, "content").ok_or_else(|| ToolError::new("content is required"))?;
        ctx.emit(
            Event::new(EventType::AgentStatus)
                .with_run(&ctx.run_id)
                .with_agent(&ctx.agent_id)
                .with_role(ctx.role)
                .with_status("message")
                .with_message(content),
        );
        Ok(json!({"ack": true}))
    }
}

pub struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "finish",
            "Signal that the agent is done and provide final summary",
            object_schema(json!({"summary": {"type": "string"}}), &["summary"]),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        // A blank summary still finishes the run; fall back to the raw
        // arguments so the caller sees what the model sent.
        let summary = match str_arg(args, "summary") {
            Some(summary) => summary.to_string(),
            None => serde_json::to_string(args)?,
        };
        ctx.set_finish_summary(&summary);
        ctx.emit(
            Event::new(EventType::AgentFinished)
                .with_run(&ctx.run_id)
                .with_agent(&ctx.agent_id)
                .with_role(ctx.role)
                .with_status("finished")
                .with_message(&summary),
        );
        Ok(json!({"done": true}))
    }
}
