//! Per-agent todo CRUD tools.

use super::{object_schema, str_arg};
use crate::backboard::types::ToolDefinition;
use crate::tools::{ExecutionContext, Tool, ToolError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct TodoCreateTool;

#[async_trait]
impl Tool for TodoCreateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "todo_create",
            "Create a todo item",
            object_schema(json!({"title": {"type": "string"}}), &["title"]),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let title = str_arg(args, "title").ok_or_else(|| ToolError::new("title is required"))?;
        let item = ctx.todos.create(&ctx.agent_id, title);
        Ok(serde_json::to_value(item)?)
    }
}

pub struct TodoUpdateTool;

#[async_trait]
impl Tool for TodoUpdateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "todo_update",
            "Update a todo title",
            object_schema(
                json!({"id": {"type": "string"}, "title": {"type": "string"}}),
                &["id", "title"],
            ),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let id = str_arg(args, "id");
        let title = str_arg(args, "title");
        let (Some(id), Some(title)) = (id, title) else {
            return Err(ToolError::new("id and title are required"));
        };
        let item = ctx
            .todos
            .update(&ctx.agent_id, id, title)
            .ok_or_else(|| ToolError::new(format!("todo {} not found", id)))?;
        Ok(serde_json::to_value(item)?)
    }
}

pub struct TodoDeleteTool;

#[async_trait]
impl Tool for TodoDeleteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "todo_delete",
            "Delete a todo by id",
            object_schema(json!({"id": {"type": "string"}}), &["id"]),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let id = str_arg(args, "id").ok_or_else(|| ToolError::new("id is required"))?;
        if !ctx.todos.delete(&ctx.agent_id, id) {
            return Err(ToolError::new(format!("todo {} not found", id)));
        }
        Ok(json!({"deleted": id}))
    }
}

pub struct TodoListTool;

#[async_trait]
impl Tool for TodoListTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "todo_list",
            "List current todos for this agent",
            object_schema(json!({}), &[]),
        )
    }

    async fn execute(
        &self,
        _args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        Ok(serde_json::to_value(ctx.todos.list(&ctx.agent_id))?)
    }
}

pub struct TodoCompleteTool;

#[async_trait]
impl Tool for TodoCompleteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "todo_complete",
            "Mark a todo as completed",
            object_schema(json!({"id": {"type": "string"}}), &["id"]),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let id = str_arg(args, "id").ok_or_else(|| ToolError::new("id is required"))?;
        let item = ctx
            .todos
            .complete(&ctx.agent_id, id)
            .ok_or_else(|| ToolError::new(format!("todo {} not found", id)))?;
        Ok(serde_json::to_value(item)?)
    }
}
