//! Built-in tools available to every agent.

mod control;
mod fs;
mod todo;
mod web;

use crate::tools::Registry;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub use control::{FinishTool, MessageTool};
pub use fs::{GlobTool, GrepTool, LsTool, ReadTool};
pub use todo::{TodoCompleteTool, TodoCreateTool, TodoDeleteTool, TodoListTool, TodoUpdateTool};
pub use web::{WebFetchTool, WebSearchTool};

pub fn register_builtins(registry: &Registry) {
    registry.register(Arc::new(ReadTool));
    registry.register(Arc::new(LsTool));
    registry.register(Arc::new(GrepTool));
    registry.register(Arc::new(GlobTool));
    registry.register(Arc::new(WebSearchTool));
    registry.register(Arc::new(WebFetchTool));
    registry.register(Arc::new(MessageTool));
    registry.register(Arc::new(TodoCreateTool));
    registry.register(Arc::new(TodoUpdateTool));
    registry.register(Arc::new(TodoDeleteTool));
    registry.register(Arc::new(TodoListTool));
    registry.register(Arc::new(TodoCompleteTool));
    registry.register(Arc::new(FinishTool));
}

/// JSON-schema shell for an object with the given properties.
pub fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({"type": "object", "properties": properties, "required": required})
}

/// Trimmed, non-empty string argument; anything else is absent.
pub(crate) fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Positive integer argument with a fallback for absent, non-numeric, or
/// non-positive values.
pub(crate) fn int_arg(args: &Map<String, Value>, key: &str, fallback: usize) -> usize {
    args.get(key)
        .and_then(Value::as_f64)
        .map(|v| v as i64)
        .filter(|v| *v > 0)
        .map(|v| v as usize)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_arg_coerces_and_falls_back() {
        let mut args = Map::new();
        args.insert("n".to_string(), json!(25000));
        assert_eq!(int_arg(&args, "n", 100), 25000);

        args.insert("n".to_string(), json!(25000.0));
        assert_eq!(int_arg(&args, "n", 100), 25000);

        args.insert("n".to_string(), json!(-5));
        assert_eq!(int_arg(&args, "n", 100), 100);

        args.insert("n".to_string(), json!("25000"));
        assert_eq!(int_arg(&args, "n", 100), 100);

        assert_eq!(int_arg(&args, "missing", 100), 100);
    }

    #[test]
    fn str_arg_rejects_blank() {
        let mut args = Map::new();
        args.insert("s".to_string(), json!("  "));
        assert_eq!(str_arg(&args, "s"), None);

        args.insert("s".to_string(), json!(" value "));
        assert_eq!(str_arg(&args, "s"), Some("value"));
    }
}
