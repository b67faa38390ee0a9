pub mod builtin;
pub mod registry;

pub use registry::{ExecutionContext, Registry, Tool, ToolError, ToolExecution};
