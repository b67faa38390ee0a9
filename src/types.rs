//! Core domain types shared across the swarm service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Role an agent plays within a run. Unknown role strings deserialize to
/// `Coder`, which keeps every parsed plan inside the known role set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Orchestrator,
    Researcher,
    FactChecker,
    #[default]
    #[serde(other)]
    Coder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Orchestrator => "orchestrator",
            Role::Researcher => "researcher",
            Role::FactChecker => "fact_checker",
            Role::Coder => "coder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work the orchestrator hands to a worker agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub task: String,
}

/// Outcome of a single subtask. Exactly one of `summary`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskResult {
    pub subtask: Subtask,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Kind of progress event broadcast to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SwarmStarted,
    SwarmFinished,
    AgentStarted,
    AgentStatus,
    AgentFinished,
    ToolCall,
    ToolResult,
}

/// A structured progress event. Serialized once per emit and pushed verbatim
/// to every WebSocket subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            run_id: None,
            agent_id: None,
            role: None,
            status: None,
            message: None,
            tool_name: None,
            timestamp: Utc::now(),
            meta: None,
        }
    }

    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_normalizes_to_coder() {
        let role: Role = serde_json::from_str("\"analyst\"").unwrap();
        assert_eq!(role, Role::Coder);
        let role: Role = serde_json::from_str("\"fact_checker\"").unwrap();
        assert_eq!(role, Role::FactChecker);
    }

    #[test]
    fn event_omits_empty_fields() {
        let event = Event::new(EventType::SwarmStarted).with_run("run-1");
        let frame = serde_json::to_string(&event).unwrap();
        assert!(frame.contains("\"type\":\"swarm_started\""));
        assert!(frame.contains("\"run_id\":\"run-1\""));
        assert!(!frame.contains("agent_id"));
        assert!(!frame.contains("tool_name"));
    }

    #[test]
    fn subtask_defaults_missing_role_to_coder() {
        let subtask: Subtask = serde_json::from_str("{\"task\":\"do it\"}").unwrap();
        assert_eq!(subtask.role, Role::Coder);
    }
}
