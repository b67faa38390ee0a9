//! Process-local state: assistant ids per role, per-agent todo lists, and
//! run records. Nothing here survives a restart.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Maps a role name to the assistant id created for it on the LLM service.
#[derive(Default)]
pub struct AssistantStore {
    ids: RwLock<HashMap<String, String>>,
}

impl AssistantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: &str) -> Option<String> {
        self.ids.read().get(role).cloned()
    }

    pub fn set(&self, role: &str, assistant_id: &str) {
        self.ids
            .write()
            .insert(role.to_string(), assistant_id.to_string());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-agent todo lists with a process-wide monotonic id sequence.
#[derive(Default)]
pub struct TodoStore {
    by_agent: RwLock<HashMap<String, HashMap<String, TodoItem>>>,
    seq: AtomicU64,
}

impl TodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, agent_id: &str, title: &str) -> TodoItem {
        let id = format!("todo-{}", self.seq.fetch_add(1, Ordering::SeqCst) + 1);
        let item = TodoItem {
            id: id.clone(),
            title: title.to_string(),
            completed: false,
            created_at: Utc::now(),
        };
        self.by_agent
            .write()
            .entry(agent_id.to_string())
            .or_default()
            .insert(id, item.clone());
        item
    }

    pub fn update(&self, agent_id: &str, id: &str, title: &str) -> Option<TodoItem> {
        let mut guard = self.by_agent.write();
        let item = guard.get_mut(agent_id)?.get_mut(id)?;
        item.title = title.to_string();
        Some(item.clone())
    }

    pub fn delete(&self, agent_id: &str, id: &str) -> bool {
        let mut guard = self.by_agent.write();
        match guard.get_mut(agent_id) {
            Some(todos) => todos.remove(id).is_some(),
            None => false,
        }
    }

    pub fn complete(&self, agent_id: &str, id: &str) -> Option<TodoItem> {
        let mut guard = self.by_agent.write();
        let item = guard.get_mut(agent_id)?.get_mut(id)?;
        item.completed = true;
        Some(item.clone())
    }

    /// Snapshot of an agent's todos; ordering is unspecified.
    pub fn list(&self, agent_id: &str) -> Vec<TodoItem> {
        self.by_agent
            .read()
            .get(agent_id)
            .map(|todos| todos.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: String,
    pub task: String,
    pub status: RunState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Run records keyed by run id. Status only ever moves forward:
/// queued -> running -> completed|failed.
#[derive(Default)]
pub struct RunStore {
    runs: RwLock<HashMap<String, RunStatus>>,
    seq: AtomicU64,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_run(&self, task: &str) -> String {
        let id = format!(
            "run-{}-{}",
            Utc::now().timestamp_millis(),
            self.seq.fetch_add(1, Ordering::SeqCst) + 1
        );
        self.runs.write().insert(
            id.clone(),
            RunStatus {
                run_id: id.clone(),
                task: task.to_string(),
                status: RunState::Queued,
                summary: String::new(),
                error: String::new(),
                started_at: Utc::now(),
                finished_at: None,
            },
        );
        id
    }

    pub fn set_running(&self, run_id: &str) {
        if let Some(run) = self.runs.write().get_mut(run_id) {
            run.status = RunState::Running;
        }
    }

    pub fn set_completed(&self, run_id: &str, summary: &str) {
        if let Some(run) = self.runs.write().get_mut(run_id) {
            run.status = RunState::Completed;
            run.summary = summary.to_string();
            run.finished_at = Some(Utc::now());
        }
    }

    pub fn set_failed(&self, run_id: &str, error: &str) {
        if let Some(run) = self.runs.write().get_mut(run_id) {
            run.status = RunState::Failed;
            run.error = error.to_string();
            run.finished_at = Some(Utc::now());
        }
    }

    pub fn get(&self, run_id: &str) -> Option<RunStatus> {
        self.runs.read().get(run_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_store_transitions() {
        let store = RunStore::new();
        let id = store.new_run("investigate");
        assert!(id.starts_with("run-"));

        let run = store.get(&id).unwrap();
        assert_eq!(run.status, RunState::Queued);
        assert!(run.finished_at.is_none());

        store.set_running(&id);
        assert_eq!(store.get(&id).unwrap().status, RunState::Running);

        store.set_completed(&id, "all done");
        let run = store.get(&id).unwrap();
        assert_eq!(run.status, RunState::Completed);
        assert_eq!(run.summary, "all done");
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn run_ids_are_unique() {
        let store = RunStore::new();
        let a = store.new_run("a");
        let b = store.new_run("b");
        assert_ne!(a, b);
    }

    #[test]
    fn todo_store_crud() {
        let store = TodoStore::new();
        let item = store.create("agent-1", "write tests");
        assert!(item.id.starts_with("todo-"));
        assert!(!item.completed);

        let updated = store.update("agent-1", &item.id, "write more tests").unwrap();
        assert_eq!(updated.title, "write more tests");

        let done = store.complete("agent-1", &item.id).unwrap();
        assert!(done.completed);

        assert_eq!(store.list("agent-1").len(), 1);
        assert!(store.list("agent-2").is_empty());

        assert!(store.delete("agent-1", &item.id));
        assert!(!store.delete("agent-1", &item.id));
    }

    #[test]
    fn todo_store_unknown_ids_fail() {
        let store = TodoStore::new();
        assert!(store.update("agent-1", "todo-99", "x").is_none());
        assert!(store.complete("agent-1", "todo-99").is_none());
    }

    #[test]
    fn assistant_store_get_set() {
        let store = AssistantStore::new();
        assert!(store.get("coder").is_none());
        store.set("coder", "asst-1");
        assert_eq!(store.get("coder").as_deref(), Some("asst-1"));
    }
}
