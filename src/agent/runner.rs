//! Drives one LLM conversation for one subtask to a terminal state.
//!
//! The loop: post the task message, then repeatedly inspect the run status,
//! executing and submitting tool outputs on `REQUIRES_ACTION`, returning on
//! `COMPLETED` or a `finish` tool call, failing on `FAILED`/`CANCELLED`,
//! and idling briefly on anything else, up to a configurable iteration cap.

use crate::backboard::types::{
    normalize_status, AddMessageRequest, CreateAssistantRequest, MessageResponse, ToolCall,
    ToolOutput, STATUS_CANCELLED, STATUS_COMPLETED, STATUS_FAILED, STATUS_REQUIRES_ACTION,
};
use crate::backboard::{ApiError, Client};
use crate::config::Config;
use crate::gateway::events::EventBroadcaster;
use crate::state::{AssistantStore, TodoStore};
use crate::tools::{ExecutionContext, Registry};
use crate::types::{Event, EventType, Role};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const RETRY_LIMIT: usize = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(800);
const IDLE_POLL_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct TaskInput {
    pub run_id: String,
    pub agent_id: String,
    pub role: Role,
    pub task: String,
}

#[derive(Debug, Clone, Default)]
pub struct TaskResult {
    pub summary: String,
    pub raw: String,
}

/// Seam between the coordinator and the conversation driver.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, input: TaskInput) -> Result<TaskResult, String>;

    /// Drop all sessions created for the given run.
    fn end_run(&self, run_id: &str);
}

#[derive(Clone)]
struct AgentSession {
    assistant_id: String,
    thread_id: String,
}

pub struct Runner {
    client: Client,
    cfg: Config,
    registry: Arc<Registry>,
    assistants: Arc<AssistantStore>,
    todos: Arc<TodoStore>,
    prompts: crate::agent::PromptStore,
    events: Arc<EventBroadcaster>,
    // Collapses concurrent assistant creation for the same role.
    ensure_lock: tokio::sync::Mutex<()>,
    sessions: parking_lot::Mutex<HashMap<String, AgentSession>>,
    retry_limit: usize,
}

impl Runner {
    pub fn new(
        client: Client,
        cfg: Config,
        registry: Arc<Registry>,
        assistants: Arc<AssistantStore>,
        todos: Arc<TodoStore>,
        prompts: crate::agent::PromptStore,
        events: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            client,
            cfg,
            registry,
            assistants,
            todos,
            prompts,
            events,
            ensure_lock: tokio::sync::Mutex::new(()),
            sessions: parking_lot::Mutex::new(HashMap::new()),
            retry_limit: RETRY_LIMIT,
        }
    }

    async fn get_or_create_session(
        &self,
        run_id: &str,
        agent_id: &str,
        role: Role,
    ) -> Result<(AgentSession, bool), String> {
        let key = session_key(run_id, agent_id);
        if let Some(session) = self.sessions.lock().get(&key).cloned() {
            return Ok((session, false));
        }

        let assistant_id = self.ensure_assistant(role).await?;
        let thread = self
            .client
            .create_thread(&assistant_id)
            .await
            .map_err(|e| format!("create thread: {}", e))?;

        let session = AgentSession {
            assistant_id,
            thread_id: thread.thread_id,
        };
        self.sessions.lock().insert(key, session.clone());
        Ok((session, true))
    }

    async fn ensure_assistant(&self, role: Role) -> Result<String, String> {
        if let Some(id) = self.assistants.get(role.as_str()) {
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let _guard = self.ensure_lock.lock().await;
        // Double-check: another task may have created it while we waited.
        if let Some(id) = self.assistants.get(role.as_str()) {
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let assistant = self
            .client
            .create_assistant(&CreateAssistantRequest {
                name: format!("wuvo-{}", role),
                system_prompt: self.prompts.for_role(role),
                description: String::new(),
                tools: self.registry.definitions(),
            })
            .await
            .map_err(|e| format!("create assistant for role {}: {}", role, e))?;

        self.assistants.set(role.as_str(), &assistant.assistant_id);
        Ok(assistant.assistant_id)
    }

    async fn add_message_with_retry(
        &self,
        input: &TaskInput,
        req: &AddMessageRequest,
    ) -> Result<MessageResponse, ApiError> {
        let mut last_err: Option<ApiError> = None;
        for attempt in 1..=self.retry_limit {
            match self.client.add_message(req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    let transient = is_transient(&err.to_string());
                    let text = err.to_string();
                    last_err = Some(err);
                    if !transient || attempt == self.retry_limit {
                        break;
                    }
                    let delay = RETRY_BASE_DELAY * attempt as u32;
                    self.events.emit(
                        Event::new(EventType::AgentStatus)
                            .with_run(&input.run_id)
                            .with_agent(&input.agent_id)
                            .with_role(input.role)
                            .with_status("retrying")
                            .with_message(format!(
                                "add_message transient failure (attempt {}/{}): {}; retrying in {:?}",
                                attempt, self.retry_limit, text, delay
                            )),
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ApiError::new("add_message failed")))
    }

    async fn submit_tool_outputs_with_retry(
        &self,
        input: &TaskInput,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<MessageResponse, ApiError> {
        let mut last_err: Option<ApiError> = None;
        for attempt in 1..=self.retry_limit {
            match self
                .client
                .submit_tool_outputs(thread_id, run_id, outputs.clone())
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    let transient = is_transient(&err.to_string());
                    let text = err.to_string();
                    last_err = Some(err);
                    if !transient || attempt == self.retry_limit {
                        break;
                    }
                    let delay = RETRY_BASE_DELAY * attempt as u32;
                    self.events.emit(
                        Event::new(EventType::AgentStatus)
                            .with_run(&input.run_id)
                            .with_agent(&input.agent_id)
                            .with_role(input.role)
                            .with_status("retrying")
                            .with_message(format!(
                                "submit_tool_outputs transient failure (attempt {}/{}): {}; retrying in {:?}",
                                attempt, self.retry_limit, text, delay
                            ))
                            .with_meta(json!({"thread_id": thread_id, "run_id": run_id})),
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ApiError::new("submit_tool_outputs failed")))
    }
}

#[async_trait]
impl TaskRunner for Runner {
    async fn run_task(&self, input: TaskInput) -> Result<TaskResult, String> {
        let (session, created) = self
            .get_or_create_session(&input.run_id, &input.agent_id, input.role)
            .await?;

        if created {
            self.events.emit(
                Event::new(EventType::AgentStarted)
                    .with_run(&input.run_id)
                    .with_agent(&input.agent_id)
                    .with_role(input.role)
                    .with_message(format!(
                        "starting (assistant={} thread={})",
                        session.assistant_id, session.thread_id
                    ))
                    .with_meta(json!({
                        "assistant_id": session.assistant_id,
                        "thread_id": session.thread_id,
                    })),
            );
        } else {
            self.events.emit(
                Event::new(EventType::AgentStatus)
                    .with_run(&input.run_id)
                    .with_agent(&input.agent_id)
                    .with_role(input.role)
                    .with_status("session_reuse")
                    .with_message(format!("continuing on existing thread {}", session.thread_id))
                    .with_meta(json!({
                        "assistant_id": session.assistant_id,
                        "thread_id": session.thread_id,
                    })),
            );
        }

        let mut resp = self
            .add_message_with_retry(
                &input,
                &AddMessageRequest {
                    thread_id: session.thread_id.clone(),
                    content: input.task.clone(),
                    llm_provider: self.cfg.llm_provider.clone(),
                    model_name: self.cfg.model_name.clone(),
                    memory: self.cfg.memory_mode.clone(),
                    web_search: self.cfg.web_search_mode.clone(),
                    send_to_llm: "true".to_string(),
                    stream: false,
                    metadata_json: String::new(),
                },
            )
            .await
            .map_err(|e| format!("add message: {}", e))?;

        let mut finish_summary = String::new();
        for i in 0..self.cfg.max_iterations {
            let status = normalize_status(&resp.status);
            self.events.emit(
                Event::new(EventType::AgentStatus)
                    .with_run(&input.run_id)
                    .with_agent(&input.agent_id)
                    .with_role(input.role)
                    .with_status(&status)
                    .with_message(status_message(&resp))
                    .with_meta(json!({
                        "iteration": i + 1,
                        "max_iterations": self.cfg.max_iterations,
                        "tool_calls": resp.tool_calls.len(),
                        "thread_id": session.thread_id,
                    })),
            );

            match status.as_str() {
                STATUS_REQUIRES_ACTION => {
                    if resp.tool_calls.is_empty() {
                        return Err("requires action with no tool calls".to_string());
                    }

                    let ctx = ExecutionContext::new(
                        self.cfg.workspace_root.clone(),
                        self.todos.clone(),
                    )
                    .with_agent(&input.run_id, &input.agent_id, input.role)
                    .with_web(&self.cfg.jina_api_key, self.cfg.request_timeout)
                    .with_emitter(self.events.clone());

                    let total = resp.tool_calls.len();
                    let mut outputs = Vec::with_capacity(total);
                    let mut finished = false;
                    for (idx, call) in resp.tool_calls.iter().enumerate() {
                        self.events.emit(
                            Event::new(EventType::ToolCall)
                                .with_run(&input.run_id)
                                .with_agent(&input.agent_id)
                                .with_role(input.role)
                                .with_tool(&call.function.name)
                                .with_message(format!(
                                    "executing tool {}/{}{}",
                                    idx + 1,
                                    total,
                                    tool_args_preview(call)
                                ))
                                .with_meta(json!({
                                    "tool_index": idx + 1,
                                    "tool_total": total,
                                })),
                        );

                        let exec = self.registry.execute(call, &ctx).await;
                        let (result_status, result_message) = match &exec.error {
                            Some(err) => ("error", format!("tool failed: {}", err)),
                            None => (
                                "ok",
                                format!(
                                    "tool executed, output={}",
                                    truncate(&exec.output.output, 220)
                                ),
                            ),
                        };
                        self.events.emit(
                            Event::new(EventType::ToolResult)
                                .with_run(&input.run_id)
                                .with_agent(&input.agent_id)
                                .with_role(input.role)
                                .with_tool(&call.function.name)
                                .with_status(result_status)
                                .with_message(result_message)
                                .with_meta(json!({
                                    "output_preview": truncate(&exec.output.output, 220),
                                })),
                        );

                        if exec.is_finish {
                            finished = true;
                            finish_summary = exec.finish_summary.clone();
                        }
                        outputs.push(exec.output);
                    }

                    let llm_run_id = resp.run_id.clone();
                    resp = self
                        .submit_tool_outputs_with_retry(
                            &input,
                            &session.thread_id,
                            &llm_run_id,
                            outputs,
                        )
                        .await
                        .map_err(|e| format!("submit tool outputs: {}", e))?;

                    if finished {
                        return Ok(TaskResult {
                            summary: finish_summary,
                            raw: resp.content,
                        });
                    }
                }

                STATUS_COMPLETED => {
                    let summary = if finish_summary.is_empty() {
                        resp.content.trim().to_string()
                    } else {
                        finish_summary
                    };
                    return Ok(TaskResult {
                        summary,
                        raw: resp.content,
                    });
                }

                STATUS_FAILED | STATUS_CANCELLED => {
                    return Err(format!(
                        "agent ended with status {}: {}",
                        resp.status, resp.content
                    ));
                }

                _ => {
                    // In-progress with text and no pending tools: the content
                    // is the answer.
                    if !resp.content.is_empty() && resp.tool_calls.is_empty() {
                        return Ok(TaskResult {
                            summary: resp.content.clone(),
                            raw: resp.content,
                        });
                    }
                    tokio::time::sleep(IDLE_POLL_DELAY).await;
                }
            }
        }

        Err(format!(
            "agent exceeded max iterations ({})",
            self.cfg.max_iterations
        ))
    }

    fn end_run(&self, run_id: &str) {
        let prefix = format!("{}::", run_id);
        self.sessions
            .lock()
            .retain(|key, _| !key.starts_with(&prefix));
    }
}

fn session_key(run_id: &str, agent_id: &str) -> String {
    format!("{}::{}", run_id, agent_id)
}

/// Transient upstream failures worth retrying; matched against the
/// lower-cased error text.
fn is_transient(message: &str) -> bool {
    const MARKERS: [&str; 10] = [
        "(429)",
        "(500)",
        "(502)",
        "(503)",
        "(504)",
        "timeout",
        "temporarily",
        "connection reset",
        "broken pipe",
        "eof",
    ];
    let v = message.to_lowercase();
    MARKERS.iter().any(|m| v.contains(m))
}

fn status_message(resp: &MessageResponse) -> String {
    let status = normalize_status(&resp.status);
    if status == STATUS_REQUIRES_ACTION && !resp.tool_calls.is_empty() {
        return format!("requested {} tool call(s)", resp.tool_calls.len());
    }
    if !resp.content.trim().is_empty() {
        return resp.content.clone();
    }
    if !resp.message.is_empty() {
        return resp.message.clone();
    }
    "processing".to_string()
}

fn tool_args_preview(call: &ToolCall) -> String {
    let Ok(args) = call.arguments_map() else {
        return String::new();
    };
    let Ok(encoded) = serde_json::to_string(&args) else {
        return String::new();
    };
    if encoded.is_empty() || encoded == "{}" {
        return String::new();
    }
    format!(" args={}", truncate(&encoded, 180))
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}
