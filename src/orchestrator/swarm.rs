//! Swarm coordinator: decomposes a user task into role-tagged subtasks,
//! fans them out with bounded parallelism, and refines across rounds until
//! the coordinator agent finalizes. When the model's answer is unusable, a
//! deterministic local summary takes over.

use crate::agent::{TaskInput, TaskResult, TaskRunner};
use crate::config::Config;
use crate::gateway::events::EventBroadcaster;
use crate::types::{Event, EventType, Role, Subtask, SubtaskResult};
use futures_util::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

const MAX_SUBTASKS: usize = 6;
const COORDINATOR_AGENT: &str = "agent-0";

pub struct Swarm {
    runner: Arc<dyn TaskRunner>,
    cfg: Config,
    events: Option<Arc<EventBroadcaster>>,
}

/// Parsed outcome of a DECIDE_NEXT_STEP response.
#[derive(Debug, PartialEq)]
enum Decision {
    Decompose(Vec<Subtask>),
    Finalize(String),
}

#[derive(Debug, Default, Deserialize)]
struct DecisionDoc {
    #[serde(default)]
    action: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    subtasks: Vec<Subtask>,
}

impl Swarm {
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        cfg: Config,
        events: Option<Arc<EventBroadcaster>>,
    ) -> Self {
        Self {
            runner,
            cfg,
            events,
        }
    }

    /// Drive a whole run to a final summary. Sessions for the run are torn
    /// down on every exit path.
    pub async fn run(&self, run_id: &str, task: &str) -> Result<String, String> {
        let result = self.run_inner(run_id, task).await;
        self.runner.end_run(run_id);
        result
    }

    async fn run_inner(&self, run_id: &str, task: &str) -> Result<String, String> {
        self.emit(
            Event::new(EventType::SwarmStarted)
                .with_run(run_id)
                .with_message(task),
        );

        let plan = self
            .coordinator_task(run_id, format!("MODE: DECOMPOSE\n\nUSER_TASK:\n{}", task))
            .await
            .map_err(|e| format!("decompose task: {}", e))?;

        let mut subtasks = parse_subtasks(&first_non_empty(&[
            plan.summary.as_str(),
            plan.raw.as_str(),
        ]));
        if subtasks.is_empty() {
            subtasks = vec![Subtask {
                role: Role::Coder,
                task: task.to_string(),
            }];
        }
        self.emit(
            Event::new(EventType::AgentStatus)
                .with_run(run_id)
                .with_agent(COORDINATOR_AGENT)
                .with_role(Role::Orchestrator)
                .with_status("plan_ready")
                .with_message(format!("decomposed into {} subtask(s)", subtasks.len())),
        );

        let max_rounds = self.cfg.max_orch_rounds.max(1);
        let mut findings: Vec<SubtaskResult> = Vec::new();
        let mut summary = String::new();

        let mut round = 1;
        loop {
            let results = self.run_subtasks(run_id, &subtasks).await;
            findings.extend(results);

            let decision = self
                .coordinator_task(run_id, decide_prompt(task, round, max_rounds, &findings))
                .await
                .map_err(|e| format!("decide next step: {}", e))?;

            match parse_decision(&first_non_empty(&[
                decision.summary.as_str(),
                decision.raw.as_str(),
            ])) {
                Decision::Decompose(next) if round < max_rounds => {
                    self.emit(
                        Event::new(EventType::AgentStatus)
                            .with_run(run_id)
                            .with_agent(COORDINATOR_AGENT)
                            .with_role(Role::Orchestrator)
                            .with_status("refining")
                            .with_message(format!(
                                "round {}: continuing with {} subtask(s)",
                                round + 1,
                                next.len()
                            )),
                    );
                    subtasks = next;
                    round += 1;
                }
                // Out of rounds: the local synthesizer takes over below.
                Decision::Decompose(_) => break,
                Decision::Finalize(text) => {
                    summary = text;
                    break;
                }
            }
        }

        let mut summary = summary.trim().to_string();
        if summary.is_empty() || is_decomposition_summary(&summary) {
            summary = local_fallback_summary(task, &findings);
        }

        self.emit(
            Event::new(EventType::SwarmFinished)
                .with_run(run_id)
                .with_status("completed")
                .with_message(&summary),
        );

        Ok(summary)
    }

    async fn coordinator_task(&self, run_id: &str, task: String) -> Result<TaskResult, String> {
        self.runner
            .run_task(TaskInput {
                run_id: run_id.to_string(),
                agent_id: COORDINATOR_AGENT.to_string(),
                role: Role::Orchestrator,
                task,
            })
            .await
    }

    /// Run one round of subtasks under the subagent concurrency cap.
    /// Results are positionally stable: result `i` belongs to subtask `i`.
    async fn run_subtasks(&self, run_id: &str, subtasks: &[Subtask]) -> Vec<SubtaskResult> {
        let semaphore = Arc::new(Semaphore::new(self.cfg.max_subagents.max(1)));

        let futures = subtasks.iter().enumerate().map(|(i, subtask)| {
            let semaphore = semaphore.clone();
            let runner = self.runner.clone();
            let events = self.events.clone();
            let subtask = subtask.clone();
            let run_id = run_id.to_string();

            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return SubtaskResult {
                            subtask,
                            summary: String::new(),
                            error: "subagent semaphore closed".to_string(),
                        }
                    }
                };

                let agent_id = format!("agent-{}", i + 1);
                match runner
                    .run_task(TaskInput {
                        run_id: run_id.clone(),
                        agent_id: agent_id.clone(),
                        role: subtask.role,
                        task: subtask.task.clone(),
                    })
                    .await
                {
                    Ok(res) => SubtaskResult {
                        subtask,
                        summary: first_non_empty(&[res.summary.as_str(), res.raw.as_str()])
                            .trim()
                            .to_string(),
                        error: String::new(),
                    },
                    Err(err) => {
                        if let Some(events) = &events {
                            events.emit(
                                Event::new(EventType::AgentFinished)
                                    .with_run(&run_id)
                                    .with_agent(&agent_id)
                                    .with_role(subtask.role)
                                    .with_status("failed")
                                    .with_message(&err),
                            );
                        }
                        SubtaskResult {
                            subtask,
                            summary: String::new(),
                            error: err,
                        }
                    }
                }
            }
        });

        join_all(futures).await
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

fn decide_prompt(task: &str, round: usize, max_rounds: usize, findings: &[SubtaskResult]) -> String {
    let mut prompt = String::new();
    prompt.push_str("MODE: DECIDE_NEXT_STEP\n");
    prompt.push_str(&format!("ROUND={}\n", round));
    prompt.push_str(&format!("MAX_ROUNDS={}\n", max_rounds));
    prompt.push_str("\nUSER_TASK:\n");
    prompt.push_str(task);
    prompt.push_str("\n\nFINDINGS:\n");
    for (i, res) in findings.iter().enumerate() {
        prompt.push_str(&format!("{})\n", i + 1));
        if !res.error.is_empty() {
            prompt.push_str("source error: ");
            prompt.push_str(&res.error);
            prompt.push_str("\n\n");
            continue;
        }
        prompt.push_str(res.summary.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str("\nReturn your decision via finish.");
    prompt
}

/// Strip optional ```json fences and surrounding whitespace.
fn strip_fences(raw: &str) -> String {
    let mut clean = raw.trim();
    clean = clean.strip_prefix("```json").unwrap_or(clean);
    clean = clean.strip_prefix("```").unwrap_or(clean);
    clean = clean.strip_suffix("```").unwrap_or(clean);
    clean.trim().to_string()
}

/// Parse a subtask list from either `{"subtasks":[...]}` or a bare array,
/// tolerating fenced-code wrappers.
fn parse_subtasks(raw: &str) -> Vec<Subtask> {
    let clean = strip_fences(raw);
    if clean.is_empty() {
        return Vec::new();
    }

    #[derive(Deserialize)]
    struct Wrapped {
        #[serde(default)]
        subtasks: Vec<Subtask>,
    }

    if let Ok(wrapped) = serde_json::from_str::<Wrapped>(&clean) {
        if !wrapped.subtasks.is_empty() {
            return normalize_subtasks(wrapped.subtasks);
        }
    }

    if let Ok(plain) = serde_json::from_str::<Vec<Subtask>>(&clean) {
        if !plain.is_empty() {
            return normalize_subtasks(plain);
        }
    }

    Vec::new()
}

fn normalize_subtasks(input: Vec<Subtask>) -> Vec<Subtask> {
    let mut out: Vec<Subtask> = input
        .into_iter()
        .filter_map(|subtask| {
            let task = subtask.task.trim().to_string();
            if task.is_empty() {
                return None;
            }
            Some(Subtask {
                role: subtask.role,
                task,
            })
        })
        .collect();
    out.truncate(MAX_SUBTASKS);
    out
}

fn parse_decision(raw: &str) -> Decision {
    let clean = strip_fences(raw);

    if let Ok(doc) = serde_json::from_str::<DecisionDoc>(&clean) {
        match doc.action.trim().to_lowercase().as_str() {
            "decompose" | "refine" | "delegate" => {
                let subtasks = normalize_subtasks(doc.subtasks);
                if !subtasks.is_empty() {
                    return Decision::Decompose(subtasks);
                }
                return Decision::Finalize(doc.summary);
            }
            "finalize" | "finish" | "summary" => return Decision::Finalize(doc.summary),
            _ => {}
        }
    }

    let subtasks = parse_subtasks(raw);
    if !subtasks.is_empty() {
        return Decision::Decompose(subtasks);
    }

    Decision::Finalize(raw.trim().to_string())
}

/// A "summary" that is really another plan must not be shown to the user.
fn is_decomposition_summary(summary: &str) -> bool {
    if !parse_subtasks(summary).is_empty() {
        return true;
    }
    let clean = summary.trim();
    let lower = clean.to_lowercase();
    (clean.starts_with('{') || clean.starts_with("```")) && lower.contains("\"subtasks\"")
}

/// Deterministic synthesis used when the LLM chain produced nothing usable.
fn local_fallback_summary(task: &str, results: &[SubtaskResult]) -> String {
    let mut out = String::new();
    out.push_str("Summary for: ");
    out.push_str(task);
    out.push_str("\n\n");

    let mut ok_count = 0;
    let mut err_count = 0;
    for res in results {
        if !res.error.is_empty() {
            err_count += 1;
            continue;
        }
        let text = res.summary.trim();
        if text.is_empty() {
            continue;
        }
        ok_count += 1;
        out.push_str("- ");
        out.push_str(text);
        out.push('\n');
    }

    if ok_count == 0 {
        out.push_str("No reliable findings were produced.");
    }
    if err_count > 0 {
        out.push_str("\nSome sub-analyses failed and may affect completeness.");
    }
    out.trim().to_string()
}

fn first_non_empty(values: &[&str]) -> String {
    for v in values {
        if !v.trim().is_empty() {
            return v.to_string();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    fn test_cfg() -> Config {
        Config {
            max_subagents: 3,
            max_orch_rounds: 3,
            ..Config::default()
        }
    }

    #[test]
    fn parse_subtasks_accepts_fenced_wrapper() {
        let raw = "```json\n{\"subtasks\":[{\"role\":\"researcher\",\"task\":\"find docs\"},{\"role\":\"coder\",\"task\":\"implement API\"}]}\n```";
        let subtasks = parse_subtasks(raw);
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0].role, Role::Researcher);
    }

    #[test]
    fn parse_subtasks_accepts_bare_array() {
        let raw = "[{\"role\":\"fact_checker\",\"task\":\"verify\"}]";
        let subtasks = parse_subtasks(raw);
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].role, Role::FactChecker);
    }

    #[test]
    fn parse_subtasks_normalizes() {
        let raw = format!(
            "{{\"subtasks\":[{}]}}",
            (0..8)
                .map(|i| format!("{{\"role\":\"mystery\",\"task\":\"t{}\"}}", i))
                .chain(std::iter::once("{\"role\":\"coder\",\"task\":\"  \"}".to_string()))
                .collect::<Vec<_>>()
                .join(",")
        );
        let subtasks = parse_subtasks(&raw);
        assert_eq!(subtasks.len(), 6);
        assert!(subtasks.iter().all(|s| s.role == Role::Coder));
    }

    #[test]
    fn parse_subtasks_rejects_prose() {
        assert!(parse_subtasks("I could not decompose this.").is_empty());
        assert!(parse_subtasks("").is_empty());
    }

    #[test]
    fn decision_parser_table() {
        match parse_decision("{\"action\":\"decompose\",\"subtasks\":[{\"role\":\"coder\",\"task\":\"x\"}]}") {
            Decision::Decompose(tasks) => assert_eq!(tasks.len(), 1),
            other => panic!("expected decompose, got {:?}", other),
        }

        assert_eq!(
            parse_decision("{\"action\":\"finalize\",\"summary\":\"done\"}"),
            Decision::Finalize("done".to_string())
        );

        // Malformed decision that still parses as a subtask list.
        match parse_decision("{\"subtasks\":[{\"role\":\"researcher\",\"task\":\"dig\"}]}") {
            Decision::Decompose(tasks) => assert_eq!(tasks[0].role, Role::Researcher),
            other => panic!("expected decompose, got {:?}", other),
        }

        assert_eq!(
            parse_decision("just prose"),
            Decision::Finalize("just prose".to_string())
        );
    }

    #[test]
    fn decomposition_summary_detection() {
        assert!(is_decomposition_summary(
            "{\"subtasks\":[{\"role\":\"coder\",\"task\":\"x\"}]}"
        ));
        assert!(is_decomposition_summary("{\"subtasks\": \"oops\"}"));
        assert!(!is_decomposition_summary("A clean final answer."));
    }

    #[test]
    fn fallback_summary_shapes() {
        let task = "What happened?";
        let ok = SubtaskResult {
            subtask: Subtask {
                role: Role::Researcher,
                task: "a".to_string(),
            },
            summary: "found something".to_string(),
            error: String::new(),
        };
        let failed = SubtaskResult {
            subtask: Subtask {
                role: Role::Coder,
                task: "b".to_string(),
            },
            summary: String::new(),
            error: "boom".to_string(),
        };

        let out = local_fallback_summary(task, &[ok.clone(), failed.clone()]);
        assert!(out.starts_with("Summary for: What happened?"));
        assert!(out.contains("- found something"));
        assert!(out.contains("may affect completeness"));

        let out = local_fallback_summary(task, &[failed]);
        assert!(out.contains("No reliable findings were produced."));
    }

    struct SleepyRunner {
        sleep: Duration,
    }

    #[async_trait]
    impl TaskRunner for SleepyRunner {
        async fn run_task(&self, input: TaskInput) -> Result<TaskResult, String> {
            tokio::time::sleep(self.sleep).await;
            Ok(TaskResult {
                summary: format!("done-{}", input.task),
                raw: String::new(),
            })
        }

        fn end_run(&self, _run_id: &str) {}
    }

    #[tokio::test]
    async fn subtasks_run_in_parallel() {
        let swarm = Swarm::new(
            Arc::new(SleepyRunner {
                sleep: Duration::from_millis(150),
            }),
            test_cfg(),
            None,
        );

        let tasks = vec![
            Subtask {
                role: Role::Researcher,
                task: "a".to_string(),
            },
            Subtask {
                role: Role::FactChecker,
                task: "b".to_string(),
            },
            Subtask {
                role: Role::Coder,
                task: "c".to_string(),
            },
        ];

        let start = Instant::now();
        let results = swarm.run_subtasks("run-1", &tasks).await;
        let elapsed = start.elapsed();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].summary, "done-a");
        assert_eq!(results[2].summary, "done-c");
        assert!(
            elapsed <= Duration::from_millis(320),
            "expected parallel execution, elapsed={:?}",
            elapsed
        );
    }

    /// Plays the coordinator conversation for a dating-rumor style task:
    /// decompose to a researcher, refine with a fact-checker, finalize.
    struct ScriptedRunner {
        decision_calls: Mutex<usize>,
    }

    #[async_trait]
    impl TaskRunner for ScriptedRunner {
        async fn run_task(&self, input: TaskInput) -> Result<TaskResult, String> {
            if input.task.contains("MODE: DECOMPOSE") {
                return Ok(TaskResult {
                    summary: "{\"subtasks\":[{\"role\":\"researcher\",\"task\":\"Find currently reported dating claims\"}]}".to_string(),
                    raw: String::new(),
                });
            }

            if input.agent_id != COORDINATOR_AGENT {
                let summary = match input.role {
                    Role::Researcher => {
                        "Unverified rumors exist, but coverage is inconclusive."
                    }
                    Role::FactChecker => {
                        "Cross-checks indicate there is no publicly confirmed new relationship."
                    }
                    _ => "No additional findings.",
                };
                return Ok(TaskResult {
                    summary: summary.to_string(),
                    raw: String::new(),
                });
            }

            if input.task.contains("MODE: DECIDE_NEXT_STEP") {
                *self.decision_calls.lock() += 1;
                if input.task.contains("ROUND=1") {
                    return Ok(TaskResult {
                        summary: "{\"action\":\"decompose\",\"subtasks\":[{\"role\":\"fact_checker\",\"task\":\"Verify whether reputable sources confirm a partner\"}]}".to_string(),
                        raw: String::new(),
                    });
                }
                return Ok(TaskResult {
                    summary: "{\"action\":\"finalize\",\"summary\":\"Current reporting does not provide a publicly confirmed new relationship; most claims appear speculative.\"}".to_string(),
                    raw: String::new(),
                });
            }

            Ok(TaskResult {
                summary: "ok".to_string(),
                raw: String::new(),
            })
        }

        fn end_run(&self, _run_id: &str) {}
    }

    #[tokio::test]
    async fn decompose_then_refine_then_finalize() {
        let runner = Arc::new(ScriptedRunner {
            decision_calls: Mutex::new(0),
        });
        let swarm = Swarm::new(runner.clone(), test_cfg(), None);

        let summary = swarm
            .run("run-1", "Who is Justin Trudeau dating?")
            .await
            .unwrap();

        assert!(!summary.to_lowercase().contains("\"subtasks\""));
        assert!(summary.to_lowercase().contains("publicly confirmed"));
        assert_eq!(*runner.decision_calls.lock(), 2);
    }

    /// A finalize whose summary is itself a plan must trigger the local
    /// fallback synthesis.
    struct PlanLeakRunner;

    #[async_trait]
    impl TaskRunner for PlanLeakRunner {
        async fn run_task(&self, input: TaskInput) -> Result<TaskResult, String> {
            if input.task.contains("MODE: DECOMPOSE") {
                return Ok(TaskResult {
                    summary: "{\"subtasks\":[{\"role\":\"researcher\",\"task\":\"look around\"}]}"
                        .to_string(),
                    raw: String::new(),
                });
            }
            if input.task.contains("MODE: DECIDE_NEXT_STEP") {
                return Ok(TaskResult {
                    summary: "{\"action\":\"finalize\",\"summary\":\"{\\\"subtasks\\\":[{\\\"role\\\":\\\"coder\\\",\\\"task\\\":\\\"more\\\"}]}\"}".to_string(),
                    raw: String::new(),
                });
            }
            Ok(TaskResult {
                summary: "useful finding".to_string(),
                raw: String::new(),
            })
        }

        fn end_run(&self, _run_id: &str) {}
    }

    #[tokio::test]
    async fn plan_shaped_summary_falls_back_to_local_synthesis() {
        let swarm = Swarm::new(Arc::new(PlanLeakRunner), test_cfg(), None);
        let summary = swarm.run("run-1", "anything").await.unwrap();

        assert!(summary.starts_with("Summary for: anything"));
        assert!(summary.contains("- useful finding"));
    }

    /// Empty decomposition falls back to one coder subtask equal to the
    /// user task.
    struct EmptyPlanRunner {
        saw_coder_task: Mutex<Option<String>>,
    }

    #[async_trait]
    impl TaskRunner for EmptyPlanRunner {
        async fn run_task(&self, input: TaskInput) -> Result<TaskResult, String> {
            if input.task.contains("MODE: DECOMPOSE") {
                return Ok(TaskResult {
                    summary: "no plan, sorry".to_string(),
                    raw: String::new(),
                });
            }
            if input.task.contains("MODE: DECIDE_NEXT_STEP") {
                return Ok(TaskResult {
                    summary: "{\"action\":\"finalize\",\"summary\":\"wrapped up\"}".to_string(),
                    raw: String::new(),
                });
            }
            if input.role == Role::Coder {
                *self.saw_coder_task.lock() = Some(input.task.clone());
            }
            Ok(TaskResult {
                summary: "did the thing".to_string(),
                raw: String::new(),
            })
        }

        fn end_run(&self, _run_id: &str) {}
    }

    #[tokio::test]
    async fn empty_decomposition_falls_back_to_single_coder_task() {
        let runner = Arc::new(EmptyPlanRunner {
            saw_coder_task: Mutex::new(None),
        });
        let swarm = Swarm::new(runner.clone(), test_cfg(), None);

        let summary = swarm.run("run-1", "fix the login bug").await.unwrap();
        assert_eq!(summary, "wrapped up");
        assert_eq!(
            runner.saw_coder_task.lock().as_deref(),
            Some("fix the login bug")
        );
    }

    #[tokio::test]
    async fn swarm_emits_exactly_one_start_and_finish() {
        let hub = Arc::new(EventBroadcaster::new());
        let (_id, mut rx) = hub.subscribe();
        let runner = Arc::new(ScriptedRunner {
            decision_calls: Mutex::new(0),
        });
        let swarm = Swarm::new(runner, test_cfg(), Some(hub));

        swarm.run("run-9", "Who is Justin Trudeau dating?").await.unwrap();

        let mut started = 0;
        let mut finished = 0;
        while let Ok(frame) = rx.try_recv() {
            let event: Event = serde_json::from_str(&frame).unwrap();
            match event.event_type {
                EventType::SwarmStarted => started += 1,
                EventType::SwarmFinished => finished += 1,
                _ => {}
            }
            if event.event_type == EventType::SwarmStarted {
                assert_eq!(event.run_id.as_deref(), Some("run-9"));
            }
        }
        assert_eq!(started, 1);
        assert_eq!(finished, 1);
    }
}
