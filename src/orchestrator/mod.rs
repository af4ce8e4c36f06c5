//! Cross-agent lifecycle: spawn, cancel, await, list, and terminal
//! transitions.
//!
//! The orchestrator owns every running subagent. Each spawn starts an engine
//! task plus a supervisor that waits on the engine, an optional deadline, and
//! the agent's cancellation token; whichever fires first drives the single
//! idempotent terminal transition. Handles stay on the roster after
//! termination; mailboxes and todo trackers do not.

pub mod handle;
pub mod mailbox;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::host::ImageBackend;
use crate::dispatch::names::{
    ADD_TODO, COORDINATION_TOOLS, EXTERNAL_WILDCARD, FINAL_REPORT, HOST_TOOLS, SEND_MESSAGE,
    VM_TOOLS,
};
use crate::dispatch::web_search::SearchConfig;
use crate::dispatch::{ExternalToolRegistry, ToolDispatcher};
use crate::engine::{AgentLoopEngine, EngineConfig, RunOutcome, RunStatus};
use crate::event::StatePublisher;
use crate::llm::LlmClient;
use crate::scheduler::ToolCallScheduler;
use crate::todo::TodoRegistry;
use crate::trace::TraceLogger;
use crate::vm::VmConnection;

use handle::{AgentId, AgentStatus, Completion, Domain, SpawnRequest, SubagentHandle};
use mailbox::MailboxRegistry;

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Directory for per-agent JSONL trace files.
    pub trace_dir: PathBuf,
    /// Concurrently running subagents allowed.
    pub max_subagents: usize,
    /// Default wall-clock deadline for spawned subagents. `None` means no
    /// deadline unless the spawn request sets one.
    pub default_timeout_secs: Option<u64>,
    pub shell_timeout_secs: u64,
    /// Whether the model consumes images. When false, image results degrade
    /// to their text description.
    pub supports_vision: bool,
    pub engine: EngineConfig,
    pub search: SearchConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            trace_dir: PathBuf::from("traces"),
            max_subagents: 8,
            default_timeout_secs: None,
            shell_timeout_secs: 120,
            supports_vision: true,
            engine: EngineConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

struct HandleEntry {
    handle: SubagentHandle,
    cancel: CancellationToken,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    supervisor: Option<JoinHandle<()>>,
}

pub struct SubagentOrchestrator {
    vm: Arc<dyn VmConnection>,
    llm: Arc<dyn LlmClient>,
    scheduler: Arc<ToolCallScheduler>,
    todos: Arc<TodoRegistry>,
    mailboxes: Arc<MailboxRegistry>,
    publisher: StatePublisher,
    external: Option<Arc<dyn ExternalToolRegistry>>,
    image_backend: Option<Arc<dyn ImageBackend>>,
    config: OrchestratorConfig,
    root_cancel: CancellationToken,
    entries: Mutex<HashMap<AgentId, HandleEntry>>,
    completions: Mutex<VecDeque<Completion>>,
}

/// The default allowlist plus the reserved names every agent gets.
///
/// Todo authoring stays out of subagent hands (their lists are prescribed at
/// spawn); finalization, messaging, and the external wildcard are unioned in
/// regardless of what was requested.
pub fn normalize_allowlist(requested: Option<Vec<String>>) -> BTreeSet<String> {
    let mut set: BTreeSet<String> = match requested {
        Some(list) => list.into_iter().collect(),
        None => VM_TOOLS
            .iter()
            .chain(HOST_TOOLS)
            .chain(COORDINATION_TOOLS)
            .map(|s| s.to_string())
            .collect(),
    };
    set.remove(ADD_TODO);
    set.insert(FINAL_REPORT.to_string());
    set.insert(SEND_MESSAGE.to_string());
    set.insert(EXTERNAL_WILDCARD.to_string());
    set
}

impl SubagentOrchestrator {
    pub fn new(
        vm: Arc<dyn VmConnection>,
        llm: Arc<dyn LlmClient>,
        config: OrchestratorConfig,
        publisher: StatePublisher,
        external: Option<Arc<dyn ExternalToolRegistry>>,
        image_backend: Option<Arc<dyn ImageBackend>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            vm,
            llm,
            scheduler: Arc::new(ToolCallScheduler::new()),
            todos: Arc::new(TodoRegistry::new()),
            mailboxes: Arc::new(MailboxRegistry::new()),
            publisher,
            external,
            image_backend,
            config,
            root_cancel: CancellationToken::new(),
            entries: Mutex::new(HashMap::new()),
            completions: Mutex::new(VecDeque::new()),
        })
    }

    pub fn scheduler(&self) -> &Arc<ToolCallScheduler> {
        &self.scheduler
    }

    pub fn mailboxes(&self) -> &Arc<MailboxRegistry> {
        &self.mailboxes
    }

    pub fn todos(&self) -> &Arc<TodoRegistry> {
        &self.todos
    }

    fn dispatcher_for(
        self: &Arc<Self>,
        agent_id: &str,
        cancel: CancellationToken,
        allowlist: BTreeSet<String>,
    ) -> ToolDispatcher {
        let mut dispatcher = ToolDispatcher::new(
            agent_id,
            self.vm.clone(),
            self.scheduler.clone(),
            self.todos.clone(),
            self.mailboxes.clone(),
            cancel,
        )
        .with_allowlist(allowlist)
        .with_lifecycle(Arc::downgrade(self))
        .with_search_config(self.config.search.clone())
        .with_vision(self.config.supports_vision)
        .with_shell_timeout(self.config.shell_timeout_secs);
        if let Some(reg) = &self.external {
            dispatcher = dispatcher.with_external(reg.clone());
        }
        if let Some(backend) = &self.image_backend {
            dispatcher = dispatcher.with_image_backend(backend.clone());
        }
        dispatcher
    }

    fn client_for(&self, model_override: Option<&str>) -> Arc<dyn LlmClient> {
        match model_override {
            Some(model) => self.llm.for_model(model),
            None => self.llm.clone(),
        }
    }

    /// Type-erased [`Self::spawn`] for callers inside an engine future.
    ///
    /// `spawn` starts the engine task whose dispatcher in turn calls spawn,
    /// so the unboxed future's `Send` obligation is self-referential and
    /// rustc cannot discharge it. Boxing cuts the cycle.
    pub fn spawn_boxed(
        self: &Arc<Self>,
        req: SpawnRequest,
    ) -> BoxFuture<'static, Result<AgentId, String>> {
        let orch = Arc::clone(self);
        Box::pin(async move { orch.spawn(req).await })
    }

    /// Spawn a subagent and return its id. The caller discovers the outcome
    /// via [`Self::await_result`] or [`Self::drain_completions`].
    pub async fn spawn(self: &Arc<Self>, req: SpawnRequest) -> Result<AgentId, String> {
        let running = self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.handle.status == AgentStatus::Running)
            .count();
        if running >= self.config.max_subagents {
            return Err(format!(
                "subagent limit reached ({} running)",
                self.config.max_subagents
            ));
        }

        let id = Uuid::new_v4().to_string();
        let allowlist = normalize_allowlist(req.tool_allowlist);
        let todo_list = self.todos.register(&id, &req.todo_items);
        self.mailboxes.create(&id);

        let trace = match TraceLogger::new_in_dir(&self.config.trace_dir, &id) {
            Ok(t) => t,
            Err(e) => {
                self.todos.remove(&id);
                self.mailboxes.remove(&id);
                return Err(format!("failed to open trace file: {e}"));
            }
        };

        let cancel = self.root_cancel.child_token();
        let handle = SubagentHandle {
            id: id.clone(),
            goal: req.goal.clone(),
            domain: req.domain,
            tool_allowlist: allowlist.clone(),
            todo_items: todo_list.items().to_vec(),
            status: AgentStatus::Running,
            started_at: now_iso(),
            ended_at: None,
            trace_path: trace.path().to_path_buf(),
            summary: None,
            error_message: None,
            purpose: req.purpose,
        };

        let (done_tx, done_rx) = watch::channel(false);
        self.entries.lock().unwrap().insert(
            id.clone(),
            HandleEntry {
                handle,
                cancel: cancel.clone(),
                done_tx,
                done_rx,
                supervisor: None,
            },
        );

        let engine = AgentLoopEngine::new(
            id.clone(),
            self.client_for(req.model_override.as_deref()),
            Arc::new(self.dispatcher_for(&id, cancel.clone(), allowlist.clone())),
            self.mailboxes.clone(),
            self.todos.clone(),
            self.publisher.clone(),
            trace,
            cancel.clone(),
            self.config.engine.clone(),
        );

        let goal = req.goal;
        let domain = req.domain;
        let mut engine_task =
            tokio::spawn(async move { engine.run(&goal, domain, &allowlist).await });

        let timeout = req
            .timeout_secs
            .or(self.config.default_timeout_secs)
            .map(Duration::from_secs);
        let orch = self.clone();
        let agent_id = id.clone();
        let supervisor = tokio::spawn(async move {
            let deadline = async {
                match timeout {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending().await,
                }
            };
            // Biased so an explicit cancellation is reported as Cancelled
            // even when the engine returns in the same poll.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = engine_task.await;
                    orch.finish(
                        &agent_id,
                        AgentStatus::Cancelled,
                        "The agent was cancelled.".to_string(),
                        Some("cancelled by request".to_string()),
                    );
                }
                _ = deadline => {
                    cancel.cancel();
                    let _ = engine_task.await;
                    let secs = timeout.map(|d| d.as_secs()).unwrap_or(0);
                    orch.finish(
                        &agent_id,
                        AgentStatus::Failed,
                        "The agent hit its deadline.".to_string(),
                        Some(format!("timed out after {secs}s")),
                    );
                }
                joined = &mut engine_task => {
                    match joined {
                        Ok(outcome) => orch.finish_from_outcome(&agent_id, outcome),
                        Err(e) => orch.finish(
                            &agent_id,
                            AgentStatus::Failed,
                            "The agent task ended abnormally.".to_string(),
                            Some(format!("engine task failed: {e}")),
                        ),
                    }
                }
            }
        });

        if let Some(entry) = self.entries.lock().unwrap().get_mut(&id) {
            entry.supervisor = Some(supervisor);
        }

        info!(agent = %id, "spawned subagent");
        Ok(id)
    }

    fn finish_from_outcome(&self, agent_id: &str, outcome: RunOutcome) {
        let status = match outcome.status {
            RunStatus::Success => AgentStatus::Completed,
            RunStatus::Failed => AgentStatus::Failed,
        };
        self.finish(agent_id, status, outcome.summary, outcome.failure_reason);
    }

    /// The single terminal transition. First caller wins; later calls are
    /// no-ops. Destroys the agent's mailbox and todo tracker, keeps its
    /// handle on the roster, and pushes a completion record.
    fn finish(
        &self,
        agent_id: &str,
        status: AgentStatus,
        summary: String,
        failure_reason: Option<String>,
    ) {
        debug_assert!(status.is_terminal());
        let completion = {
            let mut entries = self.entries.lock().unwrap();
            let Some(entry) = entries.get_mut(agent_id) else {
                return;
            };
            if entry.handle.status.is_terminal() {
                return;
            }
            entry.handle.status = status;
            entry.handle.ended_at = Some(now_iso());
            entry.handle.summary = Some(summary.clone());
            entry.handle.error_message = failure_reason.clone();
            let _ = entry.done_tx.send(true);
            Completion {
                agent_id: agent_id.to_string(),
                status,
                summary,
                failure_reason,
                ended_at: entry.handle.ended_at.clone().unwrap_or_default(),
            }
        };

        self.mailboxes.remove(agent_id);
        self.todos.remove(agent_id);
        self.completions.lock().unwrap().push_back(completion);
        self.publisher.finished(agent_id, status.as_str());
        info!(agent = %agent_id, status = status.as_str(), "subagent finished");
    }

    pub fn status(&self, agent_id: &str) -> Option<SubagentHandle> {
        self.entries
            .lock()
            .unwrap()
            .get(agent_id)
            .map(|e| e.handle.clone())
    }

    /// Roster snapshot, spawn order.
    pub fn list(&self) -> Vec<SubagentHandle> {
        let mut handles: Vec<SubagentHandle> = self
            .entries
            .lock()
            .unwrap()
            .values()
            .map(|e| e.handle.clone())
            .collect();
        handles.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        handles
    }

    /// Request cancellation. Idempotent; cancelling a terminal agent is a
    /// no-op. The terminal transition happens in the supervisor, not here.
    pub fn cancel(&self, agent_id: &str) -> Result<(), String> {
        let entries = self.entries.lock().unwrap();
        let entry = entries
            .get(agent_id)
            .ok_or_else(|| format!("no such agent: {agent_id}"))?;
        if !entry.handle.status.is_terminal() {
            entry.cancel.cancel();
        }
        Ok(())
    }

    /// Wait for an agent's terminal transition and return its completion
    /// record. Errors if the agent is unknown or the timeout elapses first.
    pub async fn await_result(
        &self,
        agent_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Completion, String> {
        let mut done_rx = {
            let entries = self.entries.lock().unwrap();
            let entry = entries
                .get(agent_id)
                .ok_or_else(|| format!("no such agent: {agent_id}"))?;
            entry.done_rx.clone()
        };

        let wait = done_rx.wait_for(|done| *done);
        let waited = match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| format!("agent {agent_id} still running after {limit:?}"))?,
            None => wait.await,
        };
        waited.map_err(|_| format!("agent {agent_id} dropped without finishing"))?;

        let entries = self.entries.lock().unwrap();
        let entry = entries
            .get(agent_id)
            .ok_or_else(|| format!("no such agent: {agent_id}"))?;
        Ok(Completion {
            agent_id: agent_id.to_string(),
            status: entry.handle.status,
            summary: entry.handle.summary.clone().unwrap_or_default(),
            failure_reason: entry.handle.error_message.clone(),
            ended_at: entry.handle.ended_at.clone().unwrap_or_default(),
        })
    }

    /// Drain the completion queue. Each record is returned exactly once.
    pub fn drain_completions(&self) -> Vec<Completion> {
        self.completions.lock().unwrap().drain(..).collect()
    }

    /// Run the root agent inline under the `"main"` identity. Subagents it
    /// spawns go through the normal lifecycle.
    pub async fn run_main(
        self: &Arc<Self>,
        goal: &str,
        domain: Domain,
        tool_allowlist: Option<Vec<String>>,
        todo_items: &[String],
    ) -> Result<RunOutcome, String> {
        let mut allowlist = normalize_allowlist(tool_allowlist);
        // The root agent may grow its own list.
        allowlist.insert(ADD_TODO.to_string());
        self.todos.register(mailbox::MAIN_RECIPIENT, todo_items);

        let trace = TraceLogger::new_in_dir(&self.config.trace_dir, mailbox::MAIN_RECIPIENT)
            .map_err(|e| format!("failed to open trace file: {e}"))?;
        let cancel = self.root_cancel.child_token();
        let engine = AgentLoopEngine::new(
            mailbox::MAIN_RECIPIENT,
            self.llm.clone(),
            Arc::new(self.dispatcher_for(
                mailbox::MAIN_RECIPIENT,
                cancel.clone(),
                allowlist.clone(),
            )),
            self.mailboxes.clone(),
            self.todos.clone(),
            self.publisher.clone(),
            trace,
            cancel,
            self.config.engine.clone(),
        );
        Ok(engine.run(goal, domain, &allowlist).await)
    }

    /// Cancel everything and wait briefly for supervisors to settle.
    pub async fn shutdown(&self) {
        self.root_cancel.cancel();
        let supervisors: Vec<JoinHandle<()>> = {
            let mut entries = self.entries.lock().unwrap();
            entries
                .values_mut()
                .filter_map(|e| e.supervisor.take())
                .collect()
        };
        for task in supervisors {
            if tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .is_err()
            {
                warn!("supervisor did not settle within shutdown grace period");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_reserved_names_exactly_once() {
        let set = normalize_allowlist(Some(vec![
            "web_search".to_string(),
            FINAL_REPORT.to_string(),
        ]));
        assert!(set.contains("web_search"));
        assert!(set.contains(FINAL_REPORT));
        assert!(set.contains(SEND_MESSAGE));
        assert!(set.contains(EXTERNAL_WILDCARD));
        assert_eq!(set.iter().filter(|n| *n == FINAL_REPORT).count(), 1);
    }

    #[test]
    fn normalize_strips_todo_authoring() {
        let set = normalize_allowlist(Some(vec![ADD_TODO.to_string()]));
        assert!(!set.contains(ADD_TODO));

        let full = normalize_allowlist(None);
        assert!(!full.contains(ADD_TODO));
        assert!(full.contains("shell_exec"));
        assert!(full.contains("finish_todo_item"));
    }
}
