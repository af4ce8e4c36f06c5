//! The per-agent conversation loop.
//!
//! [`AgentLoopEngine::run`] drives one subagent from goal to final report:
//! drain the mailbox, think (with transport retries), act on tool calls,
//! nudge when the model stalls, and force finalization when persuasion runs
//! out. The loop terminates only through an accepted final report, a
//! synthesized one, a consecutive-failure cap, or cancellation. It never
//! panics out and never returns without a [`RunOutcome`].

pub mod report;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatch::names::FINAL_REPORT;
use crate::dispatch::ToolDispatcher;
use crate::error::DispatchError;
use crate::event::{ProgressKind, StatePublisher};
use crate::llm::{ChatMessage, LlmClient, LlmReply, ToolSpec};
use crate::orchestrator::handle::Domain;
use crate::orchestrator::mailbox::{MailboxRegistry, Message};
use crate::todo::{TodoItem, TodoRegistry};
use crate::trace::TraceLogger;

use report::{
    audit_todos, correction_message, suggested_payload, FinalReportPayload, ReportedStatus,
};

/// Loop limits. Defaults match the production tuning; tests shrink them.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Hard iteration cap before forced finalization.
    pub max_iterations: u32,
    /// Text-only replies tolerated before escalating to report nudges.
    pub max_continue_nudges: u32,
    /// Report nudges before forced finalization.
    pub max_report_nudges: u32,
    /// Final reports rejected for todo discrepancies before accepting anyway.
    pub max_incomplete_todo_retries: u32,
    /// Consecutive LLM transport failures before giving up.
    pub max_llm_failures: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_continue_nudges: 3,
            max_report_nudges: 2,
            max_incomplete_todo_retries: 3,
            max_llm_failures: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Terminal result of one agent loop.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// The accepted (or synthesized) report text.
    pub summary: String,
    pub failure_reason: Option<String>,
}

impl RunOutcome {
    fn failed(summary: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            summary: summary.into(),
            failure_reason: Some(reason.into()),
        }
    }
}

/// What to do with an intercepted finalization call.
enum ReportAction {
    Terminate(RunOutcome),
    /// Rejected: the corrective text becomes the call's tool response.
    Continue(String),
}

pub struct AgentLoopEngine {
    agent_id: String,
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<ToolDispatcher>,
    mailboxes: Arc<MailboxRegistry>,
    todos: Arc<TodoRegistry>,
    publisher: StatePublisher,
    trace: TraceLogger,
    cancel: CancellationToken,
    cfg: EngineConfig,
    /// Rejected final reports so far (todo discrepancies only).
    todo_rejections: u32,
    /// Last non-empty assistant text, used for synthesized reports.
    best_text: Option<String>,
}

impl AgentLoopEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        dispatcher: Arc<ToolDispatcher>,
        mailboxes: Arc<MailboxRegistry>,
        todos: Arc<TodoRegistry>,
        publisher: StatePublisher,
        trace: TraceLogger,
        cancel: CancellationToken,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            llm,
            dispatcher,
            mailboxes,
            todos,
            publisher,
            trace,
            cancel,
            cfg,
            todo_rejections: 0,
            best_text: None,
        }
    }

    /// Run the loop to completion.
    pub async fn run(
        mut self,
        goal: &str,
        domain: Domain,
        allowlist: &BTreeSet<String>,
    ) -> RunOutcome {
        let prescribed = self.todos.snapshot(&self.agent_id).unwrap_or_default();
        let tools = self.dispatcher.available_specs(allowlist);
        let mut conversation = vec![
            ChatMessage::system(system_prompt(goal, domain, &prescribed)),
            ChatMessage::user("Begin working toward your goal now."),
        ];

        self.trace.lifecycle("started", goal);
        self.publisher.started(&self.agent_id, goal);

        let mut continue_nudges = 0u32;
        let mut report_nudges = 0u32;
        let mut llm_failures = 0u32;

        for iteration in 1..=self.cfg.max_iterations {
            if self.cancel.is_cancelled() {
                self.trace.lifecycle("cancelled", "token fired");
                return RunOutcome::failed("The agent was cancelled.", "cancelled");
            }

            let inbox = self.mailboxes.drain(&self.agent_id);
            if !inbox.is_empty() {
                let rendered = render_inbox(&inbox);
                self.trace.system_message(&rendered);
                conversation.push(ChatMessage::user(rendered));
            }

            let reply = loop {
                self.trace.llm_request(
                    iteration,
                    self.llm.model_id(),
                    conversation.len(),
                    tools.len(),
                );
                // Race the transport against cancellation so a hung request
                // cannot wedge the supervisor.
                let thought = tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    thought = self.think(&conversation, &tools) => Some(thought),
                };
                let Some(thought) = thought else {
                    self.trace.lifecycle("cancelled", "token fired mid-request");
                    return RunOutcome::failed("The agent was cancelled.", "cancelled");
                };
                match thought {
                    Ok(reply) => {
                        llm_failures = 0;
                        break reply;
                    }
                    Err(message) => {
                        llm_failures += 1;
                        self.trace.error(&message);
                        self.publisher
                            .progress(&self.agent_id, ProgressKind::Error, message.as_str());
                        if llm_failures >= self.cfg.max_llm_failures {
                            self.trace.lifecycle("finished", "llm failure cap reached");
                            return RunOutcome::failed(
                                "The model became unreachable.",
                                format!(
                                    "{} consecutive LLM failures; last: {message}",
                                    llm_failures
                                ),
                            );
                        }
                        // Exponential backoff: 1s, 2s, 4s, ...
                        let delay = Duration::from_secs(1u64 << (llm_failures - 1));
                        warn!(
                            agent = %self.agent_id,
                            failures = llm_failures,
                            "LLM call failed, retrying in {delay:?}"
                        );
                        let cancelled = tokio::select! {
                            _ = self.cancel.cancelled() => true,
                            _ = tokio::time::sleep(delay) => false,
                        };
                        if cancelled {
                            self.trace.lifecycle("cancelled", "token fired during backoff");
                            return RunOutcome::failed("The agent was cancelled.", "cancelled");
                        }
                    }
                }
            };

            self.trace
                .llm_response(iteration, reply.text.as_deref(), reply.tool_calls.len());
            if let Some(text) = reply.text.as_deref().filter(|t| !t.trim().is_empty()) {
                self.publisher
                    .progress(&self.agent_id, ProgressKind::Response, text);
                self.best_text = Some(text.to_string());
            }
            conversation.push(ChatMessage::Assistant {
                text: reply.text.clone(),
                tool_calls: reply.tool_calls.clone(),
            });

            if reply.tool_calls.is_empty() {
                let (nudge, ladder_spent) = if continue_nudges < self.cfg.max_continue_nudges {
                    continue_nudges += 1;
                    (
                        "You replied without calling any tool. Keep working by calling \
                         tools, or finish by calling submit_final_report."
                            .to_string(),
                        false,
                    )
                } else if report_nudges < self.cfg.max_report_nudges {
                    report_nudges += 1;
                    (
                        "You have stopped making progress. Call submit_final_report now \
                         with your status, todo accounting, and report."
                            .to_string(),
                        report_nudges >= self.cfg.max_report_nudges,
                    )
                } else {
                    return self.force_finalize(conversation, &tools).await;
                };
                self.trace.system_message(&nudge);
                self.publisher
                    .progress(&self.agent_id, ProgressKind::Nudge, nudge.as_str());
                conversation.push(ChatMessage::user(nudge));
                // The last report nudge ends persuasion; forced finalization
                // starts now rather than waiting out another stall.
                if ladder_spent {
                    return self.force_finalize(conversation, &tools).await;
                }
                continue;
            }

            continue_nudges = 0;
            report_nudges = 0;

            for call in &reply.tool_calls {
                if call.name == FINAL_REPORT {
                    self.trace
                        .tool_call(iteration, &call.id, &call.name, &call.arguments);
                    match self.handle_report(&call.arguments) {
                        ReportAction::Terminate(outcome) => {
                            self.trace
                                .lifecycle("finished", outcome.status.as_str());
                            return outcome;
                        }
                        ReportAction::Continue(correction) => {
                            self.trace
                                .tool_result(iteration, &call.id, &call.name, &correction, true);
                            self.publisher.progress(
                                &self.agent_id,
                                ProgressKind::Nudge,
                                correction.as_str(),
                            );
                            conversation
                                .push(ChatMessage::tool_response(&call.id, correction));
                        }
                    }
                    continue;
                }

                self.trace
                    .tool_call(iteration, &call.id, &call.name, &call.arguments);
                self.publisher.action(&self.agent_id, call.name.as_str());
                self.publisher.progress(
                    &self.agent_id,
                    ProgressKind::ToolCall,
                    format!("{}({})", call.name, call.arguments),
                );

                let result = match self.dispatcher.dispatch(call).await {
                    Ok(result) => result,
                    // An unknown name is recoverable from the loop's point of
                    // view: tell the model and keep going.
                    Err(DispatchError::UnknownTool(name)) => {
                        crate::llm::ToolResult::error(format!("Unknown tool: {name}"))
                    }
                };

                let rendered = result.render_for_chat();
                self.trace.tool_result(
                    iteration,
                    &call.id,
                    &call.name,
                    &result.preview(2000),
                    result.is_error(),
                );
                self.publisher.progress(
                    &self.agent_id,
                    ProgressKind::ToolResult,
                    result.preview(200),
                );
                conversation.push(ChatMessage::tool_response(&call.id, rendered));
            }
        }

        debug!(agent = %self.agent_id, "iteration cap reached");
        self.force_finalize(conversation, &tools).await
    }

    async fn think(
        &self,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, String> {
        let publisher = self.publisher.clone();
        let agent_id = self.agent_id.clone();
        let on_content =
            move |chunk: &str| publisher.progress(&agent_id, ProgressKind::Thinking, chunk);
        self.llm
            .chat_stream(conversation, tools, &on_content)
            .await
            .map_err(|e| e.to_string())
    }

    /// Validate an intercepted finalization payload.
    fn handle_report(&mut self, arguments: &serde_json::Value) -> ReportAction {
        let payload = match FinalReportPayload::decode(arguments) {
            Ok(p) => p,
            Err(e) => {
                return ReportAction::Continue(format!(
                    "Error: {e}. Call submit_final_report again with a valid payload."
                ))
            }
        };

        let prescribed = self.todos.snapshot(&self.agent_id).unwrap_or_default();
        // An empty tracker at submission time is unrecoverable for a
        // subagent; the root agent avoids it by authoring items first.
        if prescribed.is_empty() {
            return ReportAction::Terminate(RunOutcome::failed(
                payload.report,
                "no todo list provided",
            ));
        }
        let audit = audit_todos(&prescribed, &payload);

        if !audit.is_clean() {
            self.todo_rejections += 1;
            if self.todo_rejections <= self.cfg.max_incomplete_todo_retries {
                return ReportAction::Continue(correction_message(&prescribed, &audit));
            }
            // Accept the report to avoid livelock, but the run is a failure
            // and the reason names the contested items.
            let indices = audit
                .problem_indices()
                .iter()
                .map(|i| format!("#{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            return ReportAction::Terminate(RunOutcome::failed(
                payload.report,
                format!("final report accepted after repeated todo discrepancies on {indices}"),
            ));
        }

        match payload.status() {
            ReportedStatus::Success => ReportAction::Terminate(RunOutcome {
                status: RunStatus::Success,
                summary: payload.report,
                failure_reason: None,
            }),
            ReportedStatus::Failed => {
                let reason = payload
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "reported failed without a reason".to_string());
                ReportAction::Terminate(RunOutcome::failed(payload.report, reason))
            }
        }
    }

    /// Escalating finalize-only attempts, then a synthesized report.
    async fn force_finalize(
        mut self,
        mut conversation: Vec<ChatMessage>,
        tools: &[ToolSpec],
    ) -> RunOutcome {
        let prescribed = self.todos.snapshot(&self.agent_id).unwrap_or_default();
        let finalize_only: Vec<ToolSpec> = tools
            .iter()
            .filter(|t| t.name == FINAL_REPORT)
            .cloned()
            .collect();

        for attempt in 1u32..=3 {
            if self.cancel.is_cancelled() {
                self.trace.lifecycle("cancelled", "token fired");
                return RunOutcome::failed("The agent was cancelled.", "cancelled");
            }

            let prompt = match attempt {
                1 => "Your session is ending. The only tool still available is \
                      submit_final_report. Call it now."
                    .to_string(),
                2 => "This is your second-to-last chance. Call submit_final_report \
                      with your status, todo accounting, and report. Nothing else \
                      will be accepted."
                    .to_string(),
                _ => format!(
                    "Final attempt. Call submit_final_report with exactly this \
                     payload:\n{}",
                    suggested_payload(&prescribed, self.best_text.as_deref())
                ),
            };
            self.trace.system_message(&prompt);
            conversation.push(ChatMessage::user(prompt));

            self.trace.llm_request(
                self.cfg.max_iterations + attempt,
                self.llm.model_id(),
                conversation.len(),
                finalize_only.len(),
            );
            let thought = tokio::select! {
                _ = self.cancel.cancelled() => None,
                thought = self.think(&conversation, &finalize_only) => Some(thought),
            };
            let Some(thought) = thought else {
                self.trace.lifecycle("cancelled", "token fired mid-request");
                return RunOutcome::failed("The agent was cancelled.", "cancelled");
            };
            let reply = match thought {
                Ok(reply) => reply,
                Err(message) => {
                    self.trace.error(&message);
                    continue;
                }
            };
            self.trace.llm_response(
                self.cfg.max_iterations + attempt,
                reply.text.as_deref(),
                reply.tool_calls.len(),
            );
            if let Some(text) = reply.text.as_deref().filter(|t| !t.trim().is_empty()) {
                self.best_text = Some(text.to_string());
            }
            conversation.push(ChatMessage::Assistant {
                text: reply.text.clone(),
                tool_calls: reply.tool_calls.clone(),
            });

            let Some(call) = reply.tool_calls.iter().find(|c| c.name == FINAL_REPORT) else {
                continue;
            };

            let payload = match FinalReportPayload::decode(&call.arguments) {
                Ok(p) => p,
                Err(e) => {
                    self.trace.error(&e);
                    conversation.push(ChatMessage::tool_response(&call.id, format!("Error: {e}")));
                    continue;
                }
            };

            // Forced mode accepts discrepancies; they just force the failed
            // status and get named in the reason.
            let audit = audit_todos(&prescribed, &payload);
            let outcome = if prescribed.is_empty() {
                RunOutcome::failed(payload.report, "no todo list provided")
            } else if audit.is_clean() {
                match payload.status() {
                    ReportedStatus::Success => RunOutcome {
                        status: RunStatus::Success,
                        summary: payload.report,
                        failure_reason: None,
                    },
                    ReportedStatus::Failed => {
                        let reason = payload
                            .failure_reason
                            .clone()
                            .unwrap_or_else(|| "reported failed without a reason".to_string());
                        RunOutcome::failed(payload.report, reason)
                    }
                }
            } else {
                let indices = audit
                    .problem_indices()
                    .iter()
                    .map(|i| format!("#{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                RunOutcome::failed(
                    payload.report,
                    format!("forced final report left todo items {indices} unresolved"),
                )
            };
            self.trace.lifecycle("finished", outcome.status.as_str());
            return outcome;
        }

        let summary = self
            .best_text
            .clone()
            .unwrap_or_else(|| "Work ended without a final report.".to_string());
        self.trace
            .lifecycle("finished", "synthesized failure report");
        RunOutcome::failed(summary, "the agent ended without submitting a report")
    }
}

fn system_prompt(goal: &str, domain: Domain, todos: &[TodoItem]) -> String {
    let todo_lines = if todos.is_empty() {
        "  (none yet)".to_string()
    } else {
        todos
            .iter()
            .map(|item| format!("  {}. {}", item.index, item.text))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let surface = match domain {
        Domain::Host => "You work on the host: web search, web fetch, and other host tools.",
        Domain::Vm => {
            "You work inside a shared VM. VM tool calls are serialized with other \
             agents; expect occasional queueing."
        }
        Domain::Mixed => {
            "You may use both host tools and the shared VM. VM tool calls are \
             serialized with other agents; expect occasional queueing."
        }
    };
    format!(
        "You are an autonomous agent working toward a goal.\n\
         \n\
         Goal: {goal}\n\
         \n\
         {surface}\n\
         \n\
         Your todo list (fixed indices; mark items with finish_todo_item as you \
         complete them):\n\
         {todo_lines}\n\
         \n\
         Other agents can message you; new messages are delivered between \
         iterations. Use send_message to reply (to=\"main\" reaches your \
         parent).\n\
         \n\
         When your work is done, or cannot be completed, call \
         submit_final_report exactly once with your status, an entry for every \
         todo item above, and a concrete report of what you found or did."
    )
}

fn render_inbox(messages: &[Message]) -> String {
    let mut lines = vec![format!("You have {} new message(s):", messages.len())];
    for m in messages {
        lines.push(format!("[from {}] {}: {}", m.from, m.subject, m.body));
    }
    lines.join("\n")
}
