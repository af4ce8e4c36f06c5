//! Tool dispatch: name-based routing of model tool calls onto backends.
//!
//! Four classes of tool exist. VM-bound tools serialize through the
//! [`ToolCallScheduler`] because the guest tolerates no concurrency.
//! Host-bound tools run directly. Coordination tools mutate shared todo,
//! mailbox, and lifecycle state. External tools pass through to a pluggable
//! registry.
//!
//! Error philosophy: the only hard error out of [`ToolDispatcher::dispatch`]
//! is an unknown tool name. Everything else (bad arguments, backend failure,
//! cancelled-in-queue) comes back as an inline `Error: ...` result so the
//! model can observe the failure and adjust.

pub mod args;
pub mod host;
pub mod names;
pub mod specs;
pub mod web_fetch;
pub mod web_search;

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, ScheduleError, VmError};
use crate::llm::{ToolCall, ToolResult, ToolSpec};
use crate::orchestrator::handle::SpawnRequest;
use crate::orchestrator::mailbox::MailboxRegistry;
use crate::orchestrator::SubagentOrchestrator;
use crate::scheduler::ToolCallScheduler;
use crate::todo::TodoRegistry;
use crate::vm::{FileContent, MouseButton, VmConnection};

use host::ImageBackend;
use names::*;
use web_search::SearchConfig;

/// Pluggable pass-through registry for tools the core does not implement.
#[async_trait]
pub trait ExternalToolRegistry: Send + Sync {
    /// Schemas of every tool the registry exposes.
    fn specs(&self) -> Vec<ToolSpec>;

    fn contains(&self, name: &str) -> bool;

    /// Invoke a registered tool. Failures are recoverable and become inline
    /// error results.
    async fn call(&self, name: &str, arguments: &serde_json::Value) -> Result<ToolResult, String>;
}

/// Per-agent tool dispatcher.
///
/// Each subagent gets its own dispatcher carrying its identity and
/// cancellation token; the backends behind it (VM, scheduler, registries,
/// orchestrator) are shared across all agents.
pub struct ToolDispatcher {
    agent_id: String,
    vm: Arc<dyn VmConnection>,
    scheduler: Arc<ToolCallScheduler>,
    todos: Arc<TodoRegistry>,
    mailboxes: Arc<MailboxRegistry>,
    /// Weak back-reference: the orchestrator owns the agents that own this
    /// dispatcher. Absent or dead during shutdown, in which case lifecycle
    /// tools report an error result instead of acting.
    lifecycle: Option<Weak<SubagentOrchestrator>>,
    search: SearchConfig,
    image_backend: Option<Arc<dyn ImageBackend>>,
    external: Option<Arc<dyn ExternalToolRegistry>>,
    /// When set, builtin and external calls outside the list are refused
    /// with an inline error. Unset means no enforcement (bare construction).
    allowlist: Option<BTreeSet<String>>,
    supports_vision: bool,
    shell_timeout_secs: u64,
    cancel: CancellationToken,
}

impl ToolDispatcher {
    pub fn new(
        agent_id: impl Into<String>,
        vm: Arc<dyn VmConnection>,
        scheduler: Arc<ToolCallScheduler>,
        todos: Arc<TodoRegistry>,
        mailboxes: Arc<MailboxRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            vm,
            scheduler,
            todos,
            mailboxes,
            lifecycle: None,
            search: SearchConfig::default(),
            image_backend: None,
            external: None,
            allowlist: None,
            supports_vision: true,
            shell_timeout_secs: 120,
            cancel,
        }
    }

    pub fn with_lifecycle(mut self, orchestrator: Weak<SubagentOrchestrator>) -> Self {
        self.lifecycle = Some(orchestrator);
        self
    }

    pub fn with_search_config(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_image_backend(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.image_backend = Some(backend);
        self
    }

    pub fn with_external(mut self, registry: Arc<dyn ExternalToolRegistry>) -> Self {
        self.external = Some(registry);
        self
    }

    pub fn with_allowlist(mut self, allowlist: BTreeSet<String>) -> Self {
        self.allowlist = Some(allowlist);
        self
    }

    pub fn with_vision(mut self, supports_vision: bool) -> Self {
        self.supports_vision = supports_vision;
        self
    }

    pub fn with_shell_timeout(mut self, secs: u64) -> Self {
        self.shell_timeout_secs = secs;
        self
    }

    /// The tool schemas offered to this agent's model: allowlisted builtins,
    /// admitted external tools, and always the finalization tool.
    pub fn available_specs(&self, allowlist: &BTreeSet<String>) -> Vec<ToolSpec> {
        let mut available: Vec<ToolSpec> = specs::builtin_specs()
            .into_iter()
            .filter(|s| allowlist.contains(&s.name))
            .collect();
        if let Some(reg) = &self.external {
            let wildcard = allowlist.contains(EXTERNAL_WILDCARD);
            for spec in reg.specs() {
                if wildcard || allowlist.contains(&spec.name) {
                    available.push(spec);
                }
            }
        }
        available.push(specs::final_report_spec());
        available
    }

    /// Route one tool call to its backend and return the result.
    ///
    /// Errors only for a name no class claims; every recoverable failure is
    /// an inline error result.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<ToolResult, DispatchError> {
        let external_claims = self
            .external
            .as_ref()
            .is_some_and(|reg| reg.contains(&call.name));

        // Offering specs is filtered by the allowlist too, but the model is
        // free to name any tool; enforce here as well.
        if let Some(allowed) = &self.allowlist {
            let permitted = allowed.contains(&call.name)
                || (external_claims && allowed.contains(EXTERNAL_WILDCARD));
            if !permitted && (is_builtin(&call.name) || external_claims) {
                return Ok(ToolResult::error(format!(
                    "tool '{}' is not in this agent's allowlist",
                    call.name
                )));
            }
        }

        let result = if is_vm_tool(&call.name) {
            match self.scheduler.run(&self.cancel, self.exec_vm(call)).await {
                Ok(result) => result,
                Err(ScheduleError::Cancelled) => {
                    ToolResult::error(format!("{}: cancelled before execution", call.name))
                }
            }
        } else if is_host_tool(&call.name) {
            self.exec_host(call).await
        } else if is_coordination_tool(&call.name) {
            self.exec_coordination(call).await
        } else if let Some(reg) = self
            .external
            .as_ref()
            .filter(|reg| reg.contains(&call.name))
        {
            reg.call(&call.name, &call.arguments)
                .await
                .unwrap_or_else(ToolResult::error)
        } else {
            return Err(DispatchError::UnknownTool(call.name.clone()));
        };

        Ok(self.degrade_for_vision(result))
    }

    /// Replace image payloads with their description when the model cannot
    /// consume images.
    fn degrade_for_vision(&self, result: ToolResult) -> ToolResult {
        match result {
            ToolResult::Image { description, .. } if !self.supports_vision => {
                ToolResult::Text(description)
            }
            other => other,
        }
    }

    // -- VM-bound ----------------------------------------------------------

    async fn exec_vm(&self, call: &ToolCall) -> ToolResult {
        match call.name.as_str() {
            SCREENSHOT => match self.vm.screenshot().await {
                Ok(shot) => ToolResult::Image {
                    description: format!("screenshot, {}x{}", shot.width, shot.height),
                    base64: shot.base64_png,
                    mime_type: "image/png".to_string(),
                },
                Err(e) => ToolResult::error(e),
            },
            SHELL_EXEC => {
                let a: args::ShellExecArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                let timeout = a.timeout_secs.unwrap_or(self.shell_timeout_secs);
                match self.vm.shell_exec(&a.command, timeout).await {
                    Ok(output) => match serde_json::to_string(&output) {
                        Ok(rendered) => ToolResult::Text(rendered),
                        Err(e) => ToolResult::error(e),
                    },
                    Err(e) => ToolResult::error(e),
                }
            }
            FILE_READ => {
                let a: args::FileReadArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                match self.vm.read_file(&a.path).await {
                    Ok(FileContent::Text(text)) => ToolResult::Text(text),
                    Ok(FileContent::Image {
                        base64,
                        mime_type,
                        dimensions,
                    }) => {
                        let description = match dimensions {
                            Some((w, h)) => format!("image file {} ({w}x{h})", a.path),
                            None => format!("image file {}", a.path),
                        };
                        ToolResult::Image {
                            description,
                            base64,
                            mime_type,
                        }
                    }
                    Err(e) => ToolResult::error(e),
                }
            }
            FILE_MOVE => {
                let a: args::FileMoveArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                self.confirm(
                    self.vm.move_file(&a.from, &a.to).await,
                    format!("Moved {} to {}", a.from, a.to),
                )
            }
            MOUSE_MOVE => {
                let a: args::MouseMoveArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                self.confirm(
                    self.vm.mouse_move(a.x, a.y).await,
                    format!("Moved mouse to ({}, {})", a.x, a.y),
                )
            }
            MOUSE_CLICK => {
                let a: args::MouseClickArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                let button = match MouseButton::from_str(&a.button) {
                    Ok(b) => b,
                    Err(e) => return ToolResult::error(e),
                };
                self.confirm(
                    self.vm.mouse_click(a.x, a.y, button).await,
                    format!("Clicked {} at ({}, {})", a.button, a.x, a.y),
                )
            }
            TYPE_TEXT => {
                let a: args::TypeTextArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                self.confirm(
                    self.vm.type_text(&a.text).await,
                    format!("Typed {} characters", a.text.chars().count()),
                )
            }
            KEY_PRESS => {
                let a: args::KeyPressArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                self.confirm(
                    self.vm.key_press(&a.keys).await,
                    format!("Pressed {}", a.keys),
                )
            }
            SCROLL => {
                let a: args::ScrollArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                self.confirm(
                    self.vm.scroll(a.x, a.y, a.delta_y).await,
                    format!("Scrolled by {} at ({}, {})", a.delta_y, a.x, a.y),
                )
            }
            ACCESSIBILITY_TREE => match self.vm.accessibility_tree().await {
                Ok(tree) => ToolResult::Text(tree),
                Err(e) => ToolResult::error(e),
            },
            OPEN_APP => {
                let a: args::OpenAppArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                self.confirm(self.vm.open_app(&a.name).await, format!("Opened {}", a.name))
            }
            OPEN_FILE => {
                let a: args::OpenFileArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                self.confirm(
                    self.vm.open_file(&a.path).await,
                    format!("Opened {}", a.path),
                )
            }
            OPEN_URL => {
                let a: args::OpenUrlArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                self.confirm(self.vm.open_url(&a.url).await, format!("Opened {}", a.url))
            }
            other => ToolResult::error(format!("unhandled VM tool: {other}")),
        }
    }

    fn confirm(&self, outcome: Result<(), VmError>, success: String) -> ToolResult {
        match outcome {
            Ok(()) => ToolResult::Text(success),
            Err(e) => ToolResult::error(e),
        }
    }

    // -- Host-bound --------------------------------------------------------

    async fn exec_host(&self, call: &ToolCall) -> ToolResult {
        match call.name.as_str() {
            WEB_SEARCH => {
                let a: args::WebSearchArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                ToolResult::Text(
                    web_search::resilient_search(&self.search, &a.query, a.site.as_deref(), a.count)
                        .await,
                )
            }
            WEB_FETCH => {
                let a: args::WebFetchArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                ToolResult::Text(web_fetch::fetch_url(&a.url, &a.format, a.max_length).await)
            }
            GEOLOCATE => ToolResult::Text(host::geolocate().await),
            GENERATE_IMAGE => {
                let a: args::GenerateImageArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                match &self.image_backend {
                    Some(backend) => match backend.generate(&a.prompt).await {
                        Ok(image) => ToolResult::Image {
                            description: image.description,
                            base64: image.base64,
                            mime_type: image.mime_type,
                        },
                        Err(e) => ToolResult::error(e),
                    },
                    None => ToolResult::error("generate_image: no image backend configured"),
                }
            }
            other => ToolResult::error(format!("unhandled host tool: {other}")),
        }
    }

    // -- Coordination ------------------------------------------------------

    fn orchestrator(&self) -> Result<Arc<SubagentOrchestrator>, String> {
        self.lifecycle
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| "subagent lifecycle is unavailable".to_string())
    }

    async fn exec_coordination(&self, call: &ToolCall) -> ToolResult {
        match call.name.as_str() {
            FINISH_TODO => {
                let a: args::FinishTodoArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                match self.todos.finish(&self.agent_id, a.index) {
                    Ok(item) => {
                        ToolResult::Text(format!("Marked todo #{} complete: {}", item.index, item.text))
                    }
                    Err(e) => ToolResult::error(e),
                }
            }
            ADD_TODO => {
                let a: args::AddTodoArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                match self.todos.add(&self.agent_id, &a.text) {
                    Ok(index) => ToolResult::Text(format!("Added todo #{index}: {}", a.text)),
                    Err(e) => ToolResult::error(e),
                }
            }
            SEND_MESSAGE => {
                let a: args::SendMessageArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                match self.mailboxes.send(&self.agent_id, &a.to, &a.subject, &a.body) {
                    Ok(delivered) => {
                        ToolResult::Text(format!("Delivered to {delivered} mailbox(es)"))
                    }
                    Err(e) => ToolResult::error(e),
                }
            }
            SPAWN_SUBAGENT => {
                let a: args::SpawnSubagentArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                let orch = match self.orchestrator() {
                    Ok(o) => o,
                    Err(e) => return ToolResult::error(e),
                };
                let request = SpawnRequest {
                    goal: a.goal,
                    domain: a.domain,
                    tool_allowlist: a.tools,
                    todo_items: a.todo_items,
                    timeout_secs: a.timeout_secs,
                    model_override: a.model,
                    purpose: a.purpose,
                };
                match orch.spawn_boxed(request).await {
                    Ok(id) => ToolResult::Text(
                        json!({"id": id, "status": "running"}).to_string(),
                    ),
                    Err(e) => ToolResult::error(e),
                }
            }
            AWAIT_SUBAGENT => {
                let a: args::AwaitSubagentArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                let orch = match self.orchestrator() {
                    Ok(o) => o,
                    Err(e) => return ToolResult::error(e),
                };
                let timeout = a.timeout_secs.map(Duration::from_secs);
                match orch.await_result(&a.id, timeout).await {
                    Ok(completion) => match serde_json::to_string(&completion) {
                        Ok(rendered) => ToolResult::Text(rendered),
                        Err(e) => ToolResult::error(e),
                    },
                    Err(e) => ToolResult::error(e),
                }
            }
            CANCEL_SUBAGENT => {
                let a: args::CancelSubagentArgs = match args::decode(&call.name, &call.arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::error(e),
                };
                let orch = match self.orchestrator() {
                    Ok(o) => o,
                    Err(e) => return ToolResult::error(e),
                };
                match orch.cancel(&a.id) {
                    Ok(()) => ToolResult::Text(format!("Cancellation requested for {}", a.id)),
                    Err(e) => ToolResult::error(e),
                }
            }
            LIST_SUBAGENTS => {
                let orch = match self.orchestrator() {
                    Ok(o) => o,
                    Err(e) => return ToolResult::error(e),
                };
                let roster: Vec<serde_json::Value> = orch
                    .list()
                    .into_iter()
                    .map(|h| {
                        json!({
                            "id": h.id,
                            "status": h.status.as_str(),
                            "goal": h.goal,
                            "purpose": h.purpose,
                        })
                    })
                    .collect();
                match serde_json::to_string(&roster) {
                    Ok(rendered) => ToolResult::Text(rendered),
                    Err(e) => ToolResult::error(e),
                }
            }
            other => ToolResult::error(format!("unhandled coordination tool: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::local::LocalVm;

    fn dispatcher() -> ToolDispatcher {
        let dir = std::env::temp_dir();
        ToolDispatcher::new(
            "agent-test",
            Arc::new(LocalVm::new(dir).unwrap()),
            Arc::new(ToolCallScheduler::new()),
            Arc::new(TodoRegistry::new()),
            Arc::new(MailboxRegistry::new()),
            CancellationToken::new(),
        )
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call-1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_a_hard_error() {
        let d = dispatcher();
        let err = d.dispatch(&call("frobnicate", json!({}))).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTool(name) if name == "frobnicate"));
    }

    #[tokio::test]
    async fn bad_arguments_become_an_error_result() {
        let d = dispatcher();
        let result = d.dispatch(&call(SHELL_EXEC, json!({}))).await.unwrap();
        assert!(result.is_error());
        assert!(result.render_for_chat().contains("command"));
    }

    #[tokio::test]
    async fn finish_todo_reports_the_item_text() {
        let d = dispatcher();
        d.todos.register("agent-test", &["inspect logs".to_string()]);
        let result = d
            .dispatch(&call(FINISH_TODO, json!({"index": 1})))
            .await
            .unwrap();
        assert_eq!(
            result.render_for_chat(),
            "Marked todo #1 complete: inspect logs"
        );
    }

    #[tokio::test]
    async fn lifecycle_tools_error_without_an_orchestrator() {
        let d = dispatcher();
        let result = d
            .dispatch(&call(SPAWN_SUBAGENT, json!({"goal": "do a thing"})))
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.render_for_chat().contains("lifecycle"));
    }

    #[tokio::test]
    async fn vision_degradation_replaces_images_with_descriptions() {
        let d = dispatcher().with_vision(false);
        let degraded = d.degrade_for_vision(ToolResult::Image {
            description: "a red square".to_string(),
            base64: "cGl4ZWxz".to_string(),
            mime_type: "image/png".to_string(),
        });
        assert_eq!(degraded.render_for_chat(), "a red square");
    }

    #[tokio::test]
    async fn cancelled_vm_call_reports_inline_error() {
        let d = dispatcher();
        d.cancel.cancel();
        d.scheduler.pause();
        let result = d
            .dispatch(&call(SHELL_EXEC, json!({"command": "true"})))
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.render_for_chat().contains("cancelled"));
    }
}
