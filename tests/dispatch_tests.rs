mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use conductor::dispatch::{ExternalToolRegistry, ToolDispatcher};
use conductor::error::VmError;
use conductor::llm::{ToolCall, ToolResult, ToolSpec};
use conductor::orchestrator::mailbox::MailboxRegistry;
use conductor::orchestrator::normalize_allowlist;
use conductor::scheduler::ToolCallScheduler;
use conductor::todo::TodoRegistry;
use conductor::vm::{FileContent, MouseButton, Screenshot, ShellOutput, VmConnection};

use common::MockVm;

fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: format!("call-{name}"),
        name: name.to_string(),
        arguments,
    }
}

struct Shared {
    vm: Arc<MockVm>,
    scheduler: Arc<ToolCallScheduler>,
    todos: Arc<TodoRegistry>,
    mailboxes: Arc<MailboxRegistry>,
}

impl Shared {
    fn new() -> Self {
        Self {
            vm: Arc::new(MockVm::default()),
            scheduler: Arc::new(ToolCallScheduler::new()),
            todos: Arc::new(TodoRegistry::new()),
            mailboxes: Arc::new(MailboxRegistry::new()),
        }
    }

    fn dispatcher(&self, agent_id: &str) -> ToolDispatcher {
        self.mailboxes.create(agent_id);
        ToolDispatcher::new(
            agent_id,
            self.vm.clone(),
            self.scheduler.clone(),
            self.todos.clone(),
            self.mailboxes.clone(),
            CancellationToken::new(),
        )
    }
}

#[tokio::test]
async fn messages_flow_between_agents() {
    let shared = Shared::new();
    let alice = shared.dispatcher("alice");
    let bob = shared.dispatcher("bob");

    let sent = alice
        .dispatch(&call(
            "send_message",
            json!({"to": "bob", "subject": "hi", "body": "found the file"}),
        ))
        .await
        .unwrap();
    assert_eq!(sent.render_for_chat(), "Delivered to 1 mailbox(es)");

    let inbox = shared.mailboxes.drain("bob");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].from, "alice");
    assert_eq!(inbox[0].body, "found the file");

    // Broadcast from bob reaches alice and main, never bob.
    let sent = bob
        .dispatch(&call(
            "send_message",
            json!({"to": "broadcast", "subject": "ping", "body": "all hands"}),
        ))
        .await
        .unwrap();
    assert_eq!(sent.render_for_chat(), "Delivered to 2 mailbox(es)");
    assert!(shared.mailboxes.drain("bob").is_empty());
}

#[tokio::test]
async fn message_to_terminated_agent_is_an_error_result() {
    let shared = Shared::new();
    let alice = shared.dispatcher("alice");
    let result = alice
        .dispatch(&call(
            "send_message",
            json!({"to": "gone", "subject": "s", "body": "b"}),
        ))
        .await
        .unwrap();
    assert!(result.is_error());
    assert!(result.render_for_chat().contains("gone"));
}

#[tokio::test]
async fn screenshot_degrades_without_vision() {
    let shared = Shared::new();
    let d = shared.dispatcher("a").with_vision(false);
    let result = d.dispatch(&call("screenshot", json!({}))).await.unwrap();
    match result {
        ToolResult::Text(text) => assert!(text.contains("1920x1080"), "unexpected: {text}"),
        other => panic!("expected degraded text, got {other:?}"),
    }
}

#[tokio::test]
async fn screenshot_stays_an_image_with_vision() {
    let shared = Shared::new();
    let d = shared.dispatcher("a");
    let result = d.dispatch(&call("screenshot", json!({}))).await.unwrap();
    assert!(matches!(result, ToolResult::Image { .. }));
}

/// A VM that asserts it is never entered concurrently.
struct ExclusiveVm {
    active: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl ExclusiveVm {
    fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    async fn enter(&self, op: &str) {
        let was = self.active.fetch_add(1, Ordering::SeqCst);
        assert_eq!(was, 0, "VM entered concurrently during {op}");
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.log.lock().unwrap().push(op.to_string());
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VmConnection for ExclusiveVm {
    async fn shell_exec(&self, command: &str, _timeout_secs: u64) -> Result<ShellOutput, VmError> {
        self.enter(command).await;
        Ok(ShellOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            timed_out: false,
        })
    }

    async fn read_file(&self, path: &str) -> Result<FileContent, VmError> {
        self.enter(path).await;
        Ok(FileContent::Text(String::new()))
    }

    async fn move_file(&self, _from: &str, _to: &str) -> Result<(), VmError> {
        self.enter("move").await;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Screenshot, VmError> {
        self.enter("screenshot").await;
        Ok(Screenshot {
            base64_png: String::new(),
            width: 0,
            height: 0,
        })
    }

    async fn mouse_move(&self, _x: i32, _y: i32) -> Result<(), VmError> {
        self.enter("mouse_move").await;
        Ok(())
    }

    async fn mouse_click(&self, _x: i32, _y: i32, _button: MouseButton) -> Result<(), VmError> {
        self.enter("mouse_click").await;
        Ok(())
    }

    async fn type_text(&self, _text: &str) -> Result<(), VmError> {
        self.enter("type_text").await;
        Ok(())
    }

    async fn key_press(&self, _combo: &str) -> Result<(), VmError> {
        self.enter("key_press").await;
        Ok(())
    }

    async fn scroll(&self, _x: i32, _y: i32, _delta_y: i32) -> Result<(), VmError> {
        self.enter("scroll").await;
        Ok(())
    }

    async fn accessibility_tree(&self) -> Result<String, VmError> {
        self.enter("tree").await;
        Ok(String::new())
    }

    async fn open_app(&self, _name: &str) -> Result<(), VmError> {
        self.enter("open_app").await;
        Ok(())
    }

    async fn open_file(&self, _path: &str) -> Result<(), VmError> {
        self.enter("open_file").await;
        Ok(())
    }

    async fn open_url(&self, _url: &str) -> Result<(), VmError> {
        self.enter("open_url").await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_vm_calls_from_many_agents_never_overlap() {
    let vm = Arc::new(ExclusiveVm::new());
    let scheduler = Arc::new(ToolCallScheduler::new());
    let todos = Arc::new(TodoRegistry::new());
    let mailboxes = Arc::new(MailboxRegistry::new());

    let mut tasks = Vec::new();
    for agent in 0..8 {
        let d = ToolDispatcher::new(
            format!("agent-{agent}"),
            vm.clone(),
            scheduler.clone(),
            todos.clone(),
            mailboxes.clone(),
            CancellationToken::new(),
        );
        tasks.push(tokio::spawn(async move {
            d.dispatch(&call("shell_exec", json!({"command": format!("cmd-{agent}")})))
                .await
                .unwrap()
        }));
    }

    for task in tasks {
        let result = task.await.unwrap();
        assert!(!result.is_error());
    }
    assert_eq!(vm.log.lock().unwrap().len(), 8);
}

struct FakeTicketing;

#[async_trait]
impl ExternalToolRegistry for FakeTicketing {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![ToolSpec::new(
            "ticket_lookup",
            "Look up a ticket by id.",
            json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]}),
        )]
    }

    fn contains(&self, name: &str) -> bool {
        name == "ticket_lookup"
    }

    async fn call(&self, _name: &str, arguments: &serde_json::Value) -> Result<ToolResult, String> {
        let id = arguments["id"].as_str().unwrap_or("?");
        Ok(ToolResult::Text(format!("ticket {id}: open")))
    }
}

#[tokio::test]
async fn external_tools_pass_through_the_registry() {
    let shared = Shared::new();
    let d = shared.dispatcher("a").with_external(Arc::new(FakeTicketing));

    let result = d
        .dispatch(&call("ticket_lookup", json!({"id": "T-42"})))
        .await
        .unwrap();
    assert_eq!(result.render_for_chat(), "ticket T-42: open");

    // Still unknown when the registry does not claim the name.
    assert!(d.dispatch(&call("other_tool", json!({}))).await.is_err());
}

#[tokio::test]
async fn dispatch_refuses_tools_outside_the_allowlist() {
    let shared = Shared::new();
    let allowlist = normalize_allowlist(Some(vec!["web_search".to_string()]));
    let d = shared.dispatcher("a").with_allowlist(allowlist);

    let result = d
        .dispatch(&call("shell_exec", json!({"command": "id"})))
        .await
        .unwrap();
    assert!(result.is_error());
    assert!(result.render_for_chat().contains("allowlist"));

    // Reserved names unioned in at normalization still work.
    let result = d
        .dispatch(&call(
            "send_message",
            json!({"to": "main", "subject": "s", "body": "b"}),
        ))
        .await
        .unwrap();
    assert!(!result.is_error());

    // Unknown names stay a hard error, not an allowlist refusal.
    assert!(d.dispatch(&call("frobnicate", json!({}))).await.is_err());
}

#[tokio::test]
async fn available_specs_cover_allowlist_and_externals() {
    let shared = Shared::new();
    let d = shared.dispatcher("a").with_external(Arc::new(FakeTicketing));

    let allowlist = normalize_allowlist(Some(vec!["web_search".to_string()]));
    let specs = d.available_specs(&allowlist);
    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();

    assert!(names.contains(&"web_search"));
    // The wildcard admitted at normalization brings external tools in.
    assert!(names.contains(&"ticket_lookup"));
    // The finalization tool is always offered.
    assert!(names.contains(&"submit_final_report"));
    // Unlisted builtins are not.
    assert!(!names.contains(&"shell_exec"));
}
