#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use conductor::error::{LlmError, VmError};
use conductor::llm::{ChatMessage, LlmClient, LlmReply, ToolCall, ToolSpec};
use conductor::vm::{FileContent, MouseButton, Screenshot, ShellOutput, VmConnection};

/// An LLM that replays a scripted sequence of replies. Once the script is
/// exhausted it returns empty replies (no text, no tool calls).
pub struct ScriptedLlm {
    model: String,
    replies: Mutex<VecDeque<Result<LlmReply, LlmError>>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<LlmReply, LlmError>>) -> Self {
        Self {
            model: "scripted".to_string(),
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<LlmReply, LlmError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(LlmReply::default()))
    }

    fn for_model(&self, _model: &str) -> Arc<dyn LlmClient> {
        Arc::new(ScriptedLlm::new(Vec::new()))
    }
}

/// An LLM whose requests never complete. For cancellation and timeout tests.
pub struct HangingLlm;

#[async_trait]
impl LlmClient for HangingLlm {
    fn model_id(&self) -> &str {
        "hanging"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<LlmReply, LlmError> {
        std::future::pending().await
    }

    fn for_model(&self, _model: &str) -> Arc<dyn LlmClient> {
        Arc::new(HangingLlm)
    }
}

/// A VM double that records every operation in order and always succeeds.
#[derive(Default)]
pub struct MockVm {
    pub ops: Mutex<Vec<String>>,
}

impl MockVm {
    pub fn recorded(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: impl Into<String>) {
        self.ops.lock().unwrap().push(op.into());
    }
}

#[async_trait]
impl VmConnection for MockVm {
    async fn shell_exec(&self, command: &str, _timeout_secs: u64) -> Result<ShellOutput, VmError> {
        self.record(format!("shell:{command}"));
        Ok(ShellOutput {
            stdout: command.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            timed_out: false,
        })
    }

    async fn read_file(&self, path: &str) -> Result<FileContent, VmError> {
        self.record(format!("read:{path}"));
        Ok(FileContent::Text(format!("contents of {path}")))
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<(), VmError> {
        self.record(format!("move:{from}->{to}"));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Screenshot, VmError> {
        self.record("screenshot");
        Ok(Screenshot {
            base64_png: "cGl4ZWxz".to_string(),
            width: 1920,
            height: 1080,
        })
    }

    async fn mouse_move(&self, x: i32, y: i32) -> Result<(), VmError> {
        self.record(format!("mouse_move:{x},{y}"));
        Ok(())
    }

    async fn mouse_click(&self, x: i32, y: i32, _button: MouseButton) -> Result<(), VmError> {
        self.record(format!("click:{x},{y}"));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), VmError> {
        self.record(format!("type:{text}"));
        Ok(())
    }

    async fn key_press(&self, combo: &str) -> Result<(), VmError> {
        self.record(format!("key:{combo}"));
        Ok(())
    }

    async fn scroll(&self, x: i32, y: i32, delta_y: i32) -> Result<(), VmError> {
        self.record(format!("scroll:{x},{y},{delta_y}"));
        Ok(())
    }

    async fn accessibility_tree(&self) -> Result<String, VmError> {
        self.record("tree");
        Ok("window > button 'OK'".to_string())
    }

    async fn open_app(&self, name: &str) -> Result<(), VmError> {
        self.record(format!("open_app:{name}"));
        Ok(())
    }

    async fn open_file(&self, path: &str) -> Result<(), VmError> {
        self.record(format!("open_file:{path}"));
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<(), VmError> {
        self.record(format!("open_url:{url}"));
        Ok(())
    }
}

// -- Scripted reply builders -----------------------------------------------

pub fn empty_reply() -> Result<LlmReply, LlmError> {
    Ok(LlmReply::default())
}

pub fn text_reply(text: &str) -> Result<LlmReply, LlmError> {
    Ok(LlmReply {
        text: Some(text.to_string()),
        tool_calls: Vec::new(),
    })
}

pub fn tool_reply(name: &str, arguments: serde_json::Value) -> Result<LlmReply, LlmError> {
    Ok(LlmReply {
        text: None,
        tool_calls: vec![ToolCall {
            id: format!("call-{name}"),
            name: name.to_string(),
            arguments,
        }],
    })
}

pub fn report_reply(
    status: &str,
    items: &[(usize, bool)],
    report: &str,
) -> Result<LlmReply, LlmError> {
    let todo_items: Vec<serde_json::Value> = items
        .iter()
        .map(|(index, completed)| json!({"index": index, "completed": completed}))
        .collect();
    tool_reply(
        "submit_final_report",
        json!({
            "status": status,
            "todo_items": todo_items,
            "report": report,
        }),
    )
}

pub fn transport_err(message: &str) -> Result<LlmReply, LlmError> {
    Err(LlmError::Transport(message.to_string()))
}
