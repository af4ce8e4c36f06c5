//! LLM client seam and the conversation vocabulary shared by the engine,
//! dispatcher, and trace logger.
//!
//! The engine never talks to a provider SDK directly; it goes through the
//! [`LlmClient`] trait so tests can script replies and the binary can plug in
//! the genai-backed adapter from [`genai_client`].

pub mod genai_client;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// One message in a subagent's running conversation.
#[derive(Clone, Debug)]
pub enum ChatMessage {
    System(String),
    User(String),
    /// Assistant turn: free text, tool calls, or both.
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    /// Result of a tool call, keyed back to the call that produced it.
    ToolResponse { call_id: String, content: String },
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System(text.into())
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User(text.into())
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_response(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResponse {
            call_id: call_id.into(),
            content: content.into(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of a tool call, fed back into the conversation.
///
/// Recoverable handler failures become [`ToolResult::error`] text rather than
/// an engine-level error, so the model can observe the failure and react.
#[derive(Clone, Debug)]
pub enum ToolResult {
    Text(String),
    Image {
        description: String,
        base64: String,
        mime_type: String,
    },
}

impl ToolResult {
    /// Wrap a recoverable failure as an inline error result.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Text(format!("Error: {message}"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Text(t) if t.starts_with("Error: "))
    }

    /// Render for the text-only conversation transcript. Image payloads keep
    /// their description; the base64 body is summarized, not inlined.
    pub fn render_for_chat(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Image {
                description,
                base64,
                mime_type,
            } => format!("[image {mime_type}, {} bytes base64] {description}", base64.len()),
        }
    }

    /// Short preview for trace/progress output.
    pub fn preview(&self, max_chars: usize) -> String {
        let full = self.render_for_chat();
        let cut = floor_char_boundary(&full, max_chars);
        if cut < full.len() {
            format!("{}...", &full[..cut])
        } else {
            full
        }
    }
}

/// Largest byte index at or below `max` that lands on a char boundary, so
/// truncation never splits a multibyte character.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

/// Schema offered to the model for one callable tool.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}

/// A single model reply: optional free text plus zero or more tool calls.
#[derive(Clone, Debug, Default)]
pub struct LlmReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Narrow contract to the LLM provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier, used for logging and capability lookups.
    fn model_id(&self) -> &str;

    /// One request/response chat turn with the given tool set.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, LlmError>;

    /// Streaming variant: `on_content` receives incremental text chunks.
    /// The default implementation falls back to a non-streaming call.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        _on_content: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> Result<LlmReply, LlmError> {
        self.chat(messages, tools).await
    }

    /// A client bound to a different model id, for per-subagent overrides.
    fn for_model(&self, model: &str) -> Arc<dyn LlmClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_result_is_flagged() {
        let r = ToolResult::error("boom");
        assert!(r.is_error());
        assert_eq!(r.render_for_chat(), "Error: boom");
    }

    #[test]
    fn plain_text_result_is_not_error() {
        assert!(!ToolResult::Text("all good".into()).is_error());
    }

    #[test]
    fn image_render_keeps_description_and_omits_payload() {
        let r = ToolResult::Image {
            description: "login screen".into(),
            base64: "aGVsbG8=".into(),
            mime_type: "image/png".into(),
        };
        let rendered = r.render_for_chat();
        assert!(rendered.contains("login screen"));
        assert!(rendered.contains("image/png"));
        assert!(!rendered.contains("aGVsbG8="));
    }

    #[test]
    fn preview_truncates_long_results() {
        let r = ToolResult::Text("x".repeat(500));
        let p = r.preview(100);
        assert!(p.len() <= 103);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn preview_truncates_multibyte_text_on_char_boundaries() {
        let r = ToolResult::Text("€".repeat(1000));
        let p = r.preview(2000);
        assert!(p.ends_with("..."));
        assert!(p.trim_end_matches("...").chars().all(|c| c == '€'));
    }
}
