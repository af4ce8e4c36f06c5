//! genai-backed [`LlmClient`] implementation.
//!
//! Uses `exec_chat_stream` with capture options for both the streaming and
//! non-streaming trait methods, so captured text and tool calls come back the
//! same way regardless of how the caller consumes the turn.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use genai::chat::{ChatMessage as GenaiMessage, ChatOptions, ChatRequest, ChatStreamEvent, Tool, ToolCall as GenaiToolCall, ToolResponse};
use genai::Client;

use super::{ChatMessage, LlmClient, LlmReply, ToolCall, ToolSpec};
use crate::error::LlmError;

pub struct GenaiClient {
    client: Client,
    model: String,
}

impl GenaiClient {
    /// Create a client for the given model. Non-prefixed model names resolve
    /// to Ollama by genai's defaults.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::default(),
            model: model.into(),
        }
    }
}

/// Convert the crate's conversation history to a genai `ChatRequest`.
///
/// The first system message seeds the request; an assistant turn carrying
/// both text and tool calls expands to two genai messages since genai models
/// them separately.
fn build_request(messages: &[ChatMessage], tools: &[ToolSpec]) -> ChatRequest {
    let mut iter = messages.iter();

    let mut req = match iter.next() {
        Some(ChatMessage::System(text)) => ChatRequest::from_system(text),
        _ => {
            // No leading system message: start empty and replay everything.
            iter = messages.iter();
            ChatRequest::from_system("")
        }
    };

    let genai_tools: Vec<Tool> = tools
        .iter()
        .map(|t| {
            Tool::new(t.name.clone())
                .with_description(t.description.clone())
                .with_schema(t.schema.clone())
        })
        .collect();
    req = req.with_tools(genai_tools);

    for msg in iter {
        match msg {
            ChatMessage::System(text) => {
                req = req.append_message(GenaiMessage::system(text));
            }
            ChatMessage::User(text) => {
                req = req.append_message(GenaiMessage::user(text));
            }
            ChatMessage::Assistant { text, tool_calls } => {
                if let Some(text) = text {
                    req = req.append_message(GenaiMessage::assistant(text));
                }
                if !tool_calls.is_empty() {
                    let calls: Vec<GenaiToolCall> = tool_calls
                        .iter()
                        .map(|c| GenaiToolCall {
                            call_id: c.id.clone(),
                            fn_name: c.name.clone(),
                            fn_arguments: c.arguments.clone(),
                            thought_signatures: None,
                        })
                        .collect();
                    req = req.append_message(GenaiMessage::from(calls));
                }
            }
            ChatMessage::ToolResponse { call_id, content } => {
                req = req.append_message(ToolResponse::new(call_id.clone(), content.clone()));
            }
        }
    }

    req
}

#[async_trait]
impl LlmClient for GenaiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, LlmError> {
        self.chat_stream(messages, tools, &|_| {}).await
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        on_content: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> Result<LlmReply, LlmError> {
        let chat_req = build_request(messages, tools);
        let chat_options = ChatOptions::default()
            .with_capture_content(true)
            .with_capture_tool_calls(true)
            .with_capture_usage(true);

        let stream_res = self
            .client
            .exec_chat_stream(&self.model, chat_req, Some(&chat_options))
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let mut stream = stream_res.stream;
        let mut reply = LlmReply::default();

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => {
                    on_content(&chunk.content);
                }
                Ok(ChatStreamEvent::End(end)) => {
                    if let Some(text) = end.captured_first_text() {
                        reply.text = Some(text.to_string());
                    }
                    if let Some(calls) = end.captured_tool_calls() {
                        reply.tool_calls = calls
                            .into_iter()
                            .map(|c| ToolCall {
                                id: c.call_id.clone(),
                                name: c.fn_name.clone(),
                                arguments: c.fn_arguments.clone(),
                            })
                            .collect();
                    }
                }
                Ok(_) => {
                    // Start, ReasoningChunk, ToolCallChunk -- ignore.
                }
                Err(e) => {
                    return Err(LlmError::Transport(e.to_string()));
                }
            }
        }

        Ok(reply)
    }

    fn for_model(&self, model: &str) -> Arc<dyn LlmClient> {
        Arc::new(Self::new(model))
    }
}
