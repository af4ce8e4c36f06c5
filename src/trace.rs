//! Append-only JSONL trace logger for full subagent replay.
//!
//! Each subagent writes one `agent-{id}.jsonl` file. Every event carries a
//! monotonically increasing step counter and an ISO 8601 timestamp, so a
//! trace can be replayed in order without relying on file position.
//!
//! Uses synchronous `std::fs` since writes are small, buffered, and flushed
//! after each event.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// A structured trace event, serialized as a single JSON line.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type")]
pub enum TraceEvent {
    /// A chat request about to be sent to the LLM.
    #[serde(rename = "llm_request")]
    LlmRequest {
        timestamp: String,
        step: u64,
        iteration: u32,
        model: String,
        message_count: usize,
        tool_count: usize,
    },

    /// The LLM's reply for one turn.
    #[serde(rename = "llm_response")]
    LlmResponse {
        timestamp: String,
        step: u64,
        iteration: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        tool_call_count: usize,
    },

    /// A tool call requested by the model.
    #[serde(rename = "tool_call")]
    ToolCall {
        timestamp: String,
        step: u64,
        iteration: u32,
        call_id: String,
        tool: String,
        arguments: serde_json::Value,
    },

    /// The result of a tool call execution.
    #[serde(rename = "tool_result")]
    ToolResult {
        timestamp: String,
        step: u64,
        iteration: u32,
        call_id: String,
        tool: String,
        result: String,
        is_error: bool,
    },

    /// A synthetic instruction injected into the conversation (mailbox
    /// delivery, nudges, final-report corrections).
    #[serde(rename = "system_message")]
    SystemMessage {
        timestamp: String,
        step: u64,
        content: String,
    },

    /// A transport or loop-level error.
    #[serde(rename = "error")]
    Error {
        timestamp: String,
        step: u64,
        message: String,
    },

    /// Lifecycle marker: started, finished, cancelled, timed out.
    #[serde(rename = "lifecycle")]
    Lifecycle {
        timestamp: String,
        step: u64,
        phase: String,
        detail: String,
    },
}

/// Append-only JSONL writer with a per-trace step counter.
pub struct TraceLogger {
    writer: BufWriter<fs::File>,
    path: PathBuf,
    step: u64,
}

impl TraceLogger {
    /// Create a trace file `agent-{agent_id}.jsonl` inside `dir`, creating
    /// the directory if needed.
    pub fn new_in_dir(dir: &Path, agent_id: &str) -> anyhow::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("agent-{agent_id}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            step: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn next_step(&mut self) -> u64 {
        self.step += 1;
        self.step
    }

    fn write(&mut self, event: &TraceEvent) {
        // Trace failures must never abort the loop; warn and keep going.
        if let Err(e) = self.try_write(event) {
            tracing::warn!("trace write failed at {}: {e}", self.path.display());
        }
    }

    fn try_write(&mut self, event: &TraceEvent) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn llm_request(&mut self, iteration: u32, model: &str, message_count: usize, tool_count: usize) {
        let step = self.next_step();
        self.write(&TraceEvent::LlmRequest {
            timestamp: now_iso(),
            step,
            iteration,
            model: model.to_string(),
            message_count,
            tool_count,
        });
    }

    pub fn llm_response(&mut self, iteration: u32, text: Option<&str>, tool_call_count: usize) {
        let step = self.next_step();
        self.write(&TraceEvent::LlmResponse {
            timestamp: now_iso(),
            step,
            iteration,
            text: text.map(str::to_string),
            tool_call_count,
        });
    }

    pub fn tool_call(&mut self, iteration: u32, call_id: &str, tool: &str, arguments: &serde_json::Value) {
        let step = self.next_step();
        self.write(&TraceEvent::ToolCall {
            timestamp: now_iso(),
            step,
            iteration,
            call_id: call_id.to_string(),
            tool: tool.to_string(),
            arguments: arguments.clone(),
        });
    }

    pub fn tool_result(&mut self, iteration: u32, call_id: &str, tool: &str, result: &str, is_error: bool) {
        let step = self.next_step();
        self.write(&TraceEvent::ToolResult {
            timestamp: now_iso(),
            step,
            iteration,
            call_id: call_id.to_string(),
            tool: tool.to_string(),
            result: result.to_string(),
            is_error,
        });
    }

    pub fn system_message(&mut self, content: &str) {
        let step = self.next_step();
        self.write(&TraceEvent::SystemMessage {
            timestamp: now_iso(),
            step,
            content: content.to_string(),
        });
    }

    pub fn error(&mut self, message: &str) {
        let step = self.next_step();
        self.write(&TraceEvent::Error {
            timestamp: now_iso(),
            step,
            message: message.to_string(),
        });
    }

    pub fn lifecycle(&mut self, phase: &str, detail: &str) {
        let step = self.next_step();
        self.write(&TraceEvent::Lifecycle {
            timestamp: now_iso(),
            step,
            phase: phase.to_string(),
            detail: detail.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use tempfile::TempDir;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        let file = fs::File::open(path).unwrap();
        std::io::BufReader::new(file)
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn creates_file_named_after_agent() {
        let tmp = TempDir::new().unwrap();
        let logger = TraceLogger::new_in_dir(tmp.path(), "abc-123").unwrap();
        assert!(logger.path().ends_with("agent-abc-123.jsonl"));
        assert!(logger.path().exists());
    }

    #[test]
    fn steps_increase_monotonically_across_event_kinds() {
        let tmp = TempDir::new().unwrap();
        let mut logger = TraceLogger::new_in_dir(tmp.path(), "a").unwrap();

        logger.lifecycle("started", "goal: test");
        logger.llm_request(1, "test-model", 2, 5);
        logger.llm_response(1, Some("thinking"), 1);
        logger.tool_call(1, "c1", "shell_exec", &serde_json::json!({"command": "ls"}));
        logger.tool_result(1, "c1", "shell_exec", "ok", false);

        let lines = read_lines(logger.path());
        assert_eq!(lines.len(), 5);
        let steps: Vec<u64> = lines.iter().map(|l| l["step"].as_u64().unwrap()).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn events_are_tagged_and_self_describing() {
        let tmp = TempDir::new().unwrap();
        let mut logger = TraceLogger::new_in_dir(tmp.path(), "a").unwrap();

        logger.system_message("[nudge] keep calling tools");
        logger.error("transport refused");

        let lines = read_lines(logger.path());
        assert_eq!(lines[0]["event_type"], "system_message");
        assert_eq!(lines[0]["content"], "[nudge] keep calling tools");
        assert_eq!(lines[1]["event_type"], "error");
        assert_eq!(lines[1]["message"], "transport refused");
    }

    #[test]
    fn response_without_text_omits_field() {
        let tmp = TempDir::new().unwrap();
        let mut logger = TraceLogger::new_in_dir(tmp.path(), "a").unwrap();
        logger.llm_response(1, None, 2);

        let lines = read_lines(logger.path());
        assert!(lines[0].get("text").is_none());
        assert_eq!(lines[0]["tool_call_count"], 2);
    }
}
