use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors surfaced by the LLM client seam.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport-level failure (connection refused, timeout, HTTP error).
    /// The engine retries these with exponential backoff.
    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM returned a malformed response: {0}")]
    Malformed(String),
}

/// Errors surfaced by the VM guest connection.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("VM operation not supported on this backend: {0}")]
    Unsupported(String),

    #[error("VM transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The only hard error in tool dispatch. Every recoverable failure inside a
/// handler is converted to an inline `Error: ...` tool result instead.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Errors returned by the VM call scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The submitting subagent was cancelled while its operation was queued
    /// or waiting out a pause.
    #[error("operation cancelled before execution")]
    Cancelled,
}
