//! Shared vocabulary of the subagent lifecycle layer.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::todo::TodoItem;

pub type AgentId = String;

/// Which execution surface a subagent's work touches. Used for prompt
/// framing; the dispatcher routes per tool, not per domain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Host,
    Vm,
    #[default]
    Mixed,
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "vm" => Ok(Self::Vm),
            "mixed" => Ok(Self::Mixed),
            other => Err(format!("unknown domain '{other}' (host|vm|mixed)")),
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Vm => write!(f, "vm"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle record for one subagent. Created at spawn; mutated only by the
/// orchestrator's terminal transition; immutable once terminal.
#[derive(Clone, Debug, Serialize)]
pub struct SubagentHandle {
    pub id: AgentId,
    pub goal: String,
    pub domain: Domain,
    pub tool_allowlist: BTreeSet<String>,
    pub todo_items: Vec<TodoItem>,
    pub status: AgentStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub trace_path: PathBuf,
    pub summary: Option<String>,
    pub error_message: Option<String>,
    pub purpose: Option<String>,
}

/// Record pushed onto the completion queue when a subagent reaches a
/// terminal state, for pull-based discovery by the parent.
#[derive(Clone, Debug, Serialize)]
pub struct Completion {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    pub summary: String,
    pub failure_reason: Option<String>,
    pub ended_at: String,
}

/// Inputs to [`super::SubagentOrchestrator::spawn`].
#[derive(Clone, Debug, Default)]
pub struct SpawnRequest {
    pub goal: String,
    pub domain: Domain,
    /// `None` allows the full builtin catalogue (minus todo-authoring).
    pub tool_allowlist: Option<Vec<String>>,
    pub todo_items: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub model_override: Option<String>,
    pub purpose: Option<String>,
}
