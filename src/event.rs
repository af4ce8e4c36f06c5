//! One-way state publishing for UI consumption.
//!
//! The engine and orchestrator emit progress lines, action labels, and
//! lifecycle notifications through [`StatePublisher`]. The sink is optional:
//! a publisher built without a channel swallows every event, so headless
//! runs need no special-casing at the call sites.

use tokio::sync::mpsc::UnboundedSender;

/// What kind of progress line is being reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressKind {
    Thinking,
    Response,
    ToolCall,
    ToolResult,
    Error,
    Nudge,
}

#[derive(Clone, Debug)]
pub enum AgentEvent {
    /// Free-form progress line from a running subagent.
    Progress {
        agent_id: String,
        kind: ProgressKind,
        text: String,
    },
    /// Short label describing what the subagent is doing right now.
    Action { agent_id: String, label: String },
    Started { agent_id: String, goal: String },
    Finished { agent_id: String, status: String },
}

pub type EventSender = UnboundedSender<AgentEvent>;

/// Nil-safe event sink. Send errors are ignored (the consumer may be gone).
#[derive(Clone, Default)]
pub struct StatePublisher {
    tx: Option<EventSender>,
}

impl StatePublisher {
    pub fn new(tx: Option<EventSender>) -> Self {
        Self { tx }
    }

    /// A publisher that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn progress(&self, agent_id: &str, kind: ProgressKind, text: impl Into<String>) {
        self.send(AgentEvent::Progress {
            agent_id: agent_id.to_string(),
            kind,
            text: text.into(),
        });
    }

    pub fn action(&self, agent_id: &str, label: impl Into<String>) {
        self.send(AgentEvent::Action {
            agent_id: agent_id.to_string(),
            label: label.into(),
        });
    }

    pub fn started(&self, agent_id: &str, goal: &str) {
        self.send(AgentEvent::Started {
            agent_id: agent_id.to_string(),
            goal: goal.to_string(),
        });
    }

    pub fn finished(&self, agent_id: &str, status: &str) {
        self.send(AgentEvent::Finished {
            agent_id: agent_id.to_string(),
            status: status.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_publisher_is_a_no_op() {
        let publisher = StatePublisher::disabled();
        publisher.progress("a", ProgressKind::Thinking, "hello");
        publisher.action("a", "searching");
        publisher.finished("a", "completed");
    }

    #[tokio::test]
    async fn events_arrive_on_the_channel() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let publisher = StatePublisher::new(Some(tx));

        publisher.action("agent-1", "web_search");
        publisher.progress("agent-1", ProgressKind::ToolResult, "3 results");

        match rx.recv().await.unwrap() {
            AgentEvent::Action { agent_id, label } => {
                assert_eq!(agent_id, "agent-1");
                assert_eq!(label, "web_search");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            AgentEvent::Progress { kind: ProgressKind::ToolResult, .. }
        ));
    }

    #[test]
    fn send_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let publisher = StatePublisher::new(Some(tx));
        publisher.started("a", "goal");
    }
}
