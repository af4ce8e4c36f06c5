//! Per-agent inbound message queues for asynchronous inter-agent messaging.
//!
//! Mailboxes are created at spawn and destroyed at terminal transition; the
//! parent orchestrator always owns a `"main"` mailbox. Draining is
//! destructive (at-most-once read).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// Recipient address for the parent orchestrator.
pub const MAIN_RECIPIENT: &str = "main";

/// Recipient address that fans out to every active mailbox except the
/// sender's own.
pub const BROADCAST: &str = "broadcast";

#[derive(Clone, Debug, Serialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub timestamp: String,
}

pub struct MailboxRegistry {
    boxes: Mutex<HashMap<String, VecDeque<Message>>>,
}

impl MailboxRegistry {
    pub fn new() -> Self {
        let mut boxes = HashMap::new();
        boxes.insert(MAIN_RECIPIENT.to_string(), VecDeque::new());
        Self {
            boxes: Mutex::new(boxes),
        }
    }

    pub fn create(&self, agent_id: &str) {
        self.boxes
            .lock()
            .unwrap()
            .entry(agent_id.to_string())
            .or_default();
    }

    pub fn remove(&self, agent_id: &str) {
        self.boxes.lock().unwrap().remove(agent_id);
    }

    pub fn exists(&self, agent_id: &str) -> bool {
        self.boxes.lock().unwrap().contains_key(agent_id)
    }

    /// Deliver a message. Returns the number of mailboxes it reached.
    ///
    /// `to = "broadcast"` fans out to every active mailbox except the
    /// sender's own; any other address must name an existing mailbox.
    pub fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<usize, String> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        };

        let mut boxes = self.boxes.lock().unwrap();

        if to == BROADCAST {
            let mut delivered = 0;
            for (recipient, queue) in boxes.iter_mut() {
                if recipient == from {
                    continue;
                }
                queue.push_back(message.clone());
                delivered += 1;
            }
            return Ok(delivered);
        }

        match boxes.get_mut(to) {
            Some(queue) => {
                queue.push_back(message);
                Ok(1)
            }
            None => Err(format!("no mailbox for recipient '{to}'")),
        }
    }

    /// Return and clear the queue for `agent_id`. A second immediate drain
    /// returns empty.
    pub fn drain(&self, agent_id: &str) -> Vec<Message> {
        let mut boxes = self.boxes.lock().unwrap();
        match boxes.get_mut(agent_id) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }
}

impl Default for MailboxRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_to_named_recipient_delivers_once() {
        let reg = MailboxRegistry::new();
        reg.create("a");
        let delivered = reg.send("main", "a", "hi", "body").unwrap();
        assert_eq!(delivered, 1);

        let messages = reg.drain("a");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from, "main");
        assert_eq!(messages[0].subject, "hi");
    }

    #[test]
    fn send_to_unknown_recipient_errors() {
        let reg = MailboxRegistry::new();
        let err = reg.send("main", "ghost", "s", "b").unwrap_err();
        assert!(err.contains("ghost"));
    }

    #[test]
    fn drain_is_destructive() {
        let reg = MailboxRegistry::new();
        reg.create("a");
        reg.send("main", "a", "s", "b").unwrap();

        assert_eq!(reg.drain("a").len(), 1);
        assert!(reg.drain("a").is_empty());
    }

    #[test]
    fn broadcast_excludes_sender() {
        let reg = MailboxRegistry::new();
        reg.create("a");
        reg.create("b");

        let delivered = reg.send("a", BROADCAST, "ping", "hello all").unwrap();
        // Reaches "main" and "b", not "a".
        assert_eq!(delivered, 2);
        assert!(reg.drain("a").is_empty());
        assert_eq!(reg.drain("b").len(), 1);
        assert_eq!(reg.drain(MAIN_RECIPIENT).len(), 1);
    }

    #[test]
    fn remove_destroys_pending_messages() {
        let reg = MailboxRegistry::new();
        reg.create("a");
        reg.send("main", "a", "s", "b").unwrap();
        reg.remove("a");
        assert!(!reg.exists("a"));
        assert!(reg.drain("a").is_empty());
    }
}
