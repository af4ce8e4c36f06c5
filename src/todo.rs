//! Prescribed todo lists and their per-agent trackers.
//!
//! A subagent receives its todo list at spawn time; the index space is fixed
//! at registration and never renumbered. `finish_todo_item` tool calls mark
//! items complete during the loop; the final-report validator audits the
//! reported indices against the prescribed list.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

/// Tracker key for the root agent's shared todo list.
pub const ROOT_TRACKER: &str = "main";

#[derive(Clone, Debug, Serialize)]
pub struct TodoItem {
    /// 1-based index, fixed at registration.
    pub index: usize,
    pub text: String,
    pub completed: bool,
}

/// An ordered todo list with a fixed 1-based index space.
#[derive(Clone, Debug, Default)]
pub struct TodoList {
    items: Vec<TodoItem>,
}

impl TodoList {
    /// Build a list from item texts, trimming and dropping empty entries.
    pub fn new(texts: &[String]) -> Self {
        let items = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(i, text)| TodoItem {
                index: i + 1,
                text: text.to_string(),
                completed: false,
            })
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mark an item complete. Completing an already-complete item is a no-op.
    pub fn finish(&mut self, index: usize) -> Result<(), String> {
        match self.items.iter_mut().find(|i| i.index == index) {
            Some(item) => {
                item.completed = true;
                Ok(())
            }
            None => Err(format!(
                "todo index {index} out of range (list has {} items)",
                self.items.len()
            )),
        }
    }

    /// Append a new item at the next index. Only the root agent's tracker is
    /// offered the authoring tool; subagent lists stay prescribed.
    pub fn add(&mut self, text: impl Into<String>) -> usize {
        let index = self.items.len() + 1;
        self.items.push(TodoItem {
            index,
            text: text.into(),
            completed: false,
        });
        index
    }
}

/// Registry of todo trackers keyed by agent id (plus [`ROOT_TRACKER`]).
///
/// Created empty with a root tracker; subagent trackers are registered at
/// spawn and removed at terminal transition.
pub struct TodoRegistry {
    lists: Mutex<HashMap<String, TodoList>>,
}

impl TodoRegistry {
    pub fn new() -> Self {
        let mut lists = HashMap::new();
        lists.insert(ROOT_TRACKER.to_string(), TodoList::default());
        Self {
            lists: Mutex::new(lists),
        }
    }

    pub fn register(&self, agent_id: &str, texts: &[String]) -> TodoList {
        let list = TodoList::new(texts);
        self.lists
            .lock()
            .unwrap()
            .insert(agent_id.to_string(), list.clone());
        list
    }

    pub fn remove(&self, agent_id: &str) {
        self.lists.lock().unwrap().remove(agent_id);
    }

    /// Resolve the caller's tracker, falling back to the root tracker for
    /// callers without a private list.
    pub fn finish(&self, agent_id: &str, index: usize) -> Result<TodoItem, String> {
        let mut lists = self.lists.lock().unwrap();
        let list = match lists.get_mut(agent_id) {
            Some(list) => list,
            None => lists
                .get_mut(ROOT_TRACKER)
                .ok_or_else(|| "no todo tracker available".to_string())?,
        };
        list.finish(index)?;
        Ok(list
            .items()
            .iter()
            .find(|i| i.index == index)
            .cloned()
            .expect("finished item exists"))
    }

    pub fn add(&self, agent_id: &str, text: &str) -> Result<usize, String> {
        let mut lists = self.lists.lock().unwrap();
        let list = match lists.get_mut(agent_id) {
            Some(list) => list,
            None => lists
                .get_mut(ROOT_TRACKER)
                .ok_or_else(|| "no todo tracker available".to_string())?,
        };
        Ok(list.add(text))
    }

    pub fn snapshot(&self, agent_id: &str) -> Option<Vec<TodoItem>> {
        self.lists
            .lock()
            .unwrap()
            .get(agent_id)
            .map(|l| l.items().to_vec())
    }
}

impl Default for TodoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_list_filters_empty_strings_and_indexes_from_one() {
        let list = TodoList::new(&[
            "find price".to_string(),
            "   ".to_string(),
            "write summary".to_string(),
        ]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.items()[0].index, 1);
        assert_eq!(list.items()[1].index, 2);
        assert_eq!(list.items()[1].text, "write summary");
    }

    #[test]
    fn finish_marks_item_complete() {
        let mut list = TodoList::new(&["a".to_string(), "b".to_string()]);
        list.finish(2).unwrap();
        assert!(!list.items()[0].completed);
        assert!(list.items()[1].completed);
    }

    #[test]
    fn finish_out_of_range_errors() {
        let mut list = TodoList::new(&["a".to_string()]);
        let err = list.finish(3).unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn finish_is_idempotent() {
        let mut list = TodoList::new(&["a".to_string()]);
        list.finish(1).unwrap();
        list.finish(1).unwrap();
        assert!(list.items()[0].completed);
    }

    #[test]
    fn registry_resolves_private_tracker_then_root() {
        let reg = TodoRegistry::new();
        reg.register("agent-1", &["x".to_string()]);
        reg.add(ROOT_TRACKER, "root item").unwrap();

        let item = reg.finish("agent-1", 1).unwrap();
        assert_eq!(item.text, "x");

        // Unknown caller falls back to the root tracker.
        let item = reg.finish("nobody", 1).unwrap();
        assert_eq!(item.text, "root item");
    }

    #[test]
    fn registry_remove_drops_tracker() {
        let reg = TodoRegistry::new();
        reg.register("agent-1", &["x".to_string()]);
        reg.remove("agent-1");
        assert!(reg.snapshot("agent-1").is_none());
    }
}
