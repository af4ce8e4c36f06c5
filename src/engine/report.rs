//! Final-report payload decoding and todo auditing.
//!
//! The finalization tool is intercepted by the engine before dispatch; its
//! payload is validated here against the agent's prescribed todo list. A
//! decode or audit failure produces corrective text that goes back into the
//! conversation instead of terminating the loop.

use serde::Deserialize;

use crate::todo::TodoItem;

/// The model's claimed outcome. Anything other than a recognized success or
/// failure spelling is a decode error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportedStatus {
    Success,
    Failed,
}

impl ReportedStatus {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" | "completed" => Ok(Self::Success),
            "failed" | "failure" => Ok(Self::Failed),
            other => Err(format!(
                "unrecognized status '{other}' (expected \"success\" or \"failed\")"
            )),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReportedTodo {
    pub index: usize,
    pub completed: bool,
}

/// Raw finalization payload as the model submits it.
#[derive(Clone, Debug, Deserialize)]
pub struct FinalReportPayload {
    pub status: String,
    #[serde(default)]
    pub todo_items: Vec<ReportedTodo>,
    pub report: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl FinalReportPayload {
    pub fn decode(arguments: &serde_json::Value) -> Result<Self, String> {
        let payload: Self = serde_json::from_value(arguments.clone())
            .map_err(|e| format!("invalid final report payload: {e}"))?;
        // Validate the status spelling up front so a bad value is caught at
        // decode time, not after the audit.
        ReportedStatus::parse(&payload.status)?;
        Ok(payload)
    }

    pub fn status(&self) -> ReportedStatus {
        // Checked in decode().
        ReportedStatus::parse(&self.status).unwrap_or(ReportedStatus::Failed)
    }
}

/// Discrepancies between the prescribed todo list and a reported payload.
#[derive(Clone, Debug, Default)]
pub struct TodoAudit {
    /// Prescribed indices the payload never mentioned.
    pub missing: Vec<usize>,
    /// Prescribed indices the payload reported incomplete.
    pub incomplete: Vec<usize>,
}

impl TodoAudit {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.incomplete.is_empty()
    }

    /// Union of problem indices, ordered.
    pub fn problem_indices(&self) -> Vec<usize> {
        let mut all: Vec<usize> = self
            .missing
            .iter()
            .chain(self.incomplete.iter())
            .copied()
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }
}

/// Check every prescribed item against the payload. Extra reported indices
/// that were never prescribed are ignored.
pub fn audit_todos(prescribed: &[TodoItem], payload: &FinalReportPayload) -> TodoAudit {
    let mut audit = TodoAudit::default();
    for item in prescribed {
        match payload
            .todo_items
            .iter()
            .find(|reported| reported.index == item.index)
        {
            None => audit.missing.push(item.index),
            Some(reported) if !reported.completed => audit.incomplete.push(item.index),
            Some(_) => {}
        }
    }
    audit
}

/// Corrective message sent back when the audit finds problems, naming each
/// offending item as `#index: text`.
pub fn correction_message(prescribed: &[TodoItem], audit: &TodoAudit) -> String {
    let name = |index: usize| -> String {
        prescribed
            .iter()
            .find(|i| i.index == index)
            .map(|i| format!("#{}: {}", i.index, i.text))
            .unwrap_or_else(|| format!("#{index}"))
    };

    let mut lines = vec![
        "Your final report was not accepted. Fix the todo accounting and call \
         submit_final_report again."
            .to_string(),
    ];
    if !audit.missing.is_empty() {
        lines.push(format!(
            "Items missing from the report: {}",
            audit
                .missing
                .iter()
                .map(|i| name(*i))
                .collect::<Vec<_>>()
                .join("; ")
        ));
    }
    if !audit.incomplete.is_empty() {
        lines.push(format!(
            "Items reported incomplete: {}. Finish them, or report status \
             \"failed\" with a failure_reason explaining why they cannot be done.",
            audit
                .incomplete
                .iter()
                .map(|i| name(*i))
                .collect::<Vec<_>>()
                .join("; ")
        ));
    }
    lines.join("\n")
}

/// A complete, literal payload the model can copy verbatim. Used by the last
/// forced-finalization attempt, which leaves nothing to compose.
pub fn suggested_payload(prescribed: &[TodoItem], best_text: Option<&str>) -> serde_json::Value {
    let todo_items: Vec<serde_json::Value> = prescribed
        .iter()
        .map(|item| {
            serde_json::json!({
                "index": item.index,
                "completed": item.completed,
            })
        })
        .collect();
    let all_done = prescribed.iter().all(|i| i.completed);
    serde_json::json!({
        "status": if all_done { "success" } else { "failed" },
        "todo_items": todo_items,
        "report": best_text.unwrap_or("Work ended without a composed report."),
        "failure_reason": if all_done {
            serde_json::Value::Null
        } else {
            serde_json::Value::String("Not all todo items were completed.".to_string())
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prescribed() -> Vec<TodoItem> {
        vec![
            TodoItem {
                index: 1,
                text: "find the price".to_string(),
                completed: true,
            },
            TodoItem {
                index: 2,
                text: "write the summary".to_string(),
                completed: false,
            },
        ]
    }

    #[test]
    fn decode_accepts_a_well_formed_payload() {
        let payload = FinalReportPayload::decode(&json!({
            "status": "success",
            "todo_items": [{"index": 1, "completed": true}],
            "report": "done",
        }))
        .unwrap();
        assert_eq!(payload.status(), ReportedStatus::Success);
        assert_eq!(payload.todo_items.len(), 1);
    }

    #[test]
    fn decode_rejects_unknown_status_spelling() {
        let err = FinalReportPayload::decode(&json!({
            "status": "mostly-done",
            "todo_items": [],
            "report": "eh",
        }))
        .unwrap_err();
        assert!(err.contains("mostly-done"));
    }

    #[test]
    fn decode_rejects_missing_report() {
        let err = FinalReportPayload::decode(&json!({
            "status": "success",
            "todo_items": [],
        }))
        .unwrap_err();
        assert!(err.contains("report"));
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(ReportedStatus::parse("SUCCESS").unwrap(), ReportedStatus::Success);
        assert_eq!(ReportedStatus::parse("Failure").unwrap(), ReportedStatus::Failed);
    }

    #[test]
    fn audit_flags_missing_and_incomplete_items() {
        let payload = FinalReportPayload::decode(&json!({
            "status": "success",
            "todo_items": [{"index": 2, "completed": false}],
            "report": "partial",
        }))
        .unwrap();
        let audit = audit_todos(&prescribed(), &payload);
        assert_eq!(audit.missing, vec![1]);
        assert_eq!(audit.incomplete, vec![2]);
        assert!(!audit.is_clean());
        assert_eq!(audit.problem_indices(), vec![1, 2]);
    }

    #[test]
    fn audit_ignores_unprescribed_indices() {
        let payload = FinalReportPayload::decode(&json!({
            "status": "success",
            "todo_items": [
                {"index": 1, "completed": true},
                {"index": 2, "completed": true},
                {"index": 99, "completed": false},
            ],
            "report": "done",
        }))
        .unwrap();
        assert!(audit_todos(&prescribed(), &payload).is_clean());
    }

    #[test]
    fn correction_names_items_by_index_and_text() {
        let audit = TodoAudit {
            missing: vec![1],
            incomplete: vec![2],
        };
        let msg = correction_message(&prescribed(), &audit);
        assert!(msg.contains("#1: find the price"));
        assert!(msg.contains("#2: write the summary"));
    }

    #[test]
    fn suggested_payload_reflects_tracker_state() {
        let suggestion = suggested_payload(&prescribed(), Some("best effort text"));
        assert_eq!(suggestion["status"], "failed");
        assert_eq!(suggestion["report"], "best effort text");
        assert_eq!(suggestion["todo_items"][0]["completed"], true);
        assert_eq!(suggestion["todo_items"][1]["completed"], false);

        let done: Vec<TodoItem> = prescribed()
            .into_iter()
            .map(|mut i| {
                i.completed = true;
                i
            })
            .collect();
        let suggestion = suggested_payload(&done, None);
        assert_eq!(suggestion["status"], "success");
        assert!(suggestion["failure_reason"].is_null());
    }
}
