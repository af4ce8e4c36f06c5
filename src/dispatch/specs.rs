//! Tool schemas for the builtin catalogue.
//!
//! The engine offers a subagent the subset of these matching its allowlist,
//! plus the reserved finalization tool, which is always present.

use serde_json::json;

use crate::llm::ToolSpec;

use super::names::*;

/// Schema for the reserved finalization tool.
pub fn final_report_spec() -> ToolSpec {
    ToolSpec::new(
        FINAL_REPORT,
        "Submit your final report and end the session. You MUST call this \
         exactly once when your work is done (or cannot be completed). \
         Include every prescribed todo item with its completion state.",
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "\"success\" if the goal was accomplished, otherwise \"failed\""
                },
                "todo_items": {
                    "type": "array",
                    "description": "One entry per prescribed todo item",
                    "items": {
                        "type": "object",
                        "properties": {
                            "index": {"type": "integer", "description": "1-based todo index"},
                            "completed": {"type": "boolean"}
                        },
                        "required": ["index", "completed"]
                    }
                },
                "report": {
                    "type": "string",
                    "description": "What was accomplished, with concrete findings"
                },
                "failure_reason": {
                    "type": "string",
                    "description": "Why the goal was not accomplished (when status is failed)"
                }
            },
            "required": ["status", "todo_items", "report"]
        }),
    )
}

/// The full builtin tool catalogue, finalization tool excluded.
pub fn builtin_specs() -> Vec<ToolSpec> {
    vec![
        // -- VM-bound ------------------------------------------------------
        ToolSpec::new(
            SCREENSHOT,
            "Capture a screenshot of the VM display. Returns the image, or a \
             description when the model has no vision support.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolSpec::new(
            SHELL_EXEC,
            "Execute a shell command inside the VM. Returns JSON with stdout, \
             stderr, exit_code, and timed_out fields.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The shell command to execute"},
                    "timeout_secs": {"type": "integer", "description": "Optional timeout override in seconds"}
                },
                "required": ["command"]
            }),
        ),
        ToolSpec::new(
            FILE_READ,
            "Read a file from the VM. Text files return their contents; image \
             files return the image.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path, absolute or relative to the VM home"}
                },
                "required": ["path"]
            }),
        ),
        ToolSpec::new(
            FILE_MOVE,
            "Move or rename a file inside the VM.",
            json!({
                "type": "object",
                "properties": {
                    "from": {"type": "string"},
                    "to": {"type": "string"}
                },
                "required": ["from", "to"]
            }),
        ),
        ToolSpec::new(
            MOUSE_MOVE,
            "Move the VM mouse cursor to absolute screen coordinates.",
            json!({
                "type": "object",
                "properties": {
                    "x": {"type": "integer"},
                    "y": {"type": "integer"}
                },
                "required": ["x", "y"]
            }),
        ),
        ToolSpec::new(
            MOUSE_CLICK,
            "Click at absolute screen coordinates in the VM.",
            json!({
                "type": "object",
                "properties": {
                    "x": {"type": "integer"},
                    "y": {"type": "integer"},
                    "button": {"type": "string", "description": "left (default), right, or middle"}
                },
                "required": ["x", "y"]
            }),
        ),
        ToolSpec::new(
            TYPE_TEXT,
            "Type text into the VM's focused element.",
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"}
                },
                "required": ["text"]
            }),
        ),
        ToolSpec::new(
            KEY_PRESS,
            "Press a key or key chord in the VM, e.g. \"Return\" or \"ctrl+c\".",
            json!({
                "type": "object",
                "properties": {
                    "keys": {"type": "string"}
                },
                "required": ["keys"]
            }),
        ),
        ToolSpec::new(
            SCROLL,
            "Scroll at a position in the VM. Positive delta_y scrolls down.",
            json!({
                "type": "object",
                "properties": {
                    "x": {"type": "integer"},
                    "y": {"type": "integer"},
                    "delta_y": {"type": "integer"}
                },
                "required": ["x", "y", "delta_y"]
            }),
        ),
        ToolSpec::new(
            ACCESSIBILITY_TREE,
            "Dump the accessibility tree of the VM's foreground UI as text.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolSpec::new(
            OPEN_APP,
            "Launch an application in the VM by name.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"}
                },
                "required": ["name"]
            }),
        ),
        ToolSpec::new(
            OPEN_FILE,
            "Open a file in the VM with its default application.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"}
                },
                "required": ["path"]
            }),
        ),
        ToolSpec::new(
            OPEN_URL,
            "Open a URL in the VM's default browser.",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"}
                },
                "required": ["url"]
            }),
        ),
        // -- Host-bound ----------------------------------------------------
        ToolSpec::new(
            WEB_SEARCH,
            "Search the web. Falls back across engines, drops the site filter, \
             and simplifies the query automatically when results are empty.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "site": {"type": "string", "description": "Optional site filter, e.g. \"docs.rs\""},
                    "count": {"type": "integer", "description": "Maximum results (default 5)"}
                },
                "required": ["query"]
            }),
        ),
        ToolSpec::new(
            WEB_FETCH,
            "Fetch a web page and return its content as markdown.",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "format": {"type": "string", "description": "markdown (default) or html"},
                    "max_length": {"type": "integer", "description": "Truncate content to this many characters"}
                },
                "required": ["url"]
            }),
        ),
        ToolSpec::new(
            GEOLOCATE,
            "Approximate the host's geographic location from its public IP.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolSpec::new(
            GENERATE_IMAGE,
            "Generate an image from a text prompt.",
            json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string"}
                },
                "required": ["prompt"]
            }),
        ),
        // -- Coordination --------------------------------------------------
        ToolSpec::new(
            FINISH_TODO,
            "Mark a todo item complete by its 1-based index.",
            json!({
                "type": "object",
                "properties": {
                    "index": {"type": "integer"}
                },
                "required": ["index"]
            }),
        ),
        ToolSpec::new(
            ADD_TODO,
            "Append a new item to the todo list.",
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"}
                },
                "required": ["text"]
            }),
        ),
        ToolSpec::new(
            SEND_MESSAGE,
            "Send a message to another agent. Use to=\"main\" for the parent, \
             an agent id for one subagent, or to=\"broadcast\" for everyone \
             else.",
            json!({
                "type": "object",
                "properties": {
                    "to": {"type": "string"},
                    "subject": {"type": "string"},
                    "body": {"type": "string"}
                },
                "required": ["to", "subject", "body"]
            }),
        ),
        ToolSpec::new(
            SPAWN_SUBAGENT,
            "Spawn a new subagent with a goal and an optional todo list. \
             Returns the new agent's id.",
            json!({
                "type": "object",
                "properties": {
                    "goal": {"type": "string"},
                    "domain": {"type": "string", "description": "host, vm, or mixed (default)"},
                    "tools": {"type": "array", "items": {"type": "string"}, "description": "Tool allowlist; omit for all tools"},
                    "todo_items": {"type": "array", "items": {"type": "string"}},
                    "timeout_secs": {"type": "integer"},
                    "model": {"type": "string", "description": "Model override"},
                    "purpose": {"type": "string"}
                },
                "required": ["goal"]
            }),
        ),
        ToolSpec::new(
            AWAIT_SUBAGENT,
            "Wait for a subagent to finish and return its result.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "timeout_secs": {"type": "integer"}
                },
                "required": ["id"]
            }),
        ),
        ToolSpec::new(
            CANCEL_SUBAGENT,
            "Cancel a running subagent.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"}
                },
                "required": ["id"]
            }),
        ),
        ToolSpec::new(
            LIST_SUBAGENTS,
            "List all subagents and their statuses.",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}
