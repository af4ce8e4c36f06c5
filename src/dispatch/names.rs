//! Canonical tool names and the class membership tables.
//!
//! Routing is purely name-based. Every builtin belongs to exactly one class;
//! anything not in these tables is either an external tool (when a registry
//! claims it) or unknown.

pub const SCREENSHOT: &str = "screenshot";
pub const SHELL_EXEC: &str = "shell_exec";
pub const FILE_READ: &str = "file_read";
pub const FILE_MOVE: &str = "file_move";
pub const MOUSE_MOVE: &str = "mouse_move";
pub const MOUSE_CLICK: &str = "mouse_click";
pub const TYPE_TEXT: &str = "type_text";
pub const KEY_PRESS: &str = "key_press";
pub const SCROLL: &str = "scroll";
pub const ACCESSIBILITY_TREE: &str = "accessibility_tree";
pub const OPEN_APP: &str = "open_app";
pub const OPEN_FILE: &str = "open_file";
pub const OPEN_URL: &str = "open_url";

pub const WEB_SEARCH: &str = "web_search";
pub const WEB_FETCH: &str = "web_fetch";
pub const GEOLOCATE: &str = "geolocate";
pub const GENERATE_IMAGE: &str = "generate_image";

pub const FINISH_TODO: &str = "finish_todo_item";
pub const ADD_TODO: &str = "add_todo_item";
pub const SEND_MESSAGE: &str = "send_message";
pub const SPAWN_SUBAGENT: &str = "spawn_subagent";
pub const AWAIT_SUBAGENT: &str = "await_subagent";
pub const CANCEL_SUBAGENT: &str = "cancel_subagent";
pub const LIST_SUBAGENTS: &str = "list_subagents";

/// Reserved finalization tool. Always offered, never allowlist-gated.
pub const FINAL_REPORT: &str = "submit_final_report";

/// Allowlist wildcard admitting every tool an external registry exposes.
pub const EXTERNAL_WILDCARD: &str = "external:*";

/// Tools that touch the shared VM and must serialize through the scheduler.
pub const VM_TOOLS: &[&str] = &[
    SCREENSHOT,
    SHELL_EXEC,
    FILE_READ,
    FILE_MOVE,
    MOUSE_MOVE,
    MOUSE_CLICK,
    TYPE_TEXT,
    KEY_PRESS,
    SCROLL,
    ACCESSIBILITY_TREE,
    OPEN_APP,
    OPEN_FILE,
    OPEN_URL,
];

/// Tools that run on the host and never queue behind VM work.
pub const HOST_TOOLS: &[&str] = &[WEB_SEARCH, WEB_FETCH, GEOLOCATE, GENERATE_IMAGE];

/// Tools that mutate coordination state (todos, mailboxes, the agent roster).
pub const COORDINATION_TOOLS: &[&str] = &[
    FINISH_TODO,
    ADD_TODO,
    SEND_MESSAGE,
    SPAWN_SUBAGENT,
    AWAIT_SUBAGENT,
    CANCEL_SUBAGENT,
    LIST_SUBAGENTS,
];

pub fn is_vm_tool(name: &str) -> bool {
    VM_TOOLS.contains(&name)
}

pub fn is_host_tool(name: &str) -> bool {
    HOST_TOOLS.contains(&name)
}

pub fn is_coordination_tool(name: &str) -> bool {
    COORDINATION_TOOLS.contains(&name)
}

pub fn is_builtin(name: &str) -> bool {
    is_vm_tool(name) || is_host_tool(name) || is_coordination_tool(name)
}
