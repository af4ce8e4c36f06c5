//! VM guest connection seam.
//!
//! The orchestration core drives one shared VM through this narrow
//! request/response trait. The transport behind it (RPC, local process, test
//! double) is the implementation's concern. Because the VM has no internal
//! locking, every call that mutates or observes it must be routed through the
//! [`crate::scheduler::ToolCallScheduler`] -- the trait itself is
//! serialization-agnostic.

pub mod local;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::VmError;

/// Result of a shell command executed inside the VM.
#[derive(Debug, Clone, Serialize)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Contents of a file read from the VM: text, or a base64 image with
/// dimensions when the guest can report them.
#[derive(Debug, Clone)]
pub enum FileContent {
    Text(String),
    Image {
        base64: String,
        mime_type: String,
        dimensions: Option<(u32, u32)>,
    },
}

/// A captured screen image.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub base64_png: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl std::str::FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other => Err(format!("unknown mouse button '{other}'")),
        }
    }
}

/// Request/response operations against the shared VM guest.
#[async_trait]
pub trait VmConnection: Send + Sync {
    async fn shell_exec(&self, command: &str, timeout_secs: u64) -> Result<ShellOutput, VmError>;

    async fn read_file(&self, path: &str) -> Result<FileContent, VmError>;

    async fn move_file(&self, from: &str, to: &str) -> Result<(), VmError>;

    async fn screenshot(&self) -> Result<Screenshot, VmError>;

    async fn mouse_move(&self, x: i32, y: i32) -> Result<(), VmError>;

    async fn mouse_click(&self, x: i32, y: i32, button: MouseButton) -> Result<(), VmError>;

    async fn type_text(&self, text: &str) -> Result<(), VmError>;

    /// Press a key or chord, e.g. `"Return"` or `"ctrl+c"`.
    async fn key_press(&self, combo: &str) -> Result<(), VmError>;

    async fn scroll(&self, x: i32, y: i32, delta_y: i32) -> Result<(), VmError>;

    /// Serialized accessibility tree of the foreground UI.
    async fn accessibility_tree(&self) -> Result<String, VmError>;

    async fn open_app(&self, name: &str) -> Result<(), VmError>;

    async fn open_file(&self, path: &str) -> Result<(), VmError>;

    async fn open_url(&self, url: &str) -> Result<(), VmError>;
}
