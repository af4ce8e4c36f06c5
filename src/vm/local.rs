//! Host-local [`VmConnection`] backend.
//!
//! Runs shell commands on the host via `sh -c` with a working-directory root
//! and timeout enforcement, and serves file reads from the local filesystem.
//! Desktop primitives (screenshot, mouse/keyboard, app launching) report
//! `Unsupported` -- this backend exists so the binary has a usable execution
//! surface without a real VM attached.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tokio::process::Command;

use super::{FileContent, MouseButton, Screenshot, ShellOutput, VmConnection};
use crate::error::VmError;

pub struct LocalVm {
    root: PathBuf,
}

impl LocalVm {
    /// Create a backend rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, VmError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    fn unsupported(op: &str) -> VmError {
        VmError::Unsupported(format!("{op} requires a desktop VM guest"))
    }
}

/// Map a file extension to an image MIME type, if it is one we pass through
/// as base64 rather than text.
fn image_mime_for(path: &Path) -> Option<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => Some("image/png"),
        Some("jpg") | Some("jpeg") => Some("image/jpeg"),
        Some("gif") => Some("image/gif"),
        Some("webp") => Some("image/webp"),
        _ => None,
    }
}

#[async_trait]
impl VmConnection for LocalVm {
    async fn shell_exec(&self, command: &str, timeout_secs: u64) -> Result<ShellOutput, VmError> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VmError::Transport(format!("failed to spawn shell: {e}")))?;

        match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
            .await
        {
            Ok(Ok(output)) => Ok(ShellOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                timed_out: false,
            }),
            Ok(Err(e)) => Err(VmError::Transport(format!("shell wait failed: {e}"))),
            Err(_) => Ok(ShellOutput {
                stdout: String::new(),
                stderr: format!("command timed out after {timeout_secs}s"),
                exit_code: None,
                timed_out: true,
            }),
        }
    }

    async fn read_file(&self, path: &str) -> Result<FileContent, VmError> {
        let full = self.resolve(path);
        if let Some(mime) = image_mime_for(&full) {
            let bytes = tokio::fs::read(&full).await?;
            return Ok(FileContent::Image {
                base64: base64::engine::general_purpose::STANDARD.encode(bytes),
                mime_type: mime.to_string(),
                // Dimensions need image decoding; the local backend does not.
                dimensions: None,
            });
        }
        let text = tokio::fs::read_to_string(&full).await?;
        Ok(FileContent::Text(text))
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<(), VmError> {
        let to = self.resolve(to);
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(self.resolve(from), to).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Screenshot, VmError> {
        Err(Self::unsupported("screenshot"))
    }

    async fn mouse_move(&self, _x: i32, _y: i32) -> Result<(), VmError> {
        Err(Self::unsupported("mouse_move"))
    }

    async fn mouse_click(&self, _x: i32, _y: i32, _button: MouseButton) -> Result<(), VmError> {
        Err(Self::unsupported("mouse_click"))
    }

    async fn type_text(&self, _text: &str) -> Result<(), VmError> {
        Err(Self::unsupported("type_text"))
    }

    async fn key_press(&self, _combo: &str) -> Result<(), VmError> {
        Err(Self::unsupported("key_press"))
    }

    async fn scroll(&self, _x: i32, _y: i32, _delta_y: i32) -> Result<(), VmError> {
        Err(Self::unsupported("scroll"))
    }

    async fn accessibility_tree(&self) -> Result<String, VmError> {
        Err(Self::unsupported("accessibility_tree"))
    }

    async fn open_app(&self, _name: &str) -> Result<(), VmError> {
        Err(Self::unsupported("open_app"))
    }

    async fn open_file(&self, _path: &str) -> Result<(), VmError> {
        Err(Self::unsupported("open_file"))
    }

    async fn open_url(&self, _url: &str) -> Result<(), VmError> {
        Err(Self::unsupported("open_url"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_vm() -> (LocalVm, TempDir) {
        let tmp = TempDir::new().unwrap();
        let vm = LocalVm::new(tmp.path().join("guest")).unwrap();
        (vm, tmp)
    }

    #[tokio::test]
    async fn shell_exec_captures_stdout_and_exit_code() {
        let (vm, _tmp) = make_vm();
        let out = vm.shell_exec("echo hello", 10).await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, Some(0));
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn shell_exec_reports_timeout() {
        let (vm, _tmp) = make_vm();
        let out = vm.shell_exec("sleep 5", 1).await.unwrap();
        assert!(out.timed_out);
        assert!(out.exit_code.is_none());
    }

    #[tokio::test]
    async fn read_file_returns_text() {
        let (vm, _tmp) = make_vm();
        std::fs::write(vm.root().join("note.txt"), "contents").unwrap();
        match vm.read_file("note.txt").await.unwrap() {
            FileContent::Text(t) => assert_eq!(t, "contents"),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_file_encodes_images_as_base64() {
        let (vm, _tmp) = make_vm();
        std::fs::write(vm.root().join("pic.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        match vm.read_file("pic.png").await.unwrap() {
            FileContent::Image { mime_type, base64, .. } => {
                assert_eq!(mime_type, "image/png");
                assert!(!base64.is_empty());
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn move_file_relocates_within_root() {
        let (vm, _tmp) = make_vm();
        std::fs::write(vm.root().join("a.txt"), "x").unwrap();
        vm.move_file("a.txt", "sub/b.txt").await.unwrap();
        assert!(!vm.root().join("a.txt").exists());
        assert_eq!(
            std::fs::read_to_string(vm.root().join("sub/b.txt")).unwrap(),
            "x"
        );
    }

    #[tokio::test]
    async fn desktop_primitives_are_unsupported() {
        let (vm, _tmp) = make_vm();
        assert!(matches!(
            vm.screenshot().await,
            Err(VmError::Unsupported(_))
        ));
        assert!(matches!(
            vm.type_text("hi").await,
            Err(VmError::Unsupported(_))
        ));
    }
}
