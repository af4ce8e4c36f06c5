//! Typed argument decoding for builtin tools.
//!
//! Every handler decodes its JSON arguments into a schema-matching struct
//! before touching any backend. Unknown and missing fields fail the decode
//! (`deny_unknown_fields`), except where a field has a documented default.

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Decode a tool's arguments, rendering failures as the corrective text the
/// model sees.
pub fn decode<T: DeserializeOwned>(tool: &str, arguments: &serde_json::Value) -> Result<T, String> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| format!("{tool}: invalid arguments: {e}"))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellExecArgs {
    pub command: String,
    /// Default: the configured shell timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileReadArgs {
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileMoveArgs {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MouseMoveArgs {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MouseClickArgs {
    pub x: i32,
    pub y: i32,
    /// Default: "left".
    #[serde(default = "default_button")]
    pub button: String,
}

fn default_button() -> String {
    "left".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeTextArgs {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyPressArgs {
    pub keys: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrollArgs {
    pub x: i32,
    pub y: i32,
    pub delta_y: i32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAppArgs {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenFileArgs {
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenUrlArgs {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebSearchArgs {
    pub query: String,
    /// Restrict results to one site, e.g. "docs.rs".
    #[serde(default)]
    pub site: Option<String>,
    /// Default: 5 results.
    #[serde(default = "default_search_count")]
    pub count: usize,
}

fn default_search_count() -> usize {
    5
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebFetchArgs {
    pub url: String,
    /// Default: "markdown".
    #[serde(default = "default_fetch_format")]
    pub format: String,
    #[serde(default)]
    pub max_length: Option<usize>,
}

fn default_fetch_format() -> String {
    "markdown".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateImageArgs {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinishTodoArgs {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddTodoArgs {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageArgs {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpawnSubagentArgs {
    pub goal: String,
    /// Default: "mixed".
    #[serde(default)]
    pub domain: crate::orchestrator::handle::Domain,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub todo_items: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwaitSubagentArgs {
    pub id: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelSubagentArgs {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_accepts_valid_arguments() {
        let args: ShellExecArgs =
            decode("shell_exec", &json!({"command": "ls"})).unwrap();
        assert_eq!(args.command, "ls");
        assert!(args.timeout_secs.is_none());
    }

    #[test]
    fn decode_rejects_missing_required_field() {
        let err = decode::<ShellExecArgs>("shell_exec", &json!({})).unwrap_err();
        assert!(err.contains("shell_exec"));
        assert!(err.contains("command"));
    }

    #[test]
    fn decode_rejects_unknown_fields() {
        let err =
            decode::<FileReadArgs>("file_read", &json!({"path": "a", "mode": "rw"})).unwrap_err();
        assert!(err.contains("mode"));
    }

    #[test]
    fn documented_defaults_apply() {
        let click: MouseClickArgs = decode("mouse_click", &json!({"x": 1, "y": 2})).unwrap();
        assert_eq!(click.button, "left");

        let search: WebSearchArgs = decode("web_search", &json!({"query": "q"})).unwrap();
        assert_eq!(search.count, 5);
        assert!(search.site.is_none());

        let fetch: WebFetchArgs = decode("web_fetch", &json!({"url": "https://x"})).unwrap();
        assert_eq!(fetch.format, "markdown");
    }

    #[test]
    fn spawn_args_default_domain_is_mixed() {
        let args: SpawnSubagentArgs =
            decode("spawn_subagent", &json!({"goal": "do a thing"})).unwrap();
        assert_eq!(args.domain, crate::orchestrator::handle::Domain::Mixed);
        assert!(args.todo_items.is_empty());
    }
}
