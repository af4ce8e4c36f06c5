use super::schema::{AppConfig, PartialConfig};
use std::path::PathBuf;

impl PartialConfig {
    /// Merge self with a lower-priority fallback. Self's non-None values take
    /// precedence. `search_engines` uses REPLACE semantics: if self has Some,
    /// the fallback list is ignored entirely.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            model: self.model.or(fallback.model),
            workspace: self.workspace.or(fallback.workspace),
            supports_vision: self.supports_vision.or(fallback.supports_vision),
            max_iterations: self.max_iterations.or(fallback.max_iterations),
            agent_timeout_secs: self.agent_timeout_secs.or(fallback.agent_timeout_secs),
            max_subagents: self.max_subagents.or(fallback.max_subagents),
            search_engines: self.search_engines.or(fallback.search_engines),
            brave_api_key: self.brave_api_key.or(fallback.brave_api_key),
            search_rate_limit_secs: self
                .search_rate_limit_secs
                .or(fallback.search_rate_limit_secs),
            shell_timeout_secs: self.shell_timeout_secs.or(fallback.shell_timeout_secs),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        AppConfig {
            model: self.model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            workspace: self
                .workspace
                .unwrap_or_else(|| PathBuf::from("./workspace")),
            supports_vision: self.supports_vision.unwrap_or(true),
            max_iterations: self.max_iterations.unwrap_or(50),
            agent_timeout_secs: self.agent_timeout_secs,
            max_subagents: self.max_subagents.unwrap_or(8),
            search_engines: self
                .search_engines
                .unwrap_or_else(|| vec!["duckduckgo".to_string()]),
            brave_api_key: self.brave_api_key,
            search_rate_limit_secs: self.search_rate_limit_secs.unwrap_or(1.0),
            shell_timeout_secs: self.shell_timeout_secs.unwrap_or(120),
        }
    }
}
