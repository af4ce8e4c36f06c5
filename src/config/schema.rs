use serde::Deserialize;
use std::path::PathBuf;

/// The TOML file structure for conductor.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub agent: Option<AgentConfig>,
    pub search: Option<SearchFileConfig>,
    pub vm: Option<VmConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub model: Option<String>,
    pub workspace: Option<String>,
    pub supports_vision: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub max_iterations: Option<u32>,
    /// Default wall-clock deadline for spawned subagents, in seconds.
    pub timeout_secs: Option<u64>,
    pub max_subagents: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchFileConfig {
    /// Engine names in priority order: "duckduckgo", "brave".
    pub engines: Option<Vec<String>>,
    pub brave_api_key: Option<String>,
    pub rate_limit_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct VmConfig {
    pub shell_timeout_secs: Option<u64>,
}

impl ConfigFile {
    pub fn to_partial(self) -> PartialConfig {
        let general = self.general;
        let agent = self.agent;
        let search = self.search;
        let vm = self.vm;
        PartialConfig {
            model: general.as_ref().and_then(|g| g.model.clone()),
            workspace: general
                .as_ref()
                .and_then(|g| g.workspace.as_ref().map(PathBuf::from)),
            supports_vision: general.as_ref().and_then(|g| g.supports_vision),
            max_iterations: agent.as_ref().and_then(|a| a.max_iterations),
            agent_timeout_secs: agent.as_ref().and_then(|a| a.timeout_secs),
            max_subagents: agent.as_ref().and_then(|a| a.max_subagents),
            search_engines: search.as_ref().and_then(|s| s.engines.clone()),
            brave_api_key: search.as_ref().and_then(|s| s.brave_api_key.clone()),
            search_rate_limit_secs: search.as_ref().and_then(|s| s.rate_limit_secs),
            shell_timeout_secs: vm.as_ref().and_then(|v| v.shell_timeout_secs),
        }
    }
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub workspace: PathBuf,
    pub supports_vision: bool,
    pub max_iterations: u32,
    pub agent_timeout_secs: Option<u64>,
    pub max_subagents: usize,
    pub search_engines: Vec<String>,
    pub brave_api_key: Option<String>,
    pub search_rate_limit_secs: f64,
    pub shell_timeout_secs: u64,
}

/// Partial config used during merge. All fields are Option so that missing
/// fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub model: Option<String>,
    pub workspace: Option<PathBuf>,
    pub supports_vision: Option<bool>,
    pub max_iterations: Option<u32>,
    pub agent_timeout_secs: Option<u64>,
    pub max_subagents: Option<usize>,
    pub search_engines: Option<Vec<String>>,
    pub brave_api_key: Option<String>,
    pub search_rate_limit_secs: Option<f64>,
    pub shell_timeout_secs: Option<u64>,
}
