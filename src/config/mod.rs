pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::dispatch::web_search::{SearchConfig, SearchEngine};
use crate::engine::EngineConfig;
use crate::orchestrator::OrchestratorConfig;
use anyhow::Context;
use std::path::Path;

/// Load configuration by merging global, workspace, and CLI sources.
/// Precedence: CLI > workspace config > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/conductor/conductor.toml or platform
    // equivalent)
    let global = load_global_config();

    // Determine workspace path from CLI or global config, for loading the
    // workspace config.
    let workspace_path = cli_workspace(cli)
        .or_else(|| global.workspace.clone())
        .unwrap_or_else(|| std::path::PathBuf::from("./workspace"));

    // Layer 2: Workspace config (workspace/conductor.toml)
    let workspace = load_workspace_config(&workspace_path);

    // Layer 3: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli);

    let config = cli_partial
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

fn load_global_config() -> PartialConfig {
    let path = global_config_path();
    match path {
        Some(p) => load_toml_file(&p).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

fn load_workspace_config(workspace_path: &Path) -> PartialConfig {
    let config_path = workspace_path.join("conductor.toml");
    load_toml_file(&config_path).unwrap_or_default()
}

/// Load and parse a TOML config file into a PartialConfig. Returns None on
/// file-not-found; parse errors are logged and also yield None.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            match toml::from_str::<ConfigFile>(&contents)
                .context(format!("Failed to parse {}", path.display()))
            {
                Ok(config_file) => {
                    tracing::info!("Loaded config from {}", path.display());
                    Some(config_file.to_partial())
                }
                Err(e) => {
                    tracing::warn!("Config parse error: {:#}", e);
                    None
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Linux: ~/.config/conductor/conductor.toml
/// macOS: ~/Library/Application Support/conductor/conductor.toml
fn global_config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "conductor")
        .map(|dirs| dirs.config_dir().join("conductor.toml"))
}

fn cli_workspace(cli: &Cli) -> Option<std::path::PathBuf> {
    match &cli.command {
        Commands::Run { workspace, .. } => workspace.clone(),
        Commands::Tools => None,
    }
}

fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Run {
            model,
            workspace,
            timeout,
            ..
        } => PartialConfig {
            model: model.clone(),
            workspace: workspace.clone(),
            agent_timeout_secs: *timeout,
            ..Default::default()
        },
        Commands::Tools => PartialConfig::default(),
    }
}

impl AppConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_iterations: self.max_iterations,
            ..EngineConfig::default()
        }
    }

    /// Resolve the configured engine names into search backends. Brave is
    /// skipped with a warning when no API key is configured.
    pub fn search_config(&self) -> SearchConfig {
        let mut engines = Vec::new();
        for name in &self.search_engines {
            match name.to_ascii_lowercase().as_str() {
                "duckduckgo" | "ddg" => engines.push(SearchEngine::DuckDuckGo),
                "brave" => match &self.brave_api_key {
                    Some(key) => engines.push(SearchEngine::Brave {
                        api_key: key.clone(),
                    }),
                    None => {
                        tracing::warn!("search engine 'brave' configured without an API key, skipping")
                    }
                },
                other => tracing::warn!("unknown search engine '{other}', skipping"),
            }
        }
        if engines.is_empty() {
            engines.push(SearchEngine::DuckDuckGo);
        }
        SearchConfig {
            engines,
            rate_limit_secs: self.search_rate_limit_secs,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            trace_dir: self.workspace.join("traces"),
            max_subagents: self.max_subagents,
            default_timeout_secs: self.agent_timeout_secs,
            shell_timeout_secs: self.shell_timeout_secs,
            supports_vision: self.supports_vision,
            engine: self.engine_config(),
            search: self.search_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_sections_map_into_the_partial() {
        let file: ConfigFile = toml::from_str(
            r#"
            [general]
            model = "test-model"
            workspace = "/tmp/w"

            [agent]
            max_iterations = 10
            max_subagents = 2

            [search]
            engines = ["brave", "duckduckgo"]
            brave_api_key = "k"

            [vm]
            shell_timeout_secs = 15
            "#,
        )
        .unwrap();
        let partial = file.to_partial();
        assert_eq!(partial.model.as_deref(), Some("test-model"));
        assert_eq!(partial.max_iterations, Some(10));
        assert_eq!(partial.max_subagents, Some(2));
        assert_eq!(partial.shell_timeout_secs, Some(15));

        let config = partial.finalize();
        assert_eq!(config.search_config().engines.len(), 2);
        assert_eq!(config.orchestrator_config().max_subagents, 2);
    }

    #[test]
    fn brave_without_key_is_skipped() {
        let config = PartialConfig {
            search_engines: Some(vec!["brave".to_string()]),
            ..Default::default()
        }
        .finalize();
        // Falls back to the default engine rather than an empty list.
        let search = config.search_config();
        assert_eq!(search.engines.len(), 1);
        assert!(matches!(search.engines[0], SearchEngine::DuckDuckGo));
    }
}
