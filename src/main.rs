use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;

use conductor::cli::{Cli, Commands};
use conductor::config;
use conductor::dispatch::specs::builtin_specs;
use conductor::engine::RunStatus;
use conductor::event::StatePublisher;
use conductor::llm::genai_client::GenaiClient;
use conductor::orchestrator::handle::Domain;
use conductor::orchestrator::SubagentOrchestrator;
use conductor::vm::local::LocalVm;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli)?;

    match cli.command {
        Commands::Run {
            goal,
            todo,
            allow,
            domain,
            ..
        } => {
            tracing::info!(
                model = %config.model,
                workspace = %config.workspace.display(),
                "conductor starting"
            );

            let domain = Domain::from_str(&domain).map_err(anyhow::Error::msg)?;
            let vm = Arc::new(LocalVm::new(config.workspace.join("vm"))?);
            let llm = Arc::new(GenaiClient::new(&config.model));

            let orchestrator = SubagentOrchestrator::new(
                vm,
                llm,
                config.orchestrator_config(),
                StatePublisher::disabled(),
                None,
                None,
            );

            let allowlist = if allow.is_empty() { None } else { Some(allow) };
            let outcome = tokio::select! {
                outcome = orchestrator.run_main(&goal, domain, allowlist, &todo) => {
                    outcome.map_err(anyhow::Error::msg)?
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, shutting down");
                    orchestrator.shutdown().await;
                    return Ok(());
                }
            };
            orchestrator.shutdown().await;

            println!("status: {}", outcome.status.as_str());
            println!("{}", outcome.summary);
            if let Some(reason) = &outcome.failure_reason {
                println!("reason: {reason}");
            }
            if outcome.status == RunStatus::Failed {
                std::process::exit(1);
            }
        }
        Commands::Tools => {
            for spec in builtin_specs() {
                println!("{:<22} {}", spec.name, spec.description);
            }
        }
    }

    Ok(())
}
