use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "conductor", version, about = "Subagent orchestration harness")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a root agent toward a goal
    Run {
        /// The goal to work toward
        #[arg(short, long)]
        goal: String,

        /// Prescribed todo item (repeatable, in order)
        #[arg(short, long = "todo")]
        todo: Vec<String>,

        /// Model name (e.g., "gpt-4o-mini", "claude-3-5-haiku-latest")
        #[arg(short, long)]
        model: Option<String>,

        /// Workspace directory path
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Default subagent timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Restrict the root agent's tools (repeatable)
        #[arg(long = "allow")]
        allow: Vec<String>,

        /// Execution surface: host, vm, or mixed
        #[arg(long, default_value = "mixed")]
        domain: String,
    },
    /// List the builtin tool catalogue
    Tools,
}
