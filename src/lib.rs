//! Subagent orchestration core: a per-agent conversation loop, a cross-agent
//! lifecycle manager, a strict-FIFO scheduler guarding a shared VM, and a
//! resilient tool dispatcher.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod llm;
pub mod orchestrator;
pub mod scheduler;
pub mod todo;
pub mod trace;
pub mod vm;
