//! Executor trait - the external collaborator interface
//!
//! Cedar never interprets task payloads; it hands them to an `Executor`
//! registered for the agent's type. Implementations typically wrap an LLM
//! call, retrieval pipeline, or business logic.

use async_trait::async_trait;
use cedar_types::{AgentInstance, Result, TaskEnvelope};

/// Task execution logic for one agent type.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Agent-specific setup, run on deploy and on in-place restart.
    ///
    /// The fleet manager bounds this call with `agent_startup_timeout`;
    /// a failure leaves the agent in `Error` status for diagnosis.
    async fn initialize(&self, _agent: &AgentInstance) -> Result<()> {
        Ok(())
    }

    /// Execute one task and return its result payload.
    ///
    /// The fleet manager bounds this call with `task_execution_timeout`
    /// and applies the retry policy on failure; implementations should not
    /// retry internally.
    async fn run(&self, task: &TaskEnvelope) -> Result<serde_json::Value>;
}
