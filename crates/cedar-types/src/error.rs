//! Error taxonomy for fleet operations
//!
//! Retry decisions in the dispatch loop are driven by the error kind, so
//! every failure mode has a distinct variant rather than a stringly-typed
//! catch-all.

use crate::ids::{AgentId, TaskId};
use std::time::Duration;
use thiserror::Error;

/// Fleet manager errors
#[derive(Debug, Clone, Error)]
pub enum FleetError {
    /// The registry already holds `max_agents` agents
    #[error("Fleet full: {limit} agents registered")]
    FleetFull { limit: usize },

    /// The task queue is at `max_concurrent_tasks`
    #[error("Task queue full: capacity {limit}")]
    QueueFull { limit: usize },

    /// The manager is draining and no longer accepts work
    #[error("Fleet manager is shutting down")]
    ShuttingDown,

    /// No agent with the given ID is registered
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// Agent-specific setup failed or timed out during deploy
    #[error("Initialization failed for agent type '{agent_type}': {reason}")]
    Initialization { agent_type: String, reason: String },

    /// The agent's circuit breaker rejected the call
    #[error("Circuit open for agent {0}")]
    CircuitOpen(AgentId),

    /// Task execution exceeded `task_execution_timeout`
    #[error("Task {task_id} timed out after {timeout:?}")]
    TaskTimeout { task_id: TaskId, timeout: Duration },

    /// Task execution returned an error
    #[error("Task {task_id} execution failed: {reason}")]
    TaskExecution { task_id: TaskId, reason: String },

    /// Configuration invariant violated
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FleetError {
    /// Whether a task failing with this error should be retried.
    ///
    /// Submission-time and configuration errors are never retried; only
    /// execution-path failures are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FleetError::CircuitOpen(_)
                | FleetError::TaskTimeout { .. }
                | FleetError::TaskExecution { .. }
        )
    }
}

/// Result type for fleet operations
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let task_id = TaskId::generate();
        assert!(FleetError::CircuitOpen(AgentId::generate()).is_retryable());
        assert!(FleetError::TaskTimeout {
            task_id: task_id.clone(),
            timeout: Duration::from_secs(1),
        }
        .is_retryable());
        assert!(FleetError::TaskExecution {
            task_id,
            reason: "boom".to_string(),
        }
        .is_retryable());

        assert!(!FleetError::QueueFull { limit: 10 }.is_retryable());
        assert!(!FleetError::ShuttingDown.is_retryable());
        assert!(!FleetError::FleetFull { limit: 5 }.is_retryable());
    }
}
