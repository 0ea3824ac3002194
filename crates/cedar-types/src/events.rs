//! Event types for fleet observability
//!
//! Events provide a unified stream of agent lifecycle, task outcome, and
//! scaling activity for external logging and alerting integration.
//! Permanently-failed and cancelled tasks are surfaced here rather than
//! raised to any caller.

use crate::ids::{AgentId, TaskId};
use crate::instance::AgentStatus;
use serde::{Deserialize, Serialize};

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Fleet events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FleetEvent {
    /// Agent registered and initialized
    AgentDeployed {
        agent_id: AgentId,
        agent_type: String,
    },

    /// Agent drained and removed from the registry
    AgentTerminated { agent_id: AgentId },

    /// Agent status transition
    AgentStatusChanged {
        agent_id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
    },

    /// In-place restart succeeded
    AgentRepaired { agent_id: AgentId },

    /// Restart failed; agent was replaced with a fresh deploy
    AgentReplaced {
        old_agent_id: AgentId,
        new_agent_id: AgentId,
        agent_type: String,
    },

    /// Agent's circuit breaker opened
    CircuitOpened { agent_id: AgentId },

    /// Agent's circuit breaker closed after recovery
    CircuitClosed { agent_id: AgentId },

    /// Task finished successfully
    TaskCompleted {
        task_id: TaskId,
        agent_id: AgentId,
        duration_ms: u64,
    },

    /// Task failed and was re-enqueued
    TaskRetried {
        task_id: TaskId,
        retry_count: u32,
        reason: String,
    },

    /// Task exhausted its retries
    TaskFailed { task_id: TaskId, reason: String },

    /// Queued task discarded during shutdown
    TaskCancelled { task_id: TaskId },

    /// Autoscaler provisioned agents
    ScaledUp { count: usize, agent_type: String },

    /// Autoscaler removed idle agents
    ScaledDown { count: usize },
}

impl FleetEvent {
    /// Default severity for the event kind.
    pub fn severity(&self) -> EventSeverity {
        match self {
            FleetEvent::AgentDeployed { .. }
            | FleetEvent::AgentTerminated { .. }
            | FleetEvent::AgentRepaired { .. }
            | FleetEvent::TaskCompleted { .. }
            | FleetEvent::CircuitClosed { .. }
            | FleetEvent::ScaledUp { .. }
            | FleetEvent::ScaledDown { .. } => EventSeverity::Info,
            FleetEvent::AgentStatusChanged { .. } => EventSeverity::Debug,
            FleetEvent::TaskRetried { .. }
            | FleetEvent::TaskCancelled { .. }
            | FleetEvent::CircuitOpened { .. }
            | FleetEvent::AgentReplaced { .. } => EventSeverity::Warning,
            FleetEvent::TaskFailed { .. } => EventSeverity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        let failed = FleetEvent::TaskFailed {
            task_id: TaskId::generate(),
            reason: "retries exhausted".to_string(),
        };
        assert_eq!(failed.severity(), EventSeverity::Error);

        let deployed = FleetEvent::AgentDeployed {
            agent_id: AgentId::generate(),
            agent_type: "worker".to_string(),
        };
        assert_eq!(deployed.severity(), EventSeverity::Info);
    }
}
