//! Health assessment policy for the monitor loop
//!
//! Pure policy over instance snapshots: the monitor loop applies the
//! verdicts, this module never mutates fleet state.

use cedar_types::{AgentInstance, AgentStatus};
use std::time::Duration;

/// Health score below which an agent is marked Error and repaired.
const REPAIR_BELOW: f64 = 0.3;
/// Health score below which an agent is demoted to Idle.
const DEGRADE_BELOW: f64 = 0.7;

/// Why an agent needs repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairReason {
    /// Already parked in `Error`: failed deploy or a tripped circuit.
    ErrorStatus,
    /// No heartbeat within twice the health-check interval.
    HeartbeatTimeout,
    /// Health score dropped below the repair floor.
    LowHealthScore,
}

impl std::fmt::Display for RepairReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairReason::ErrorStatus => write!(f, "error status"),
            RepairReason::HeartbeatTimeout => write!(f, "heartbeat timeout"),
            RepairReason::LowHealthScore => write!(f, "low health score"),
        }
    }
}

/// Outcome of assessing one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// Leave the agent alone.
    Healthy,
    /// Degraded but usable: demote to Idle, no repair.
    Degrade,
    /// Mark Error and schedule repair.
    Repair(RepairReason),
}

/// Thresholds applied by the health-monitor loop.
#[derive(Debug, Clone)]
pub struct HealthPolicy {
    heartbeat_timeout: Duration,
}

impl HealthPolicy {
    /// Policy derived from the monitor interval: heartbeats older than
    /// twice the interval count as lost.
    pub fn new(health_check_interval: Duration) -> Self {
        Self {
            heartbeat_timeout: health_check_interval * 2,
        }
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Assess one agent snapshot.
    ///
    /// Agents mid-lifecycle (initializing, terminating, terminated) are
    /// not the monitor's to touch and always read as healthy here. Agents
    /// already in `Error` are excluded from dispatch, so no task outcome
    /// can ever improve their score; only repair gets them back.
    pub fn assess(&self, agent: &AgentInstance) -> HealthVerdict {
        match agent.status {
            AgentStatus::Initializing
            | AgentStatus::Terminating
            | AgentStatus::Terminated => return HealthVerdict::Healthy,
            AgentStatus::Error => return HealthVerdict::Repair(RepairReason::ErrorStatus),
            _ => {}
        }

        if !agent.is_healthy(self.heartbeat_timeout) {
            HealthVerdict::Repair(RepairReason::HeartbeatTimeout)
        } else if agent.health_score < REPAIR_BELOW {
            HealthVerdict::Repair(RepairReason::LowHealthScore)
        } else if agent.health_score < DEGRADE_BELOW {
            HealthVerdict::Degrade
        } else {
            HealthVerdict::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cedar_types::AgentConfig;

    fn active_agent() -> AgentInstance {
        let mut agent = AgentInstance::new("worker", &AgentConfig::default());
        agent.status = AgentStatus::Active;
        agent
    }

    fn policy() -> HealthPolicy {
        HealthPolicy::new(Duration::from_secs(10))
    }

    #[test]
    fn test_fresh_agent_is_healthy() {
        assert_eq!(policy().assess(&active_agent()), HealthVerdict::Healthy);
    }

    #[test]
    fn test_stale_heartbeat_triggers_repair() {
        let mut agent = active_agent();
        agent.last_heartbeat = chrono::Utc::now() - chrono::Duration::seconds(25);
        assert_eq!(
            policy().assess(&agent),
            HealthVerdict::Repair(RepairReason::HeartbeatTimeout)
        );
    }

    #[test]
    fn test_low_score_triggers_repair() {
        let mut agent = active_agent();
        agent.health_score = 0.2;
        assert_eq!(
            policy().assess(&agent),
            HealthVerdict::Repair(RepairReason::LowHealthScore)
        );
    }

    #[test]
    fn test_middling_score_degrades() {
        let mut agent = active_agent();
        agent.health_score = 0.5;
        assert_eq!(policy().assess(&agent), HealthVerdict::Degrade);
    }

    #[test]
    fn test_error_status_always_repairs() {
        let mut agent = active_agent();
        agent.status = AgentStatus::Error;
        // A perfect score does not matter: Error agents get no work, so
        // repair is the only way back.
        agent.health_score = 1.0;
        assert_eq!(
            policy().assess(&agent),
            HealthVerdict::Repair(RepairReason::ErrorStatus)
        );
    }

    #[test]
    fn test_lifecycle_states_are_skipped() {
        let mut agent = active_agent();
        agent.status = AgentStatus::Terminating;
        agent.health_score = 0.0;
        assert_eq!(policy().assess(&agent), HealthVerdict::Healthy);
    }
}
