//! Agent instance types
//!
//! An `AgentInstance` is one deployed worker: identity, capability tags,
//! capacity, current load, health score, and lifecycle status. Instances
//! are created by the fleet manager on deploy and mutated only through the
//! registry, so concurrent readers always observe a consistent snapshot.

use crate::config::AgentConfig;
use crate::ids::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Weight of the success rate in the health score.
const HEALTH_SUCCESS_WEIGHT: f64 = 0.7;
/// Weight of the duration factor in the health score.
const HEALTH_DURATION_WEIGHT: f64 = 0.3;
/// Availability requires a health score strictly above this floor.
const AVAILABILITY_HEALTH_FLOOR: f64 = 0.5;

/// Agent lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    /// Deploy accepted, executor initialization in progress
    Initializing,
    /// Running normally and accepting work
    Active,
    /// Degraded but still schedulable
    Idle,
    /// At capacity; no further assignments until load drops
    Busy,
    /// Failed; excluded from dispatch until repaired
    Error,
    /// Draining before removal; no new assignments
    Terminating,
    /// Removed from service
    Terminated,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Active => "active",
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
            AgentStatus::Terminating => "terminating",
            AgentStatus::Terminated => "terminated",
        };
        write!(f, "{}", label)
    }
}

/// Lifetime execution statistics for one agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Tasks attempted (success or failure)
    pub total_tasks: u64,

    /// Tasks completed successfully
    pub successful_tasks: u64,

    /// Running average task duration in seconds
    pub average_duration_secs: f64,
}

impl PerformanceMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            1.0
        } else {
            self.successful_tasks as f64 / self.total_tasks as f64
        }
    }
}

/// A single deployed worker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    /// Unique instance identifier, generated at deploy time
    pub id: AgentId,

    /// Agent type tag, used for preferred-type dispatch and replacement
    pub agent_type: String,

    /// Current lifecycle status
    pub status: AgentStatus,

    /// Capability tags advertised by the agent
    pub capabilities: BTreeSet<String>,

    /// Tasks currently executing on this agent
    pub current_load: u32,

    /// Maximum concurrent tasks
    pub max_capacity: u32,

    /// Derived reliability/speed score in [0, 1]
    pub health_score: f64,

    /// Last time the agent completed work or was touched by the manager
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,

    /// Deploy timestamp
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// Lifetime execution statistics
    pub performance: PerformanceMetrics,

    /// Opaque metadata carried from the deploy-time config
    pub metadata: BTreeMap<String, String>,
}

impl AgentInstance {
    /// Create a new instance in `Initializing` status from a deploy config.
    pub fn new(agent_type: impl Into<String>, config: &AgentConfig) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: AgentId::generate(),
            agent_type: agent_type.into(),
            status: AgentStatus::Initializing,
            capabilities: config.capabilities.clone(),
            current_load: 0,
            max_capacity: config.max_capacity,
            health_score: 1.0,
            last_heartbeat: now,
            started_at: now,
            performance: PerformanceMetrics::default(),
            metadata: config.metadata.clone(),
        }
    }

    /// Reconstruct the deploy-time config, used when replacing the agent.
    pub fn to_config(&self) -> AgentConfig {
        AgentConfig {
            capabilities: self.capabilities.clone(),
            max_capacity: self.max_capacity,
            metadata: self.metadata.clone(),
        }
    }

    /// Whether the dispatch loop may assign work to this agent.
    pub fn is_available(&self) -> bool {
        matches!(self.status, AgentStatus::Active | AgentStatus::Idle)
            && self.current_load < self.max_capacity
            && self.health_score > AVAILABILITY_HEALTH_FLOOR
    }

    /// Whether the agent's heartbeat is recent and it is not in error.
    pub fn is_healthy(&self, heartbeat_timeout: Duration) -> bool {
        let age = chrono::Utc::now() - self.last_heartbeat;
        age.to_std().map(|age| age < heartbeat_timeout).unwrap_or(true)
            && self.status != AgentStatus::Error
    }

    /// Fraction of capacity in use, in [0, 1].
    pub fn utilization(&self) -> f64 {
        if self.max_capacity == 0 {
            0.0
        } else {
            self.current_load as f64 / self.max_capacity as f64
        }
    }

    /// Fold one task outcome into the metrics and recompute the health
    /// score: `0.7 * success_rate + 0.3 * duration_factor`, where the
    /// duration factor is `min(1.0, 2.0 / (avg_duration + 1.0))` so faster
    /// agents score higher and near-zero durations saturate at 1.0.
    pub fn record_outcome(&mut self, success: bool, duration: Duration) {
        let total = self.performance.total_tasks + 1;
        let prior = self.performance.average_duration_secs;
        self.performance.average_duration_secs =
            (prior * self.performance.total_tasks as f64 + duration.as_secs_f64()) / total as f64;
        self.performance.total_tasks = total;
        if success {
            self.performance.successful_tasks += 1;
        }

        let success_rate = self.performance.success_rate();
        let duration_factor =
            (2.0 / (self.performance.average_duration_secs + 1.0)).min(1.0);
        self.health_score =
            HEALTH_SUCCESS_WEIGHT * success_rate + HEALTH_DURATION_WEIGHT * duration_factor;
    }

    /// Reset metrics, health, and load after an in-place restart.
    pub fn reset_for_restart(&mut self) {
        self.performance = PerformanceMetrics::default();
        self.health_score = 1.0;
        self.current_load = 0;
        self.last_heartbeat = chrono::Utc::now();
        self.status = AgentStatus::Active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_instance() -> AgentInstance {
        AgentInstance::new("worker", &AgentConfig::default().with_capacity(4))
    }

    #[test]
    fn test_fresh_instance_not_available_until_active() {
        let mut agent = test_instance();
        assert_eq!(agent.status, AgentStatus::Initializing);
        assert!(!agent.is_available());

        agent.status = AgentStatus::Active;
        assert!(agent.is_available());
    }

    #[test]
    fn test_full_capacity_blocks_availability() {
        let mut agent = test_instance();
        agent.status = AgentStatus::Active;
        agent.current_load = 4;
        assert!(!agent.is_available());
        assert_eq!(agent.utilization(), 1.0);
    }

    #[test]
    fn test_low_health_blocks_availability() {
        let mut agent = test_instance();
        agent.status = AgentStatus::Active;
        agent.health_score = 0.5;
        assert!(!agent.is_available());
    }

    #[test]
    fn test_is_healthy_checks_heartbeat_and_error() {
        let timeout = Duration::from_secs(20);
        let mut agent = test_instance();
        agent.status = AgentStatus::Active;
        assert!(agent.is_healthy(timeout));

        agent.last_heartbeat = chrono::Utc::now() - chrono::Duration::seconds(25);
        assert!(!agent.is_healthy(timeout));

        agent.last_heartbeat = chrono::Utc::now();
        agent.status = AgentStatus::Error;
        assert!(!agent.is_healthy(timeout));
    }

    #[test]
    fn test_health_score_formula() {
        let mut agent = test_instance();

        // One success taking 1s: rate = 1.0, factor = min(1, 2/2) = 1.0.
        agent.record_outcome(true, Duration::from_secs(1));
        assert!((agent.health_score - 1.0).abs() < 1e-9);

        // One failure taking 3s: rate = 0.5, avg = 2s, factor = 2/3.
        agent.record_outcome(false, Duration::from_secs(3));
        let expected = 0.7 * 0.5 + 0.3 * (2.0 / 3.0);
        assert!((agent.health_score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_duration_factor_saturates() {
        let mut agent = test_instance();
        agent.record_outcome(true, Duration::from_millis(10));
        // Near-zero duration saturates the factor at 1.0.
        assert!((agent.health_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_restart_resets_bookkeeping() {
        let mut agent = test_instance();
        agent.status = AgentStatus::Error;
        agent.current_load = 3;
        agent.record_outcome(false, Duration::from_secs(5));

        agent.reset_for_restart();
        assert_eq!(agent.status, AgentStatus::Active);
        assert_eq!(agent.current_load, 0);
        assert_eq!(agent.health_score, 1.0);
        assert_eq!(agent.performance.total_tasks, 0);
    }

    #[test]
    fn test_config_round_trip() {
        let config = AgentConfig::with_capabilities(["triage", "search"]).with_capacity(8);
        let agent = AgentInstance::new("worker", &config);
        let rebuilt = agent.to_config();
        assert_eq!(rebuilt.capabilities, config.capabilities);
        assert_eq!(rebuilt.max_capacity, 8);
    }
}
