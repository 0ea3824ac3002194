//! Fleet and agent configuration
//!
//! `FleetConfig` is immutable and supplied at startup. `AgentConfig` is an
//! explicit struct enumerating the recognized per-agent fields; anything
//! else a caller wants to carry goes into the typed `metadata` map.

use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Load-balancing strategy for the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BalanceStrategy {
    /// Cycle through candidates in order.
    RoundRobin,
    /// Pick the candidate with the fewest in-flight tasks.
    LeastConnections,
    /// Pick the candidate maximizing `health_score * (1 - utilization)`.
    #[default]
    ResourceBased,
    /// Score by capability match, tie-broken by resource score.
    CapabilityBased,
}

/// Immutable fleet-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Hard cap on registered agents, autoscaling included.
    pub max_agents: usize,

    /// Task queue capacity; `submit_task` fails beyond this.
    pub max_concurrent_tasks: usize,

    /// Floor for the agent population.
    pub min_agent_instances: usize,

    /// Ceiling the autoscaler may grow the population to.
    pub max_agent_instances: usize,

    /// Bound on agent initialization during deploy and repair.
    pub agent_startup_timeout: Duration,

    /// Bound on a single task execution.
    pub task_execution_timeout: Duration,

    /// Interval of the health-monitor loop. Heartbeats older than twice
    /// this value mark an agent unhealthy.
    pub health_check_interval: Duration,

    /// Retries before a task is marked permanently failed.
    pub max_task_retries: u32,

    /// Consecutive failures before an agent's circuit opens.
    pub circuit_breaker_threshold: u32,

    /// How long an open circuit blocks calls before a half-open trial.
    pub circuit_breaker_timeout: Duration,

    /// Minimum gap between autoscaler actions.
    pub scaling_cooldown: Duration,

    /// Whether the autoscaler loop runs at all.
    pub autoscale_enabled: bool,

    /// Interval of the autoscaler loop.
    pub autoscale_interval: Duration,

    /// Interval of the metrics-collection loop.
    pub metrics_interval: Duration,

    /// Bound on draining: shutdown waits this long for in-flight work, and
    /// `terminate_agent` waits this long for the agent's load to reach zero.
    pub drain_timeout: Duration,

    /// Agent type used for startup deploys and scale-up provisioning.
    pub default_agent_type: String,

    /// Strategy used by the load balancer.
    pub strategy: BalanceStrategy,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_agents: 50,
            max_concurrent_tasks: 100,
            min_agent_instances: 2,
            max_agent_instances: 10,
            agent_startup_timeout: Duration::from_secs(30),
            task_execution_timeout: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(10),
            max_task_retries: 3,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(30),
            scaling_cooldown: Duration::from_secs(60),
            autoscale_enabled: true,
            autoscale_interval: Duration::from_secs(15),
            metrics_interval: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(30),
            default_agent_type: "default".to_string(),
            strategy: BalanceStrategy::default(),
        }
    }
}

impl FleetConfig {
    /// Validate the invariants between population bounds.
    pub fn validate(&self) -> Result<()> {
        if self.min_agent_instances > self.max_agent_instances {
            return Err(FleetError::InvalidConfig(format!(
                "min_agent_instances ({}) exceeds max_agent_instances ({})",
                self.min_agent_instances, self.max_agent_instances
            )));
        }
        if self.max_agent_instances > self.max_agents {
            return Err(FleetError::InvalidConfig(format!(
                "max_agent_instances ({}) exceeds max_agents ({})",
                self.max_agent_instances, self.max_agents
            )));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(FleetError::InvalidConfig(
                "max_concurrent_tasks must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-agent configuration supplied at deploy time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Capability tags advertised by the agent.
    pub capabilities: BTreeSet<String>,

    /// Maximum concurrent tasks the agent accepts. Must be positive.
    pub max_capacity: u32,

    /// Typed extension map for fields Cedar does not interpret.
    pub metadata: BTreeMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            capabilities: BTreeSet::new(),
            max_capacity: 4,
            metadata: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    pub fn with_capabilities<I, S>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, max_capacity: u32) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Validate deploy-time invariants.
    pub fn validate(&self) -> Result<()> {
        if self.max_capacity == 0 {
            return Err(FleetError::InvalidConfig(
                "max_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FleetConfig::default().validate().is_ok());
    }

    #[test]
    fn test_min_above_max_rejected() {
        let config = FleetConfig {
            min_agent_instances: 8,
            max_agent_instances: 4,
            ..FleetConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FleetError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_instances_above_fleet_cap_rejected() {
        let config = FleetConfig {
            max_agent_instances: 100,
            max_agents: 50,
            ..FleetConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = AgentConfig::default().with_capacity(0);
        assert!(config.validate().is_err());
    }
}
