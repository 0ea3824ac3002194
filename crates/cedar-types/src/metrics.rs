//! Point-in-time fleet snapshot
//!
//! `SystemMetrics` is read-only to consumers: the autoscaler and external
//! status reporting. It is produced by the metrics-collection loop and by
//! `FleetManager::status()`, never mutated elsewhere.

use crate::instance::{AgentInstance, AgentStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate fleet state at one instant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Registered agents by status label
    pub agents_by_status: BTreeMap<String, usize>,

    /// Total registered agents
    pub total_agents: usize,

    /// Tasks waiting in the queue
    pub queue_depth: usize,

    /// Tasks currently executing
    pub in_flight_tasks: usize,

    /// Mean utilization across agents with capacity, in [0, 1]
    pub utilization_rate: f64,

    /// Dispatch saturation proxy: `in_flight / max_concurrent_tasks`
    pub cpu_usage: f64,

    /// Tasks completed successfully since startup
    pub tasks_completed: u64,

    /// Tasks permanently failed since startup
    pub tasks_failed: u64,

    /// Snapshot timestamp
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

impl SystemMetrics {
    /// Build a snapshot from an agent listing and queue/dispatch counters.
    pub fn collect(
        agents: &[AgentInstance],
        queue_depth: usize,
        in_flight_tasks: usize,
        max_concurrent_tasks: usize,
        tasks_completed: u64,
        tasks_failed: u64,
    ) -> Self {
        let mut agents_by_status: BTreeMap<String, usize> = BTreeMap::new();
        for agent in agents {
            *agents_by_status.entry(agent.status.to_string()).or_default() += 1;
        }

        let with_capacity: Vec<_> = agents.iter().filter(|a| a.max_capacity > 0).collect();
        let utilization_rate = if with_capacity.is_empty() {
            0.0
        } else {
            with_capacity.iter().map(|a| a.utilization()).sum::<f64>()
                / with_capacity.len() as f64
        };

        let cpu_usage = if max_concurrent_tasks == 0 {
            0.0
        } else {
            in_flight_tasks as f64 / max_concurrent_tasks as f64
        };

        Self {
            agents_by_status,
            total_agents: agents.len(),
            queue_depth,
            in_flight_tasks,
            utilization_rate,
            cpu_usage,
            tasks_completed,
            tasks_failed,
            collected_at: chrono::Utc::now(),
        }
    }

    /// Count of agents in the given status.
    pub fn count(&self, status: AgentStatus) -> usize {
        self.agents_by_status
            .get(&status.to_string())
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;

    fn agent_with_load(load: u32, capacity: u32) -> AgentInstance {
        let mut agent =
            AgentInstance::new("worker", &AgentConfig::default().with_capacity(capacity));
        agent.status = AgentStatus::Active;
        agent.current_load = load;
        agent
    }

    #[test]
    fn test_utilization_is_mean_over_agents() {
        let agents = vec![agent_with_load(2, 4), agent_with_load(0, 4)];
        let metrics = SystemMetrics::collect(&agents, 3, 2, 100, 0, 0);
        assert_eq!(metrics.total_agents, 2);
        assert_eq!(metrics.queue_depth, 3);
        assert!((metrics.utilization_rate - 0.25).abs() < 1e-9);
        assert!((metrics.cpu_usage - 0.02).abs() < 1e-9);
        assert_eq!(metrics.count(AgentStatus::Active), 2);
    }

    #[test]
    fn test_empty_fleet_snapshot() {
        let metrics = SystemMetrics::collect(&[], 0, 0, 100, 0, 0);
        assert_eq!(metrics.total_agents, 0);
        assert_eq!(metrics.utilization_rate, 0.0);
    }
}
