//! Scaling decision logic
//!
//! Scale-up fires when at least two pressure signals hold and the fleet
//! has headroom; scale-down only when the system is provably quiet. Both
//! are gated by a cooldown so the fleet does not thrash.

use cedar_types::{AgentId, AgentInstance, AgentStatus, SystemMetrics};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Queue depth above which the queue counts as a pressure signal.
const QUEUE_PRESSURE: usize = 10;
/// Queue depth that escalates the scale-up step to 2 agents.
const QUEUE_SURGE: usize = 20;
/// Queue depth that escalates the scale-up step to 5 agents.
const QUEUE_FLOOD: usize = 50;
/// Utilization above which the fleet counts as a pressure signal.
const UTILIZATION_PRESSURE: f64 = 0.8;
/// Utilization that escalates the scale-up step to 2 agents.
const UTILIZATION_SURGE: f64 = 0.9;
/// Dispatch saturation above which cpu counts as a pressure signal.
const CPU_PRESSURE: f64 = 0.7;
/// Utilization below which scale-down is considered at all.
const UTILIZATION_QUIET: f64 = 0.3;
/// Utilization below which two agents may be removed at once.
const UTILIZATION_VERY_QUIET: f64 = 0.1;

/// Decision returned by one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingDecision {
    /// No action needed.
    None,
    /// Provision `count` agents of `agent_type`.
    ScaleUp { count: usize, agent_type: String },
    /// Terminate `count` idle agents.
    ScaleDown { count: usize },
}

/// Autoscaler over fleet snapshots.
pub struct AutoScaler {
    min_agent_instances: usize,
    max_agent_instances: usize,
    cooldown: Duration,
    default_agent_type: String,
    last_action: Mutex<Option<Instant>>,
}

impl AutoScaler {
    pub fn new(
        min_agent_instances: usize,
        max_agent_instances: usize,
        cooldown: Duration,
        default_agent_type: impl Into<String>,
    ) -> Self {
        Self {
            min_agent_instances,
            max_agent_instances,
            cooldown,
            default_agent_type: default_agent_type.into(),
            last_action: Mutex::new(None),
        }
    }

    /// Evaluate the fleet and recommend an action.
    ///
    /// Returns `None` while within `cooldown` of the previous action.
    pub fn evaluate(&self, metrics: &SystemMetrics, agents: &[AgentInstance]) -> ScalingDecision {
        {
            let last_action = self.last_action.lock().unwrap();
            if let Some(at) = *last_action {
                if at.elapsed() < self.cooldown {
                    debug!("Autoscaler in cooldown, skipping evaluation");
                    return ScalingDecision::None;
                }
            }
        }

        let total = agents.len();

        if let Some(count) = self.scale_up_count(metrics, total) {
            info!(
                count = count,
                queue_depth = metrics.queue_depth,
                utilization = metrics.utilization_rate,
                "Autoscaler recommending scale-up"
            );
            self.mark_action();
            return ScalingDecision::ScaleUp {
                count,
                agent_type: self.default_agent_type.clone(),
            };
        }

        if let Some(count) = self.scale_down_count(metrics, total) {
            info!(
                count = count,
                total_agents = total,
                "Autoscaler recommending scale-down"
            );
            self.mark_action();
            return ScalingDecision::ScaleDown { count };
        }

        ScalingDecision::None
    }

    fn scale_up_count(&self, metrics: &SystemMetrics, total: usize) -> Option<usize> {
        if total >= self.max_agent_instances {
            return None;
        }

        let signals = [
            metrics.queue_depth > QUEUE_PRESSURE,
            metrics.utilization_rate > UTILIZATION_PRESSURE,
            metrics.cpu_usage > CPU_PRESSURE,
        ];
        if signals.iter().filter(|s| **s).count() < 2 {
            return None;
        }

        let step = if metrics.queue_depth > QUEUE_FLOOD {
            5
        } else if metrics.queue_depth > QUEUE_SURGE
            || metrics.utilization_rate > UTILIZATION_SURGE
        {
            2
        } else {
            1
        };

        let headroom = self.max_agent_instances - total;
        Some(step.min(headroom)).filter(|count| *count > 0)
    }

    fn scale_down_count(&self, metrics: &SystemMetrics, total: usize) -> Option<usize> {
        if metrics.queue_depth != 0
            || metrics.utilization_rate >= UTILIZATION_QUIET
            || total <= self.min_agent_instances
        {
            return None;
        }

        let removable = total - self.min_agent_instances;
        let count = if metrics.utilization_rate < UTILIZATION_VERY_QUIET
            && total >= self.min_agent_instances + 2
        {
            removable.min(2)
        } else {
            1
        };
        Some(count)
    }

    fn mark_action(&self) {
        *self.last_action.lock().unwrap() = Some(Instant::now());
    }
}

/// Pick scale-down victims: least-utilized agents with no in-flight work.
///
/// Agents mid-lifecycle are excluded; among idle agents, lifetime task
/// count orders the least-used first.
pub fn select_victims(agents: &[AgentInstance], count: usize) -> Vec<AgentId> {
    let mut idle: Vec<&AgentInstance> = agents
        .iter()
        .filter(|a| {
            a.current_load == 0
                && matches!(a.status, AgentStatus::Active | AgentStatus::Idle)
        })
        .collect();
    idle.sort_by_key(|a| a.performance.total_tasks);
    idle.into_iter().take(count).map(|a| a.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cedar_types::AgentConfig;

    fn fleet(total: usize) -> Vec<AgentInstance> {
        (0..total)
            .map(|_| {
                let mut agent = AgentInstance::new("worker", &AgentConfig::default());
                agent.status = AgentStatus::Active;
                agent
            })
            .collect()
    }

    fn metrics(queue_depth: usize, utilization: f64) -> SystemMetrics {
        SystemMetrics {
            queue_depth,
            utilization_rate: utilization,
            ..SystemMetrics::default()
        }
    }

    fn scaler(min: usize, max: usize) -> AutoScaler {
        AutoScaler::new(min, max, Duration::from_millis(0), "worker")
    }

    #[test]
    fn test_flooded_queue_scales_up_five() {
        // queue=60, util=0.95, total=3, max=10: flood step of 5 within the
        // headroom of 7.
        let decision = scaler(2, 10).evaluate(&metrics(60, 0.95), &fleet(3));
        assert_eq!(
            decision,
            ScalingDecision::ScaleUp {
                count: 5,
                agent_type: "worker".to_string()
            }
        );
    }

    #[test]
    fn test_quiet_fleet_scales_down_two() {
        // queue=0, util=0.05, total=6, min=2: very quiet with spare
        // population removes two.
        let decision = scaler(2, 10).evaluate(&metrics(0, 0.05), &fleet(6));
        assert_eq!(decision, ScalingDecision::ScaleDown { count: 2 });
    }

    #[test]
    fn test_single_signal_is_not_enough() {
        // Only the queue signal holds.
        let decision = scaler(2, 10).evaluate(&metrics(15, 0.5), &fleet(3));
        assert_eq!(decision, ScalingDecision::None);
    }

    #[test]
    fn test_two_signals_scale_up_one() {
        let decision = scaler(2, 10).evaluate(&metrics(15, 0.85), &fleet(3));
        assert_eq!(
            decision,
            ScalingDecision::ScaleUp {
                count: 1,
                agent_type: "worker".to_string()
            }
        );
    }

    #[test]
    fn test_scale_up_clamps_to_headroom() {
        let decision = scaler(2, 4).evaluate(&metrics(60, 0.95), &fleet(3));
        assert_eq!(
            decision,
            ScalingDecision::ScaleUp {
                count: 1,
                agent_type: "worker".to_string()
            }
        );
    }

    #[test]
    fn test_no_scale_up_at_ceiling() {
        let decision = scaler(2, 3).evaluate(&metrics(60, 0.95), &fleet(3));
        assert_eq!(decision, ScalingDecision::None);
    }

    #[test]
    fn test_no_scale_down_at_floor() {
        let decision = scaler(2, 10).evaluate(&metrics(0, 0.0), &fleet(2));
        assert_eq!(decision, ScalingDecision::None);
    }

    #[test]
    fn test_mildly_quiet_removes_one() {
        let decision = scaler(2, 10).evaluate(&metrics(0, 0.2), &fleet(6));
        assert_eq!(decision, ScalingDecision::ScaleDown { count: 1 });
    }

    #[test]
    fn test_cooldown_suppresses_second_action() {
        let scaler = AutoScaler::new(2, 10, Duration::from_secs(60), "worker");

        let first = scaler.evaluate(&metrics(60, 0.95), &fleet(3));
        assert!(matches!(first, ScalingDecision::ScaleUp { .. }));

        let second = scaler.evaluate(&metrics(60, 0.95), &fleet(3));
        assert_eq!(second, ScalingDecision::None);
    }

    #[test]
    fn test_victims_are_idle_least_used() {
        let mut agents = fleet(4);
        agents[0].current_load = 1; // never a victim
        agents[1].performance.total_tasks = 50;
        agents[2].performance.total_tasks = 5;
        agents[3].status = AgentStatus::Error; // excluded

        let victims = select_victims(&agents, 2);
        assert_eq!(victims, vec![agents[2].id.clone(), agents[1].id.clone()]);
    }
}
