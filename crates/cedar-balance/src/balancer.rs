//! Load-balancing strategies
//!
//! All strategies return a deterministic choice given identical inputs,
//! except RoundRobin whose counter advances on every call. Ties break
//! toward the earliest candidate in the slice.

use cedar_types::config::BalanceStrategy;
use cedar_types::{AgentId, AgentInstance, TaskEnvelope};
use std::sync::atomic::{AtomicU64, Ordering};

/// Selection policy choosing the best agent for a task.
pub struct LoadBalancer {
    strategy: BalanceStrategy,
    round_robin_counter: AtomicU64,
}

impl LoadBalancer {
    pub fn new(strategy: BalanceStrategy) -> Self {
        Self {
            strategy,
            round_robin_counter: AtomicU64::new(0),
        }
    }

    pub fn strategy(&self) -> BalanceStrategy {
        self.strategy
    }

    /// Pick the best candidate for the task, or None if the set is empty.
    pub fn select(&self, candidates: &[AgentInstance], task: &TaskEnvelope) -> Option<AgentId> {
        if candidates.is_empty() {
            return None;
        }

        let chosen = match self.strategy {
            BalanceStrategy::RoundRobin => {
                let idx = self.round_robin_counter.fetch_add(1, Ordering::Relaxed);
                candidates.get((idx as usize) % candidates.len())
            }
            BalanceStrategy::LeastConnections => least_connections(candidates),
            BalanceStrategy::ResourceBased => resource_based(candidates),
            BalanceStrategy::CapabilityBased => capability_based(candidates, task),
        };

        chosen.map(|agent| agent.id.clone())
    }
}

/// Health-weighted spare capacity: `health_score * (1 - utilization)`.
fn resource_score(agent: &AgentInstance) -> f64 {
    agent.health_score * (1.0 - agent.utilization())
}

fn least_connections(candidates: &[AgentInstance]) -> Option<&AgentInstance> {
    candidates.iter().min_by_key(|a| a.current_load)
}

fn resource_based(candidates: &[AgentInstance]) -> Option<&AgentInstance> {
    candidates.iter().reduce(|best, candidate| {
        if resource_score(candidate) > resource_score(best) {
            candidate
        } else {
            best
        }
    })
}

/// Fraction of the task's required capabilities the agent advertises,
/// tie-broken by resource score. Falls back to ResourceBased when nothing
/// is required or no candidate matches anything.
fn capability_based<'a>(
    candidates: &'a [AgentInstance],
    task: &TaskEnvelope,
) -> Option<&'a AgentInstance> {
    if task.required_capabilities.is_empty() {
        return resource_based(candidates);
    }

    let required = task.required_capabilities.len() as f64;
    let match_fraction = |agent: &AgentInstance| {
        let matched = task
            .required_capabilities
            .iter()
            .filter(|c| agent.capabilities.contains(*c))
            .count();
        matched as f64 / required
    };

    if !candidates.iter().any(|a| match_fraction(a) > 0.0) {
        return resource_based(candidates);
    }

    candidates.iter().reduce(|best, candidate| {
        let best_key = (match_fraction(best), resource_score(best));
        let candidate_key = (match_fraction(candidate), resource_score(candidate));
        if candidate_key > best_key {
            candidate
        } else {
            best
        }
    })
}
