//! In-memory agent registry
//!
//! DashMap-backed storage suitable for a single-process fleet. Entries are
//! mutated in place under the shard lock, so concurrent readers never
//! observe a partially-updated instance. Load accounting goes through
//! `try_acquire`/`release`, which are atomic with respect to concurrent
//! dispatch and completion — an agent's `current_load` can never exceed
//! `max_capacity`.

use crate::executor::Executor;
use cedar_types::{AgentId, AgentInstance, AgentStatus, FleetError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Registry of deployed agent instances and their executors.
pub struct AgentRegistry {
    agents: DashMap<AgentId, AgentInstance>,
    executors: DashMap<AgentId, Arc<dyn Executor>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            executors: DashMap::new(),
        }
    }

    /// Register an instance together with its executor handle.
    pub fn insert(&self, instance: AgentInstance, executor: Arc<dyn Executor>) {
        debug!(agent_id = %instance.id, agent_type = %instance.agent_type, "Agent registered");
        self.executors.insert(instance.id.clone(), executor);
        self.agents.insert(instance.id.clone(), instance);
    }

    /// Snapshot of one instance.
    pub fn get(&self, id: &AgentId) -> Option<AgentInstance> {
        self.agents.get(id).map(|a| a.clone())
    }

    /// Executor handle for one instance.
    pub fn executor(&self, id: &AgentId) -> Option<Arc<dyn Executor>> {
        self.executors.get(id).map(|e| e.clone())
    }

    /// Snapshot of every registered instance.
    pub fn list(&self) -> Vec<AgentInstance> {
        self.agents.iter().map(|a| a.value().clone()).collect()
    }

    /// Snapshot of instances with the given agent type.
    pub fn list_by_type(&self, agent_type: &str) -> Vec<AgentInstance> {
        self.agents
            .iter()
            .filter(|a| a.value().agent_type == agent_type)
            .map(|a| a.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    /// Remove an instance and its executor handle.
    pub fn remove(&self, id: &AgentId) -> Option<AgentInstance> {
        debug!(agent_id = %id, "Agent removed");
        self.executors.remove(id);
        self.agents.remove(id).map(|(_, instance)| instance)
    }

    /// Mutate one instance under the shard lock.
    pub fn update<F>(&self, id: &AgentId, f: F) -> Result<()>
    where
        F: FnOnce(&mut AgentInstance),
    {
        let mut entry = self
            .agents
            .get_mut(id)
            .ok_or_else(|| FleetError::AgentNotFound(id.clone()))?;
        f(&mut entry);
        Ok(())
    }

    /// Set an instance's status, returning the previous status.
    pub fn set_status(&self, id: &AgentId, status: AgentStatus) -> Result<AgentStatus> {
        let mut entry = self
            .agents
            .get_mut(id)
            .ok_or_else(|| FleetError::AgentNotFound(id.clone()))?;
        let previous = entry.status;
        entry.status = status;
        Ok(previous)
    }

    /// Reserve one unit of capacity on an agent if it is still available.
    ///
    /// Returns false if the agent vanished, became unavailable, or reached
    /// capacity between candidate selection and reservation.
    pub fn try_acquire(&self, id: &AgentId) -> bool {
        let Some(mut entry) = self.agents.get_mut(id) else {
            return false;
        };
        if !entry.is_available() {
            return false;
        }
        entry.current_load += 1;
        if entry.current_load >= entry.max_capacity {
            entry.status = AgentStatus::Busy;
        }
        true
    }

    /// Release one unit of capacity and fold in the task outcome.
    pub fn release(&self, id: &AgentId, success: bool, duration: Duration) {
        // The agent may have been removed mid-flight by terminate/replace.
        let Some(mut entry) = self.agents.get_mut(id) else {
            return;
        };
        entry.current_load = entry.current_load.saturating_sub(1);
        entry.last_heartbeat = chrono::Utc::now();
        entry.record_outcome(success, duration);
        if entry.status == AgentStatus::Busy && entry.current_load < entry.max_capacity {
            entry.status = AgentStatus::Active;
        }
    }

    /// Release a reservation for a task the agent never executed.
    ///
    /// Used when an open circuit rejects the call after acquisition; the
    /// agent's performance record stays untouched.
    pub fn release_unexecuted(&self, id: &AgentId) {
        let Some(mut entry) = self.agents.get_mut(id) else {
            return;
        };
        entry.current_load = entry.current_load.saturating_sub(1);
        if entry.status == AgentStatus::Busy && entry.current_load < entry.max_capacity {
            entry.status = AgentStatus::Active;
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cedar_types::{AgentConfig, TaskEnvelope};

    struct NoopExecutor;

    #[async_trait]
    impl Executor for NoopExecutor {
        async fn run(&self, _task: &TaskEnvelope) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    fn deploy(registry: &AgentRegistry, capacity: u32) -> AgentId {
        let mut instance =
            AgentInstance::new("worker", &AgentConfig::default().with_capacity(capacity));
        instance.status = AgentStatus::Active;
        let id = instance.id.clone();
        registry.insert(instance, Arc::new(NoopExecutor));
        id
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = AgentRegistry::new();
        let id = deploy(&registry, 4);

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id).is_some());
        assert!(registry.executor(&id).is_some());

        registry.remove(&id);
        assert!(registry.is_empty());
        assert!(registry.executor(&id).is_none());
    }

    #[test]
    fn test_acquire_respects_capacity() {
        let registry = AgentRegistry::new();
        let id = deploy(&registry, 2);

        assert!(registry.try_acquire(&id));
        assert!(registry.try_acquire(&id));
        // At capacity: status flipped to Busy and further acquires fail.
        assert!(!registry.try_acquire(&id));

        let agent = registry.get(&id).unwrap();
        assert_eq!(agent.current_load, 2);
        assert_eq!(agent.status, AgentStatus::Busy);
    }

    #[test]
    fn test_release_restores_availability() {
        let registry = AgentRegistry::new();
        let id = deploy(&registry, 1);

        assert!(registry.try_acquire(&id));
        registry.release(&id, true, Duration::from_millis(100));

        let agent = registry.get(&id).unwrap();
        assert_eq!(agent.current_load, 0);
        assert_eq!(agent.status, AgentStatus::Active);
        assert_eq!(agent.performance.total_tasks, 1);
    }

    #[test]
    fn test_acquire_rejects_unavailable_statuses() {
        let registry = AgentRegistry::new();
        let id = deploy(&registry, 4);

        registry.set_status(&id, AgentStatus::Terminating).unwrap();
        assert!(!registry.try_acquire(&id));

        registry.set_status(&id, AgentStatus::Error).unwrap();
        assert!(!registry.try_acquire(&id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_acquire_never_oversubscribes() {
        let registry = Arc::new(AgentRegistry::new());
        let id = deploy(&registry, 8);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { registry.try_acquire(&id) }));
        }

        let mut acquired = 0;
        for handle in handles {
            if handle.await.unwrap() {
                acquired += 1;
            }
        }

        assert_eq!(acquired, 8);
        assert_eq!(registry.get(&id).unwrap().current_load, 8);
    }

    #[test]
    fn test_release_unexecuted_skips_performance_record() {
        let registry = AgentRegistry::new();
        let id = deploy(&registry, 1);

        assert!(registry.try_acquire(&id));
        registry.release_unexecuted(&id);

        let agent = registry.get(&id).unwrap();
        assert_eq!(agent.current_load, 0);
        assert_eq!(agent.status, AgentStatus::Active);
        assert_eq!(agent.performance.total_tasks, 0);
    }

    #[test]
    fn test_list_by_type() {
        let registry = AgentRegistry::new();
        deploy(&registry, 4);

        let mut other = AgentInstance::new("triage", &AgentConfig::default());
        other.status = AgentStatus::Active;
        registry.insert(other, Arc::new(NoopExecutor));

        assert_eq!(registry.list_by_type("worker").len(), 1);
        assert_eq!(registry.list_by_type("triage").len(), 1);
        assert_eq!(registry.list_by_type("missing").len(), 0);
    }
}
