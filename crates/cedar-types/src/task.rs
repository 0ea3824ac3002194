//! Task envelope types
//!
//! The fleet manager never interprets a task's payload; it only routes the
//! envelope. Ownership passes from the caller at submission, to the queue,
//! to the executing task on dispatch. Retried copies are re-enqueued with
//! an incremented `retry_count`.

use crate::ids::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metadata wrapper around an opaque payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Unique task identifier
    pub id: TaskId,

    /// Submission timestamp
    pub submitted_at: chrono::DateTime<chrono::Utc>,

    /// Number of times this task has been re-enqueued after a failure
    pub retry_count: u32,

    /// If set and agents of that type exist, dispatch restricts candidates
    /// to that type
    pub preferred_agent_type: Option<String>,

    /// Capabilities the CapabilityBased strategy scores candidates against
    pub required_capabilities: BTreeSet<String>,

    /// Opaque work description
    pub payload: serde_json::Value,
}

impl TaskEnvelope {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: TaskId::generate(),
            submitted_at: chrono::Utc::now(),
            retry_count: 0,
            preferred_agent_type: None,
            required_capabilities: BTreeSet::new(),
            payload,
        }
    }

    pub fn with_preferred_type(mut self, agent_type: impl Into<String>) -> Self {
        self.preferred_agent_type = Some(agent_type.into());
        self
    }

    pub fn with_required_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Copy for re-enqueueing after a failure.
    pub fn retry(&self) -> Self {
        let mut copy = self.clone();
        copy.retry_count += 1;
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retry_increments_count_keeps_id() {
        let task = TaskEnvelope::new(json!({"kind": "triage"}));
        let retried = task.retry();
        assert_eq!(retried.id, task.id);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.retry().retry_count, 2);
    }

    #[test]
    fn test_builders() {
        let task = TaskEnvelope::new(json!(null))
            .with_preferred_type("triage")
            .with_required_capabilities(["search"]);
        assert_eq!(task.preferred_agent_type.as_deref(), Some("triage"));
        assert!(task.required_capabilities.contains("search"));
    }
}
