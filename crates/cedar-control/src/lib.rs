//! Cedar Control - the fleet manager
//!
//! The `FleetManager` is the unified entry point for the fleet: it owns the
//! bounded task queue and the agent registry, and composes the load
//! balancer, per-agent circuit breakers, health policy, and autoscaler
//! behind one API. Four background loops run for its lifetime: dispatch,
//! health monitoring, metrics collection, and (if enabled) autoscaling.
//!
//! ```no_run
//! use cedar_control::FleetManager;
//! use cedar_registry::Executor;
//! use cedar_types::{FleetConfig, Result, TaskEnvelope};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Executor for Echo {
//!     async fn run(&self, task: &TaskEnvelope) -> Result<serde_json::Value> {
//!         Ok(task.payload.clone())
//!     }
//! }
//!
//! # async fn demo() -> Result<()> {
//! let manager = FleetManager::new(FleetConfig::default())?;
//! manager.register_executor("default", Arc::new(Echo));
//! manager.startup().await?;
//!
//! let task_id = manager.submit_task(TaskEnvelope::new(serde_json::json!("hello")))?;
//! # let _ = task_id;
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod manager;
pub mod queue;

pub use manager::FleetManager;
pub use queue::TaskQueue;
