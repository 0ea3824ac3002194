//! Cedar Health - fault isolation and health policy
//!
//! Two pieces live here: the per-agent `CircuitBreaker` guarding calls to a
//! potentially failing agent, and the `HealthPolicy` the monitor loop uses
//! to decide between leaving an agent alone, demoting it, or repairing it.

#![deny(unsafe_code)]

pub mod breaker;
pub mod policy;

pub use breaker::{BreakerBoard, CircuitBreaker, CircuitState};
pub use policy::{HealthPolicy, HealthVerdict, RepairReason};
