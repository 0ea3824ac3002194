//! Cedar Types - Core types for the agent fleet manager
//!
//! Cedar is a single-process, in-memory fleet manager: it accepts opaque
//! units of work ("tasks"), distributes them across a pool of stateful
//! worker instances ("agents"), and keeps the pool healthy and right-sized
//! under load.
//!
//! ## Architectural Boundaries
//!
//! - **Cedar** owns: the task queue, the agent registry, dispatch, health
//!   monitoring, and autoscaling.
//! - **Callers** own: what a task actually computes. The fleet manager
//!   treats a task as an opaque payload plus metadata, and an agent as an
//!   opaque executor exposing a capacity and a capability set.
//!
//! ## Key Concepts
//!
//! - **FleetConfig**: Immutable knobs supplied at startup
//! - **AgentInstance**: A single deployed worker and its bookkeeping
//! - **TaskEnvelope**: Metadata wrapper around an opaque payload
//! - **SystemMetrics**: Point-in-time fleet snapshot for scaling/reporting
//! - **FleetEvent**: Unified observability stream

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod instance;
pub mod metrics;
pub mod task;

// Re-export main types
pub use config::{AgentConfig, FleetConfig};
pub use error::{FleetError, Result};
pub use events::{EventSeverity, FleetEvent};
pub use ids::{AgentId, TaskId};
pub use instance::{AgentInstance, AgentStatus, PerformanceMetrics};
pub use metrics::SystemMetrics;
pub use task::TaskEnvelope;
