//! Cedar Registry - agent bookkeeping and the executor seam
//!
//! The `AgentRegistry` is the single source of truth for fleet state. It is
//! owned by the fleet manager and accessed only through its methods — there
//! is no process-wide singleton. The `Executor` trait is the one external
//! collaborator: the actual task execution logic supplied per agent type at
//! deploy time.

#![deny(unsafe_code)]

pub mod executor;
pub mod registry;

pub use executor::Executor;
pub use registry::AgentRegistry;
