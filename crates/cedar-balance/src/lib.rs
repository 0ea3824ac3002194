//! Cedar Balance - selection policy for task dispatch
//!
//! The load balancer is a stateless policy over candidate snapshots: given
//! the available agents for a task, pick the one that should execute it.
//! It never mutates fleet state. The only internal state is the RoundRobin
//! counter, which is an atomic so concurrent dispatchers stay safe.

#![deny(unsafe_code)]

mod balancer;

pub use balancer::LoadBalancer;
pub use cedar_types::config::BalanceStrategy;
