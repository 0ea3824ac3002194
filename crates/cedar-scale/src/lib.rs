//! Cedar Scale - the autoscaler decision function
//!
//! The autoscaler inspects aggregate metrics and the current agent
//! population and recommends scale-up/scale-down actions. It is a pure
//! function over snapshots apart from its own cooldown clock; provisioning
//! and termination are executed by the fleet manager.

#![deny(unsafe_code)]

mod scaler;

pub use scaler::{select_victims, AutoScaler, ScalingDecision};
