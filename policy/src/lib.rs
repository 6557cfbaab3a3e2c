//! Portfolio policy model for the RWA Portfolio Manager.
//!
//! This crate holds everything that agents and the orchestrator agree on:
//!
//! - **Signals**: one agent's timestamped opinion for a cycle
//! - **Action intents**: proposed operations with bounded parameters
//! - **Action keys**: the canonical identity used to merge equal intents
//! - **Dynamic policy**: typed policy values served by the execution venue
//! - **Constraint gate**: four independent layers that veto single actions
//!
//! # Constraint layers
//!
//! ```text
//! ┌────────────┐ ┌────────┐ ┌───────────┐ ┌────────────┐
//! │ REGULATORY │ │  RISK  │ │ EXECUTION │ │ OPERATIONS │
//! └─────┬──────┘ └───┬────┘ └─────┬─────┘ └─────┬──────┘
//!       └────────────┴──── union ─┴─────────────┘
//!                          │
//!                   CheckResult { ok, violations }
//! ```

pub mod dynamic;
pub mod gate;
pub mod key;
pub mod layers;
pub mod types;

pub use dynamic::DynamicPolicy;
pub use gate::{CheckResult, ConstraintContext, ConstraintGate, ConstraintLayer, ConstraintViolation};
pub use key::ActionKey;
pub use layers::LayerCheck;
pub use types::*;
