//! Constraint layer definitions.
//!
//! Each layer is an independent check over one action. A layer never sees
//! another layer's result.

pub mod execution;
pub mod operations;
pub mod regulatory;
pub mod risk;

pub use execution::ExecutionLayer;
pub use operations::OperationsLayer;
pub use regulatory::RegulatoryLayer;
pub use risk::RiskLayer;

use crate::gate::{ConstraintContext, ConstraintLayer, ConstraintViolation};
use crate::types::ActionIntent;

/// Violation codes emitted by the standard layers.
pub mod codes {
    pub const INVESTOR_NOT_ACCREDITED: &str = "INVESTOR_NOT_ACCREDITED";
    pub const DEFENSIVE_TURNOVER_LIMIT: &str = "DEFENSIVE_TURNOVER_LIMIT";
    pub const SLIPPAGE_TOO_HIGH: &str = "SLIPPAGE_TOO_HIGH";
    pub const ESCALATION_REQUIRED: &str = "ESCALATION_REQUIRED";
}

/// Trait for a single policy layer.
pub trait LayerCheck: Send + Sync {
    /// The layer this check reports under
    fn layer(&self) -> ConstraintLayer;

    /// Check one action; an empty vector means the layer passes
    fn check(&self, intent: &ActionIntent, ctx: &ConstraintContext<'_>) -> Vec<ConstraintViolation>;
}
