//! Operations layer - critical-risk circuit breaker.
//!
//! At or above the critical risk score only PAUSE may proceed without a
//! human in the loop.

use crate::gate::{ConstraintContext, ConstraintLayer, ConstraintViolation};
use crate::layers::{codes, LayerCheck};
use crate::types::ActionIntent;

/// Blocks everything but circuit breakers at critical risk.
pub struct OperationsLayer {
    critical_risk_score: u8,
}

impl OperationsLayer {
    /// Default critical risk score.
    pub const DEFAULT_CRITICAL_RISK_SCORE: u8 = 90;

    /// Create with a critical threshold.
    pub fn new(critical_risk_score: u8) -> Self {
        Self { critical_risk_score }
    }
}

impl Default for OperationsLayer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CRITICAL_RISK_SCORE)
    }
}

impl LayerCheck for OperationsLayer {
    fn layer(&self) -> ConstraintLayer {
        ConstraintLayer::Operations
    }

    fn check(&self, intent: &ActionIntent, ctx: &ConstraintContext<'_>) -> Vec<ConstraintViolation> {
        if ctx.risk_score >= self.critical_risk_score && !intent.action_type.is_circuit_breaker() {
            return vec![ConstraintViolation::blocking(
                self.layer(),
                codes::ESCALATION_REQUIRED,
                "Risk score critical; only PAUSE allowed without human approval.",
            )
            .with_context("riskScore", f64::from(ctx.risk_score))];
        }
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::DynamicPolicy;
    use crate::types::ActionType;

    #[test]
    fn test_critical_boundary() {
        let policy = DynamicPolicy::default();
        let layer = OperationsLayer::default();
        let hedge = ActionIntent::new(ActionType::Hedge, "h");

        let below = ConstraintContext { positions: &[], risk_score: 89, dynamic: &policy };
        assert!(layer.check(&hedge, &below).is_empty());

        let at = ConstraintContext { positions: &[], risk_score: 90, dynamic: &policy };
        let violations = layer.check(&hedge, &at);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, codes::ESCALATION_REQUIRED);
    }

    #[test]
    fn test_pause_allowed_at_critical() {
        let policy = DynamicPolicy::default();
        let ctx = ConstraintContext { positions: &[], risk_score: 100, dynamic: &policy };
        let pause = ActionIntent::new(ActionType::Pause, "halt");
        assert!(OperationsLayer::default().check(&pause, &ctx).is_empty());

        let unpause = ActionIntent::new(ActionType::Unpause, "resume");
        assert_eq!(OperationsLayer::default().check(&unpause, &ctx).len(), 1);
    }
}
