//! Execution layer - slippage caps.

use crate::gate::{ConstraintContext, ConstraintLayer, ConstraintViolation};
use crate::layers::{codes, LayerCheck};
use crate::types::ActionIntent;

/// Expected slippage may not exceed the venue cap.
pub struct ExecutionLayer;

impl LayerCheck for ExecutionLayer {
    fn layer(&self) -> ConstraintLayer {
        ConstraintLayer::Execution
    }

    fn check(&self, intent: &ActionIntent, ctx: &ConstraintContext<'_>) -> Vec<ConstraintViolation> {
        let slip = intent.params.slippage_bps();
        let max_slip = ctx.dynamic.max_slippage_bps;
        if slip > max_slip {
            return vec![ConstraintViolation::blocking(
                self.layer(),
                codes::SLIPPAGE_TOO_HIGH,
                format!("Slippage {} bps exceeds max {} bps.", slip, max_slip),
            )
            .with_context("slip", slip)
            .with_context("maxSlip", max_slip)];
        }
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::DynamicPolicy;
    use crate::types::{param_keys, ActionParams, ActionType};

    #[test]
    fn test_slippage_cap() {
        let policy = DynamicPolicy::default();
        let ctx = ConstraintContext { positions: &[], risk_score: 0, dynamic: &policy };

        let at_cap = ActionIntent::new(ActionType::Hedge, "h")
            .with_params(ActionParams::new().with(param_keys::SLIPPAGE_BPS, 50.0));
        assert!(ExecutionLayer.check(&at_cap, &ctx).is_empty());

        let over = ActionIntent::new(ActionType::Hedge, "h")
            .with_params(ActionParams::new().with(param_keys::SLIPPAGE_BPS, 51.0));
        let violations = ExecutionLayer.check(&over, &ctx);
        assert_eq!(violations[0].code, codes::SLIPPAGE_TOO_HIGH);
        assert_eq!(violations[0].layer, ConstraintLayer::Execution);
    }

    #[test]
    fn test_missing_slippage_passes_and_custom_cap() {
        let tight = DynamicPolicy::default().with_max_slippage_bps(10.0);
        let ctx = ConstraintContext { positions: &[], risk_score: 0, dynamic: &tight };

        let none = ActionIntent::new(ActionType::Pause, "halt");
        assert!(ExecutionLayer.check(&none, &ctx).is_empty());

        let some = ActionIntent::new(ActionType::Rebalance, "r")
            .with_params(ActionParams::new().with(param_keys::SLIPPAGE_BPS, 20.0));
        assert_eq!(ExecutionLayer.check(&some, &ctx).len(), 1);
    }
}
