//! Risk layer - defensive-mode turnover limits.

use crate::gate::{ConstraintContext, ConstraintLayer, ConstraintViolation};
use crate::layers::{codes, LayerCheck};
use crate::types::{ActionIntent, ActionType};

/// In defensive mode, trading actions may not exceed the turnover cap.
pub struct RiskLayer;

impl LayerCheck for RiskLayer {
    fn layer(&self) -> ConstraintLayer {
        ConstraintLayer::Risk
    }

    fn check(&self, intent: &ActionIntent, ctx: &ConstraintContext<'_>) -> Vec<ConstraintViolation> {
        if !ctx.dynamic.defensive_mode {
            return vec![];
        }
        if !matches!(intent.action_type, ActionType::Rebalance | ActionType::Hedge) {
            return vec![];
        }

        let turnover = intent.params.turnover();
        let max_turnover = ctx.dynamic.max_turnover;
        if turnover > max_turnover {
            return vec![ConstraintViolation::blocking(
                self.layer(),
                codes::DEFENSIVE_TURNOVER_LIMIT,
                format!("Turnover {} exceeds defensive max {}.", turnover, max_turnover),
            )
            .with_context("turnover", turnover)
            .with_context("maxTurnover", max_turnover)];
        }
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::DynamicPolicy;
    use crate::types::{param_keys, ActionParams};

    fn rebalance(turnover: f64) -> ActionIntent {
        ActionIntent::new(ActionType::Rebalance, "trim")
            .with_params(ActionParams::new().with(param_keys::TURNOVER, turnover))
    }

    #[test]
    fn test_only_applies_in_defensive_mode() {
        let relaxed = DynamicPolicy::default();
        let ctx = ConstraintContext { positions: &[], risk_score: 0, dynamic: &relaxed };
        assert!(RiskLayer.check(&rebalance(0.5), &ctx).is_empty());
    }

    #[test]
    fn test_turnover_cap_is_inclusive() {
        let defensive = DynamicPolicy::default().defensive(0.05);
        let ctx = ConstraintContext { positions: &[], risk_score: 0, dynamic: &defensive };

        assert!(RiskLayer.check(&rebalance(0.05), &ctx).is_empty());

        let violations = RiskLayer.check(&rebalance(0.06), &ctx);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, codes::DEFENSIVE_TURNOVER_LIMIT);
        assert_eq!(violations[0].context.get("maxTurnover"), Some(&0.05));
    }

    #[test]
    fn test_default_cap_and_non_trading_actions() {
        let defensive = DynamicPolicy {
            defensive_mode: true,
            ..DynamicPolicy::default()
        };
        let ctx = ConstraintContext { positions: &[], risk_score: 0, dynamic: &defensive };
        assert_eq!(RiskLayer.check(&rebalance(0.051), &ctx).len(), 1);

        let redeem = ActionIntent::new(ActionType::Redeem, "exit")
            .with_params(ActionParams::new().with(param_keys::TURNOVER, 0.9));
        assert!(RiskLayer.check(&redeem, &ctx).is_empty());
    }
}
