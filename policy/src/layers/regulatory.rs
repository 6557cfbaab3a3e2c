//! Regulatory layer - investor eligibility.

use crate::gate::{ConstraintContext, ConstraintLayer, ConstraintViolation};
use crate::layers::{codes, LayerCheck};
use crate::types::{ActionIntent, ActionType};

/// Redemptions require an accredited investor.
pub struct RegulatoryLayer;

impl LayerCheck for RegulatoryLayer {
    fn layer(&self) -> ConstraintLayer {
        ConstraintLayer::Regulatory
    }

    fn check(&self, intent: &ActionIntent, ctx: &ConstraintContext<'_>) -> Vec<ConstraintViolation> {
        if intent.action_type == ActionType::Redeem && !ctx.dynamic.investor_accredited {
            return vec![ConstraintViolation::blocking(
                self.layer(),
                codes::INVESTOR_NOT_ACCREDITED,
                "Investor must be accredited to redeem this instrument.",
            )];
        }
        vec![]
    }
}
