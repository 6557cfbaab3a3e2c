//! Liquidity agent - exit-capacity stress from illiquid holdings.

use async_trait::async_trait;
use serde_json::json;

use policy::{
    param_keys, ActionIntent, ActionParams, ActionType, EvidenceItem, RiskMetric, RiskMetricName, Severity,
    Signal, SignalKind, Stance,
};

use crate::agent::Agent;
use crate::frame::ObservationFrame;

const ILLIQUID_TAG: &str = "real-estate";
const STRESS_MULTIPLIER: f64 = 1.2;
const REBALANCE_ABOVE: f64 = 0.6;
const HIGH_ABOVE: f64 = 0.75;

/// Reports `LiquidityStress` and proposes raising liquid reserves.
pub struct LiquidityAgent {
    name: String,
}

impl LiquidityAgent {
    pub const NAME: &'static str = "LiquidityAgent";

    pub fn new() -> Self {
        Self { name: Self::NAME.to_string() }
    }

    /// Stress proxy in [0, 1].
    pub fn stress(frame: &ObservationFrame) -> f64 {
        let total = frame.total_value();
        let share = if total > 0.0 { frame.tagged_value(ILLIQUID_TAG) / total } else { 0.0 };
        (share * STRESS_MULTIPLIER).min(1.0)
    }
}

impl Default for LiquidityAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for LiquidityAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, frame: &ObservationFrame) -> crate::Result<Vec<Signal>> {
        let total_value = frame.total_value();
        let illiquid_value = frame.tagged_value(ILLIQUID_TAG);
        let illiquid_share = if total_value > 0.0 { illiquid_value / total_value } else { 0.0 };
        let stress = Self::stress(frame);

        let severity = if stress > HIGH_ABOVE {
            Severity::High
        } else if stress > REBALANCE_ABOVE {
            Severity::Warn
        } else {
            Severity::Info
        };

        let metric = RiskMetric::unit_interval(
            RiskMetricName::LiquidityStress,
            stress,
            "Higher when a larger share sits in slow-to-exit RWAs or gated markets.",
        )
        .with_input("illiquidValue", illiquid_value)
        .with_input("totalValue", total_value)
        .with_input("illiqShare", illiquid_share);

        let mut signal = Signal::new(
            &self.name,
            SignalKind::Risk,
            severity,
            format!("Liquidity stress proxy: {:.0}%", stress * 100.0),
        )
        .with_confidence(0.74)
        .with_risk_score((stress * 100.0).round())
        .with_metric(metric)
        .with_details(json!({
            "totalValue": total_value,
            "illiquidValue": illiquid_value,
            "illiqShare": illiquid_share,
            "stress": stress,
        }))
        .with_reason("Estimated illiquid share of portfolio.")
        .with_evidence(EvidenceItem::new(
            "portfolio",
            "positions",
            format!("illiquidValue={:.2}", illiquid_value),
        ));

        if stress > REBALANCE_ABOVE {
            signal = signal
                .with_reason("Liquidity stress exceeds warning threshold.")
                .with_stance(Stance::Support)
                .recommend(
                    ActionIntent::new(
                        ActionType::Rebalance,
                        "Liquidity stress elevated; increase liquid reserves and reduce illiquid concentration.",
                    )
                    .with_params(
                        ActionParams::new()
                            .with(param_keys::ASSET_CLASS, ILLIQUID_TAG)
                            .with(param_keys::TARGET_DELTA_PCT, -0.08)
                            .with(param_keys::TURNOVER, 0.04)
                            .with(param_keys::SLIPPAGE_BPS, 30.0),
                    )
                    .proposed_by(&self.name),
                );
        } else {
            signal = signal.with_reason("Liquidity within acceptable bounds.");
        }

        Ok(vec![signal])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::PortfolioPosition;

    fn frame(illiquid: f64, liquid: f64) -> ObservationFrame {
        ObservationFrame::new()
            .with_position(PortfolioPosition::new("REIT", illiquid, 1.0).with_tag("real-estate"))
            .with_position(PortfolioPosition::new("USDC", liquid, 1.0))
    }

    #[tokio::test]
    async fn test_low_stress_no_recommendation() {
        let signals = LiquidityAgent::new().run(&frame(20.0, 80.0)).await.unwrap();
        let signal = &signals[0];
        assert!((signal.metric(RiskMetricName::LiquidityStress).unwrap().value - 0.24).abs() < 1e-12);
        assert!(signal.recommendations.is_empty());
        assert_eq!(signal.severity, Severity::Info);
        assert_eq!(signal.stance, Stance::Neutral);
    }

    #[tokio::test]
    async fn test_high_stress_recommends_rebalance() {
        let signals = LiquidityAgent::new().run(&frame(70.0, 30.0)).await.unwrap();
        let signal = &signals[0];
        assert_eq!(signal.severity, Severity::High);
        assert_eq!(signal.stance, Stance::Support);
        assert_eq!(signal.recommendations.len(), 1);
        let intent = &signal.recommendations[0];
        assert_eq!(intent.action_type, ActionType::Rebalance);
        assert_eq!(intent.params.turnover(), 0.04);
        assert_eq!(intent.params.slippage_bps(), 30.0);
    }

    #[test]
    fn test_stress_is_capped() {
        assert_eq!(LiquidityAgent::stress(&frame(100.0, 0.0)), 1.0);
        assert_eq!(LiquidityAgent::stress(&ObservationFrame::new()), 0.0);
    }
}
