//! Valuation oracle agent - market price against attested NAV.

use async_trait::async_trait;
use serde_json::json;

use policy::{
    param_keys, ActionIntent, ActionParams, ActionType, EvidenceItem, PortfolioPosition, Severity, Signal,
    SignalKind, Stance,
};

use crate::agent::Agent;
use crate::frame::ObservationFrame;

/// Prefix of NAV datapoints, followed by the position symbol.
pub const NAV_KEY_PREFIX: &str = "fdc:nav:";

const WARN_ABOVE: f64 = 0.01;
const REBALANCE_ABOVE: f64 = 0.015;

/// Compares each position with a NAV datapoint against its market price.
pub struct ValuationOracleAgent {
    name: String,
}

impl ValuationOracleAgent {
    pub const NAME: &'static str = "ValuationOracleAgent";

    pub fn new() -> Self {
        Self { name: Self::NAME.to_string() }
    }

    fn nav_for(frame: &ObservationFrame, position: &PortfolioPosition) -> Option<f64> {
        let key = format!("{}{}", NAV_KEY_PREFIX, position.symbol);
        frame
            .datapoint(&key)
            .and_then(|d| d.value.get("nav"))
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .filter(|nav| nav.is_finite() && *nav > 0.0)
    }

    fn rebalance(&self, position: &PortfolioPosition, delta: f64, reason: &str) -> ActionIntent {
        ActionIntent::new(ActionType::Rebalance, reason)
            .with_params(
                ActionParams::new()
                    .with(param_keys::ASSET, position.symbol.as_str())
                    .with(param_keys::TARGET_DELTA_PCT, delta)
                    .with(param_keys::TURNOVER, 0.03)
                    .with(param_keys::SLIPPAGE_BPS, 20.0),
            )
            .with_route(position.chain_id.unwrap_or(0), Some("DEX"))
            .proposed_by(&self.name)
    }
}

impl Default for ValuationOracleAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ValuationOracleAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, frame: &ObservationFrame) -> crate::Result<Vec<Signal>> {
        let priced: Vec<(&PortfolioPosition, f64)> = frame
            .positions
            .iter()
            .filter_map(|p| Self::nav_for(frame, p).map(|nav| (p, nav)))
            .collect();

        if priced.is_empty() {
            return Ok(vec![Signal::new(
                &self.name,
                SignalKind::Risk,
                Severity::Info,
                "No NAV/position found for valuation check.",
            )
            .with_confidence(0.55)
            .with_reason("NAV datapoint or matching position missing.")
            .with_evidence(EvidenceItem::new("oracle", NAV_KEY_PREFIX, "missing"))]);
        }

        let mut signal = Signal::new(&self.name, SignalKind::Risk, Severity::Info, "")
            .with_confidence(0.78)
            .with_reason("Compared attested NAV to market price.");
        let mut lines = Vec::new();
        let mut details = Vec::new();
        let mut worst_bps = 0.0_f64;

        for (position, nav) in priced {
            let diff = (position.price - nav) / nav;
            let divergence_bps = (diff.abs() * 10_000.0).round();
            worst_bps = worst_bps.max(divergence_bps);

            if diff.abs() > WARN_ABOVE {
                signal.severity = Severity::Warn;
            }
            if diff > REBALANCE_ABOVE {
                signal = signal.recommend(self.rebalance(
                    position,
                    -0.05,
                    "Market price above NAV; consider trimming exposure.",
                ));
            } else if diff < -REBALANCE_ABOVE {
                signal = signal.recommend(self.rebalance(
                    position,
                    0.05,
                    "Market price below NAV; consider adding exposure.",
                ));
            }

            lines.push(format!(
                "NAV divergence for {}: {:.2}% (mkt={}, nav={})",
                position.symbol,
                diff * 100.0,
                position.price,
                nav
            ));
            details.push(json!({ "asset": position.symbol, "mktPx": position.price, "navPx": nav, "diff": diff }));
            signal = signal
                .with_evidence(EvidenceItem::new(
                    "FDC",
                    &format!("{}{}", NAV_KEY_PREFIX, position.symbol),
                    format!("nav={}", nav),
                ))
                .with_evidence(EvidenceItem::new(
                    "market",
                    &format!("price:{}", position.symbol),
                    format!("price={}", position.price),
                ));
        }

        signal.summary = lines.join("; ");
        signal = if worst_bps > 150.0 {
            signal.with_reason("Divergence above tolerance threshold.")
        } else {
            signal.with_reason("Divergence within tolerance.")
        };
        if !signal.recommendations.is_empty() {
            signal = signal.with_stance(Stance::Support);
        }

        Ok(vec![signal
            .with_risk_score((worst_bps / 2.0).min(100.0))
            .with_details(json!({ "valuations": details }))])
    }
}
