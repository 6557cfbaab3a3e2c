//! Strategy agent - concentration hedging.

use async_trait::async_trait;
use serde_json::json;

use policy::{
    param_keys, ActionIntent, ActionParams, ActionType, EvidenceItem, Severity, Signal, SignalKind, Stance,
};

use crate::agent::Agent;
use crate::frame::ObservationFrame;

const CONCENTRATION_ABOVE: f64 = 0.7;

/// Proposes a hedge when one position dominates the portfolio.
pub struct StrategyAgent {
    name: String,
}

impl StrategyAgent {
    pub const NAME: &'static str = "StrategyAgent";

    pub fn new() -> Self {
        Self { name: Self::NAME.to_string() }
    }
}

impl Default for StrategyAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for StrategyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, frame: &ObservationFrame) -> crate::Result<Vec<Signal>> {
        let share = frame.top_share();
        let biggest = frame.largest_position().map(|p| p.symbol.clone());

        let signal = match biggest.as_deref() {
            Some(symbol) if share > CONCENTRATION_ABOVE => Signal::new(
                &self.name,
                SignalKind::Strategy,
                Severity::Warn,
                "Strategy proposes hedge due to concentration.",
            )
            .with_confidence(0.68)
            .with_risk_score((share * 100.0).round())
            .with_stance(Stance::Support)
            .with_reason("Top position exceeds concentration threshold.")
            .with_reason("Hedge proposed to reduce concentration risk.")
            .recommend(
                ActionIntent::new(
                    ActionType::Hedge,
                    "Concentration high; propose a hedge or diversified allocation.",
                )
                .with_params(
                    ActionParams::new()
                        .with(param_keys::AGAINST, symbol)
                        .with(param_keys::INSTRUMENT, "perp/option")
                        .with(param_keys::NOTIONAL_PCT, 0.15)
                        .with(param_keys::SLIPPAGE_BPS, 25.0)
                        .with(param_keys::TURNOVER, 0.02),
                )
                .proposed_by(&self.name),
            ),
            _ => Signal::new(&self.name, SignalKind::Strategy, Severity::Info, "No strategy actions proposed.")
                .with_confidence(0.58)
                .with_risk_score(0.0)
                .with_reason("Concentration within acceptable bounds."),
        };

        let top = biggest.as_deref().unwrap_or("n/a");
        Ok(vec![signal
            .with_details(json!({ "totalValue": frame.total_value(), "biggest": biggest }))
            .with_evidence(EvidenceItem::new("portfolio", "positions", format!("top={}", top)))])
    }
}
