//! Credit and counterparty agent - issuer and custodian risk flags.

use async_trait::async_trait;
use serde_json::json;

use policy::{
    param_keys, ActionIntent, ActionParams, ActionType, EvidenceItem, RiskMetric, RiskMetricName, Severity,
    Signal, SignalKind, Stance,
};

use crate::agent::Agent;
use crate::frame::ObservationFrame;

/// Datapoint carrying `{ "creditScore": f64 }`.
pub const ISSUER_FLAG_KEY: &str = "issuer:flag";

const DEFAULT_CREDIT_SCORE: f64 = 0.15;
const REDEEM_ABOVE: f64 = 0.65;

/// Reports `CreditScore` (0 best, 1 worst) and proposes redemption when elevated.
pub struct CreditCounterpartyAgent {
    name: String,
}

impl CreditCounterpartyAgent {
    pub const NAME: &'static str = "CreditCounterpartyAgent";

    pub fn new() -> Self {
        Self { name: Self::NAME.to_string() }
    }

    /// Credit score proxy from the issuer flag, default when absent or malformed.
    pub fn credit_score(frame: &ObservationFrame) -> f64 {
        frame
            .datapoint(ISSUER_FLAG_KEY)
            .and_then(|d| d.value.get("creditScore"))
            .and_then(serde_json::Value::as_f64)
            .filter(|s| s.is_finite())
            .unwrap_or(DEFAULT_CREDIT_SCORE)
    }
}

impl Default for CreditCounterpartyAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for CreditCounterpartyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, frame: &ObservationFrame) -> crate::Result<Vec<Signal>> {
        let score = Self::credit_score(frame);

        let severity = if score > 0.8 {
            Severity::Critical
        } else if score > REDEEM_ABOVE {
            Severity::High
        } else if score > 0.4 {
            Severity::Warn
        } else {
            Severity::Info
        };

        let metric = RiskMetric::unit_interval(
            RiskMetricName::CreditScore,
            score,
            "Proxy credit risk score derived from issuer and custodian flags.",
        )
        .with_input("creditScore", score);

        let mut signal = Signal::new(
            &self.name,
            SignalKind::Risk,
            severity,
            format!("Credit risk proxy score: {:.0}%", score * 100.0),
        )
        .with_confidence(0.7)
        .with_risk_score((score * 100.0).round())
        .with_metric(metric)
        .with_details(json!({ "creditScore": score }))
        .with_reason("Issuer/custodian credit proxy derived from flags.")
        .with_evidence(EvidenceItem::new("oracle", ISSUER_FLAG_KEY, format!("score={}", score)));

        if score > REDEEM_ABOVE {
            signal = signal
                .with_reason("Score exceeds risk threshold.")
                .with_stance(Stance::Support)
                .recommend(
                    ActionIntent::new(
                        ActionType::Redeem,
                        "Issuer/custodian risk elevated; reduce exposure via redemption if allowed.",
                    )
                    .with_params(
                        ActionParams::new()
                            .with(param_keys::ASSET_CLASS, "credit")
                            .with(param_keys::AMOUNT_PCT, 0.1),
                    )
                    .proposed_by(&self.name),
                );
        } else {
            signal = signal.with_reason("Score within acceptable range.");
        }

        Ok(vec![signal])
    }
}
