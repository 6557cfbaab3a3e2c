//! Compliance agent - banned-tag screening with veto power.

use async_trait::async_trait;
use serde_json::json;

use policy::{EvidenceItem, Severity, Signal, SignalKind, Stance};

use crate::agent::Agent;
use crate::frame::ObservationFrame;

/// Vetoes the cycle when the portfolio holds a banned tag.
pub struct ComplianceAgent {
    name: String,
    banned_tag: String,
}

impl ComplianceAgent {
    pub const NAME: &'static str = "ComplianceAgent";
    pub const DEFAULT_BANNED_TAG: &'static str = "sanctioned";

    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_string(),
            banned_tag: Self::DEFAULT_BANNED_TAG.to_string(),
        }
    }

    /// Screen for a different tag.
    pub fn with_banned_tag(mut self, tag: impl Into<String>) -> Self {
        self.banned_tag = tag.into();
        self
    }
}

impl Default for ComplianceAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ComplianceAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, frame: &ObservationFrame) -> crate::Result<Vec<Signal>> {
        let hits: Vec<&str> = frame
            .positions
            .iter()
            .filter(|p| p.has_tag(&self.banned_tag))
            .map(|p| p.symbol.as_str())
            .collect();
        let veto = !hits.is_empty();

        let mut signal = if veto {
            Signal::new(
                &self.name,
                SignalKind::Compliance,
                Severity::Critical,
                format!("Compliance breach: holdings tagged '{}'.", self.banned_tag),
            )
            .with_veto(true)
            .with_stance(Stance::Oppose)
            .with_confidence(0.92)
            .with_reason(format!("Detected holdings tagged '{}'.", self.banned_tag))
            .with_reason("Policy prohibits exposure to sanctioned assets.")
        } else {
            Signal::new(
                &self.name,
                SignalKind::Compliance,
                Severity::Info,
                "Compliance checks passed.",
            )
            .with_confidence(0.88)
            .with_reason("No banned tags detected in portfolio positions.")
        };

        signal = signal
            .with_details(json!({ "bannedTag": self.banned_tag, "hits": hits }))
            .with_evidence(EvidenceItem::new("portfolio", "positions", format!("hits={}", hits.len())))
            .with_evidence(EvidenceItem::new(
                "rules",
                "COMPLIANCE:BANNED_TAG",
                format!("tag={}", self.banned_tag),
            ));
        signal.constraints_touched.push("COMPLIANCE:BANNED_TAG".to_string());

        Ok(vec![signal])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::PortfolioPosition;

    #[tokio::test]
    async fn test_clean_portfolio_passes() {
        let frame = ObservationFrame::new().with_position(PortfolioPosition::new("tBILL", 10.0, 1.0));
        let signals = ComplianceAgent::new().run(&frame).await.unwrap();
        assert_eq!(signals.len(), 1);
        assert!(!signals[0].veto);
        assert_eq!(signals[0].severity, Severity::Info);
        assert_eq!(signals[0].stance, Stance::Neutral);
    }

    #[tokio::test]
    async fn test_sanctioned_holding_vetoes() {
        let frame = ObservationFrame::new()
            .with_position(PortfolioPosition::new("BAD", 10.0, 1.0).with_tag("sanctioned"));
        let signals = ComplianceAgent::new().run(&frame).await.unwrap();
        let signal = &signals[0];
        assert!(signal.veto);
        assert_eq!(signal.severity, Severity::Critical);
        assert_eq!(signal.stance, Stance::Oppose);
        assert_eq!(signal.confidence, 0.92);
        assert_eq!(signal.details["hits"][0], "BAD");
    }
}
