//! Data provenance agent - conflicting and stale datapoints.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;

use policy::{EvidenceItem, Severity, Signal, SignalKind};

use crate::agent::Agent;
use crate::frame::ObservationFrame;

/// Reports datapoints that conflict with others or are older than the freshness window.
pub struct DataProvenanceAgent {
    name: String,
    max_age: Duration,
}

impl DataProvenanceAgent {
    pub const NAME: &'static str = "DataProvenanceAgent";

    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_string(),
            max_age: Duration::seconds(60),
        }
    }

    /// Set the freshness window.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

impl Default for DataProvenanceAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for DataProvenanceAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, frame: &ObservationFrame) -> crate::Result<Vec<Signal>> {
        let now = Utc::now();
        let conflicts: Vec<&str> = frame
            .data
            .iter()
            .filter(|d| !d.conflict_keys.is_empty())
            .map(|d| d.key.as_str())
            .collect();
        let stale: Vec<&str> = frame
            .data
            .iter()
            .filter(|d| now - d.observed_at > self.max_age)
            .map(|d| d.key.as_str())
            .collect();

        let (severity, summary, confidence) = if !conflicts.is_empty() {
            (Severity::Warn, format!("Detected {} conflicting datapoints.", conflicts.len()), 0.72)
        } else if !stale.is_empty() {
            (Severity::Info, format!("Detected {} stale datapoints.", stale.len()), 0.6)
        } else {
            (Severity::Info, "Data sources look consistent.".to_string(), 0.85)
        };

        let mut signal = Signal::new(&self.name, SignalKind::Observation, severity, summary)
            .with_confidence(confidence)
            .with_details(json!({
                "total": frame.data.len(),
                "conflicts": conflicts,
                "stale": stale,
            }));

        if !conflicts.is_empty() {
            signal = signal.with_reason("Conflicting datapoints detected across sources.");
        }
        if !stale.is_empty() {
            signal = signal.with_reason("Some datapoints are older than the freshness threshold.");
        }
        if conflicts.is_empty() && stale.is_empty() {
            signal = signal.with_reason("No conflicts or staleness detected.");
        }

        for d in frame.data.iter().take(3) {
            signal = signal.with_evidence(EvidenceItem::new(
                &d.source,
                &d.key,
                format!("observedAt={}", d.observed_at.to_rfc3339()),
            ));
        }

        Ok(vec![signal])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::DataPoint;

    #[tokio::test]
    async fn test_fresh_consistent_data() {
        let frame = ObservationFrame::new().with_datapoint(DataPoint::new("price:A", json!(1.0), "DEX"));
        let signals = DataProvenanceAgent::new().run(&frame).await.unwrap();
        assert_eq!(signals[0].severity, Severity::Info);
        assert_eq!(signals[0].confidence, 0.85);
        assert_eq!(signals[0].evidence.len(), 1);
    }

    #[tokio::test]
    async fn test_conflicts_outrank_staleness() {
        let mut stale = DataPoint::new("price:B", json!(2.0), "CEX");
        stale.observed_at = Utc::now() - Duration::minutes(5);
        let mut conflicting = DataPoint::new("price:A", json!(1.0), "DEX");
        conflicting.conflict_keys = vec!["price:A@CEX".to_string()];

        let frame = ObservationFrame::new().with_datapoint(stale).with_datapoint(conflicting);
        let signals = DataProvenanceAgent::new().run(&frame).await.unwrap();
        let signal = &signals[0];
        assert_eq!(signal.severity, Severity::Warn);
        assert_eq!(signal.reasons.len(), 2);
        assert_eq!(signal.details["stale"][0], "price:B");
        assert!(signal.recommendations.is_empty());
    }
}
