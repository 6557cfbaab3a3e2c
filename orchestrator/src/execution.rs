//! Execution stage - gate approved actions and submit the eligible ones.
//!
//! Every approved action yields exactly one EXECUTION signal: blocked by the
//! gate, queued with a transaction hash, or failed at submission. A failed
//! submission affects that action only.

use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use policy::{
    ActionIntent, ConstraintContext, ConstraintGate, DynamicPolicy, EvidenceItem, PortfolioPosition, Severity,
    Signal, SignalKind, Stance,
};
use rpm_agent::ExecutionAdapter;

use crate::types::Result;

/// Agent name on execution signals.
pub const EXECUTION_AGENT: &str = "ExecutionAgent";

/// What the stage did with one cycle's approved actions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// One signal per approved action, in action order
    pub signals: Vec<Signal>,
    /// Submission failures, one per failed action
    pub failures: Vec<String>,
}

impl ExecutionReport {
    /// Number of actions queued at the venue.
    pub fn submitted(&self) -> usize {
        self.signals
            .iter()
            .filter(|s| s.stance == Stance::Support)
            .count()
    }
}

/// Runs the constraint gate and the execution adapter.
pub struct ExecutionStage {
    gate: ConstraintGate,
    adapter: Arc<dyn ExecutionAdapter>,
}

impl ExecutionStage {
    /// Create with the standard gate.
    pub fn new(adapter: Arc<dyn ExecutionAdapter>) -> Self {
        Self::with_gate(adapter, ConstraintGate::standard())
    }

    /// Create with a custom gate.
    pub fn with_gate(adapter: Arc<dyn ExecutionAdapter>, gate: ConstraintGate) -> Self {
        Self { gate, adapter }
    }

    /// Gate and submit approved actions.
    ///
    /// Fails only when the venue's policy values cannot be read, in which
    /// case nothing is submitted.
    pub async fn execute(
        &self,
        positions: &[PortfolioPosition],
        risk_score: u8,
        approved: &[ActionIntent],
    ) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        if approved.is_empty() {
            return Ok(report);
        }

        let dynamic = DynamicPolicy::from_values(self.adapter.get_dynamic_constraints().await?);
        let ctx = ConstraintContext {
            positions,
            risk_score,
            dynamic: &dynamic,
        };

        for intent in approved {
            let check = self.gate.check_all(intent, &ctx);

            if !check.ok {
                let touched = check.touched();
                warn!(
                    action = %intent.action_type,
                    violations = %touched.join(", "),
                    "Action blocked by constraint gate"
                );

                let mut signal = Signal::new(
                    EXECUTION_AGENT,
                    SignalKind::Execution,
                    Severity::Warn,
                    format!("Denied {} due to constraint violations.", intent.action_type),
                )
                .with_confidence(0.9)
                .with_risk_score(f64::from(risk_score))
                .with_stance(Stance::Oppose)
                .with_reason("Constraint checks failed; action blocked.")
                .with_evidence(EvidenceItem::new("rules", "constraints", touched.join(", ")))
                .with_details(json!({ "intent": intent, "violations": check.violations }));
                signal.constraints_touched = touched;
                report.signals.push(signal);
                continue;
            }

            match self.adapter.submit_action(intent).await {
                Ok(receipt) => {
                    info!(action = %intent.action_type, tx_hash = %receipt.tx_hash, "Action queued");
                    report.signals.push(
                        Signal::new(
                            EXECUTION_AGENT,
                            SignalKind::Execution,
                            Severity::Info,
                            format!("Queued {} for execution.", intent.action_type),
                        )
                        .with_confidence(0.92)
                        .with_risk_score(f64::from(risk_score))
                        .with_stance(Stance::Support)
                        .with_reason("Constraint checks passed; action queued.")
                        .with_evidence(EvidenceItem::new("rules", "constraints", "all checks passed"))
                        .with_details(json!({ "intent": intent, "tx": receipt })),
                    );
                }
                Err(e) => {
                    error!(action = %intent.action_type, error = %e, "Submission failed");
                    report.failures.push(format!("{}: {}", intent.action_type, e));
                    report.signals.push(
                        Signal::new(
                            EXECUTION_AGENT,
                            SignalKind::Execution,
                            Severity::High,
                            format!("Submission of {} failed.", intent.action_type),
                        )
                        .with_confidence(0.9)
                        .with_risk_score(f64::from(risk_score))
                        .with_reason("Constraint checks passed; venue rejected submission.")
                        .with_evidence(EvidenceItem::new("venue", "submitAction", e.to_string()))
                        .with_details(json!({ "intent": intent, "error": e.to_string() })),
                    );
                }
            }
        }

        Ok(report)
    }
}
