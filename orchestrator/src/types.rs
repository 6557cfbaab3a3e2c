//! Core types for the decision orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use policy::{ActionIntent, RiskMetric, Signal};
use rpm_agent::{ExecutionError, ObservationError};

/// Outcome of consensus for one distinct action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusStatus {
    /// Support reached the threshold
    Approved,
    /// Vetoed, or oppose reached the threshold
    Denied,
    /// Neither side reached the threshold
    Escalate,
}

impl ConsensusStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Denied => "DENIED",
            Self::Escalate => "ESCALATE",
        }
    }
}

/// Vote tally for one distinct action within one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConsensus {
    /// The action, as first recommended this cycle
    #[serde(rename = "intent")]
    pub action: ActionIntent,
    /// Reputation-weighted support
    pub support_weight: f64,
    /// Reputation-weighted opposition
    pub oppose_weight: f64,
    pub support_agents: BTreeSet<String>,
    pub oppose_agents: BTreeSet<String>,
    pub status: ConsensusStatus,
    /// Contributing agents' reasons, deduplicated in order of first appearance
    pub reasons: Vec<String>,
}

/// A denied action and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeniedAction {
    pub intent: ActionIntent,
    pub reason: String,
}

/// Classified consensus for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusSummary {
    /// Threshold the actions were classified against
    pub threshold_weight: f64,
    /// Sum of the effective weights used
    pub total_weight: f64,
    pub approved: Vec<ActionConsensus>,
    pub denied: Vec<ActionConsensus>,
    pub escalated: Vec<ActionConsensus>,
}

impl ConsensusSummary {
    /// All classified actions: approved, then denied, then escalated.
    pub fn all(&self) -> impl Iterator<Item = &ActionConsensus> {
        self.approved.iter().chain(&self.denied).chain(&self.escalated)
    }
}

/// One cycle's final output.
///
/// Built fully formed by [`crate::ConsensusAggregator::decide`] and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Unique decision ID
    #[serde(rename = "decisionId")]
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Portfolio-level risk score (0 - 100)
    pub risk_score: u8,
    pub risk_metrics: Vec<RiskMetric>,
    /// Human-readable rationale
    pub rationale: String,
    /// Contributing signals, shared with the cycle that produced them
    pub signals: Arc<[Signal]>,
    pub approved_actions: Vec<ActionIntent>,
    pub denied_actions: Vec<DeniedAction>,
    pub escalation_required: bool,
    pub escalation_reasons: Vec<String>,
    pub consensus: ConsensusSummary,
    /// Effective weights actually used
    pub agent_weights: BTreeMap<String, f64>,
}

/// Error types for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Observation failed
    #[error("Observation failed: {0}")]
    Observation(#[from] ObservationError),

    /// Execution venue failed
    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    /// Audit sink failed
    #[error("Audit error: {0}")]
    Audit(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
