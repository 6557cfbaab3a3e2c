//! The constraint gate - layered policy checks over a single action.
//!
//! Layers run unconditionally and their violations are unioned, so one
//! action can fail several layers at once. A violation is a normal,
//! reportable outcome, not an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::dynamic::DynamicPolicy;
use crate::layers::{ExecutionLayer, LayerCheck, OperationsLayer, RegulatoryLayer, RiskLayer};
use crate::types::{ActionIntent, PortfolioPosition};

/// Policy layer a violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintLayer {
    /// Investor eligibility, jurisdictions, disclosures
    Regulatory,
    /// Position and turnover limits
    Risk,
    /// Slippage caps, venue bounds
    Execution,
    /// Operational circuit breakers
    Operations,
}

impl ConstraintLayer {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regulatory => "REGULATORY",
            Self::Risk => "RISK",
            Self::Execution => "EXECUTION",
            Self::Operations => "OPERATIONS",
        }
    }
}

/// A failed constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub layer: ConstraintLayer,
    /// Stable code, e.g. `SLIPPAGE_TOO_HIGH`
    pub code: String,
    pub message: String,
    /// Whether the violation blocks submission
    pub blocking: bool,
    /// Numbers that triggered the violation
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, f64>,
}

impl ConstraintViolation {
    /// Create a blocking violation.
    pub fn blocking(layer: ConstraintLayer, code: &str, message: impl Into<String>) -> Self {
        Self {
            layer,
            code: code.to_string(),
            message: message.into(),
            blocking: true,
            context: BTreeMap::new(),
        }
    }

    /// Attach a context value.
    pub fn with_context(mut self, key: &str, value: f64) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    /// `LAYER:CODE` tag used in `constraintsTouched`.
    pub fn tag(&self) -> String {
        format!("{}:{}", self.layer.as_str(), self.code)
    }
}

/// Inputs the layers check an action against.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintContext<'a> {
    /// Current portfolio
    pub positions: &'a [PortfolioPosition],
    /// Portfolio-level risk score (0 - 100)
    pub risk_score: u8,
    /// Venue-served policy values
    pub dynamic: &'a DynamicPolicy,
}

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub ok: bool,
    pub violations: Vec<ConstraintViolation>,
}

impl CheckResult {
    /// Tags of all violations.
    pub fn touched(&self) -> Vec<String> {
        self.violations.iter().map(ConstraintViolation::tag).collect()
    }

    /// Whether any violation blocks submission.
    pub fn is_blocked(&self) -> bool {
        self.violations.iter().any(|v| v.blocking)
    }
}

/// Ordered set of independent layer checks.
pub struct ConstraintGate {
    layers: Vec<Box<dyn LayerCheck>>,
}

impl ConstraintGate {
    /// Create a gate with no layers.
    pub fn empty() -> Self {
        Self { layers: Vec::new() }
    }

    /// The four standard layers in order: regulatory, risk, execution, operations.
    pub fn standard() -> Self {
        Self::with_critical_risk_score(OperationsLayer::DEFAULT_CRITICAL_RISK_SCORE)
    }

    /// Standard layers with a custom critical risk threshold.
    pub fn with_critical_risk_score(critical_risk_score: u8) -> Self {
        Self::empty()
            .with_layer(Box::new(RegulatoryLayer))
            .with_layer(Box::new(RiskLayer))
            .with_layer(Box::new(ExecutionLayer))
            .with_layer(Box::new(OperationsLayer::new(critical_risk_score)))
    }

    /// Append a layer.
    pub fn with_layer(mut self, layer: Box<dyn LayerCheck>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Run every layer and union the violations.
    pub fn check_all(&self, intent: &ActionIntent, ctx: &ConstraintContext<'_>) -> CheckResult {
        let violations: Vec<ConstraintViolation> = self
            .layers
            .iter()
            .flat_map(|layer| layer.check(intent, ctx))
            .collect();

        debug!(
            action = %intent.action_type,
            violations = violations.len(),
            "Constraint gate checked action"
        );

        CheckResult {
            ok: violations.is_empty(),
            violations,
        }
    }

    /// Number of layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

impl Default for ConstraintGate {
    fn default() -> Self {
        Self::standard()
    }
}
