//! Core types shared by agents, the constraint gate and the orchestrator.
//!
//! Wire names follow the JSON records consumed by the audit log and the
//! status dashboard: fields are camelCase, enums SCREAMING_SNAKE_CASE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::key::ActionKey;

/// Confidence used when an agent reports a missing or non-finite value.
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// Severity of a signal.
///
/// Ordered: `Info < Warn < High < Critical`. Every place that ranks signals
/// relies on this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational
    Info = 0,
    /// Worth a look
    Warn = 1,
    /// Needs attention this cycle
    High = 2,
    /// Immediate attention required
    Critical = 3,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Info
    }
}

impl Severity {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Highest severity among a set of signals, `None` when there are none.
pub fn highest_severity<'a>(signals: impl IntoIterator<Item = &'a Signal>) -> Option<Severity> {
    signals.into_iter().map(|s| s.severity).max()
}

/// What an agent's signal is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Observation,
    Risk,
    Compliance,
    Strategy,
    Execution,
}

/// An agent's overall position for the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stance {
    Support,
    Oppose,
    Neutral,
}

impl Default for Stance {
    fn default() -> Self {
        Self::Neutral
    }
}

/// Type of a proposed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Rebalance,
    Hedge,
    Redeem,
    Pause,
    Unpause,
    UpdateConstraints,
}

impl ActionType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rebalance => "REBALANCE",
            Self::Hedge => "HEDGE",
            Self::Redeem => "REDEEM",
            Self::Pause => "PAUSE",
            Self::Unpause => "UNPAUSE",
            Self::UpdateConstraints => "UPDATE_CONSTRAINTS",
        }
    }

    /// Circuit-breaker actions stay reachable under a compliance veto.
    pub fn is_circuit_breaker(&self) -> bool {
        matches!(self, Self::Pause)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Recognized action parameter keys, version [`ActionParams::VERSION`].
pub mod param_keys {
    /// Fraction of portfolio value traded (REBALANCE, HEDGE)
    pub const TURNOVER: &str = "turnover";
    /// Expected slippage in basis points (any trading action)
    pub const SLIPPAGE_BPS: &str = "slippageBps";
    /// Signed allocation change (REBALANCE)
    pub const TARGET_DELTA_PCT: &str = "targetDeltaPct";
    /// Hedge notional as a fraction of portfolio (HEDGE)
    pub const NOTIONAL_PCT: &str = "notionalPct";
    /// Fraction of holding to redeem (REDEEM)
    pub const AMOUNT_PCT: &str = "amountPct";
    /// Asset class selector
    pub const ASSET_CLASS: &str = "assetClass";
    /// Single asset selector
    pub const ASSET: &str = "asset";
    /// Hedged symbol (HEDGE)
    pub const AGAINST: &str = "against";
    /// Hedge instrument (HEDGE)
    pub const INSTRUMENT: &str = "instrument";

    /// Keys that must carry finite numbers.
    pub const NUMERIC: &[&str] = &[TURNOVER, SLIPPAGE_BPS, TARGET_DELTA_PCT, NOTIONAL_PCT, AMOUNT_PCT];
    /// Keys that must carry text.
    pub const TEXT: &[&str] = &[ASSET_CLASS, ASSET, AGAINST, INSTRUMENT];
}

/// Bounded parameters of an action intent.
///
/// Keys are kept sorted so serialization is order-independent. Recognized
/// keys are listed in [`param_keys`]; unknown keys are carried through
/// untouched and participate in the action key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionParams(BTreeMap<String, ParamValue>);

impl ActionParams {
    /// Version of the recognized key set.
    pub const VERSION: u32 = 1;

    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Insert a parameter in place.
    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Get a raw parameter.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Get a finite numeric parameter.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(ParamValue::Number(n)) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    /// Get a text parameter.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ParamValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Turnover, 0 when absent.
    pub fn turnover(&self) -> f64 {
        self.number(param_keys::TURNOVER).unwrap_or(0.0)
    }

    /// Slippage in basis points, 0 when absent.
    pub fn slippage_bps(&self) -> f64 {
        self.number(param_keys::SLIPPAGE_BPS).unwrap_or(0.0)
    }

    /// Iterate parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check recognized keys carry values of the documented type.
    pub fn validate(&self) -> crate::Result<()> {
        for key in param_keys::NUMERIC {
            match self.0.get(*key) {
                None => {}
                Some(ParamValue::Number(n)) if n.is_finite() => {}
                Some(other) => {
                    return Err(crate::PolicyError::InvalidParam {
                        key: key.to_string(),
                        reason: format!("expected finite number, got {:?}", other),
                    })
                }
            }
        }
        for key in param_keys::TEXT {
            match self.0.get(*key) {
                None | Some(ParamValue::Text(_)) => {}
                Some(other) => {
                    return Err(crate::PolicyError::InvalidParam {
                        key: key.to_string(),
                        reason: format!("expected text, got {:?}", other),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Target venue for an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Target chain id
    pub chain_id: u64,
    /// Optional venue on that chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
}

/// A proposed operation, pending consensus and gate approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionIntent {
    /// Operation type
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Why the action is proposed
    pub reason: String,
    /// Bounded parameters
    #[serde(default)]
    pub params: ActionParams,
    /// Optional routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    /// Agent or subsystem that proposed it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_source: Option<String>,
}

impl ActionIntent {
    /// Create a new intent.
    pub fn new(action_type: ActionType, reason: impl Into<String>) -> Self {
        Self {
            action_type,
            reason: reason.into(),
            params: ActionParams::new(),
            route: None,
            proposal_source: None,
        }
    }

    /// Set parameters.
    pub fn with_params(mut self, params: ActionParams) -> Self {
        self.params = params;
        self
    }

    /// Set route.
    pub fn with_route(mut self, chain_id: u64, venue: Option<&str>) -> Self {
        self.route = Some(Route {
            chain_id,
            venue: venue.map(str::to_string),
        });
        self
    }

    /// Set proposal source.
    pub fn proposed_by(mut self, source: impl Into<String>) -> Self {
        self.proposal_source = Some(source.into());
        self
    }

    /// Canonical aggregation key.
    pub fn key(&self) -> ActionKey {
        ActionKey::of(self)
    }
}

fn de_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

/// A holding in the observed portfolio.
///
/// Numeric fields accept JSON numbers or decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPosition {
    /// Token address or internal id
    pub asset_id: String,
    /// Display symbol
    pub symbol: String,
    /// Units held
    #[serde(deserialize_with = "de_decimal")]
    pub quantity: f64,
    /// Unit price in quote currency
    #[serde(deserialize_with = "de_decimal")]
    pub price: f64,
    /// quantity × price
    #[serde(deserialize_with = "de_decimal")]
    pub value: f64,
    /// Chain the asset lives on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Classification tags, e.g. "rwa", "treasury", "real-estate"
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PortfolioPosition {
    /// Create a position; value is quantity × price.
    pub fn new(symbol: impl Into<String>, quantity: f64, price: f64) -> Self {
        let symbol = symbol.into();
        Self {
            asset_id: symbol.to_lowercase(),
            symbol,
            quantity,
            price,
            value: quantity * price,
            chain_id: None,
            tags: vec![],
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Set chain id.
    pub fn on_chain(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Whether the position carries a tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Value usable in aggregates: negative or non-finite values count as 0.
    pub fn sane_value(&self) -> f64 {
        if self.value.is_finite() && self.value > 0.0 {
            self.value
        } else {
            0.0
        }
    }
}

/// One observed fact from a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    /// Key, e.g. "fdc:nav:tBILL"
    pub key: String,
    /// Raw value
    pub value: serde_json::Value,
    /// When the value was observed
    pub observed_at: DateTime<Utc>,
    /// Source, e.g. "FDC:JsonApi"
    pub source: String,
    /// Confidence (0.0 - 1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Keys this datapoint conflicts with
    #[serde(default)]
    pub conflict_keys: Vec<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl DataPoint {
    /// Create a datapoint observed now.
    pub fn new(key: impl Into<String>, value: serde_json::Value, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value,
            observed_at: Utc::now(),
            source: source.into(),
            confidence: 1.0,
            conflict_keys: vec![],
        }
    }
}

/// Names of portfolio risk metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskMetricName {
    #[serde(rename = "Concentration")]
    Concentration,
    #[serde(rename = "LiquidityStress")]
    LiquidityStress,
    #[serde(rename = "CreditScore")]
    CreditScore,
    #[serde(rename = "VaR_95_1d")]
    Var95,
    #[serde(rename = "VaR_99_1d")]
    Var99,
    #[serde(rename = "MaxDrawdown")]
    MaxDrawdown,
}

impl RiskMetricName {
    /// Get wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concentration => "Concentration",
            Self::LiquidityStress => "LiquidityStress",
            Self::CreditScore => "CreditScore",
            Self::Var95 => "VaR_95_1d",
            Self::Var99 => "VaR_99_1d",
            Self::MaxDrawdown => "MaxDrawdown",
        }
    }
}

/// A named risk metric with the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetric {
    pub name: RiskMetricName,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon: Option<String>,
    pub explanation: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, f64>,
}

impl RiskMetric {
    /// Create a unit-interval metric.
    pub fn unit_interval(name: RiskMetricName, value: f64, explanation: impl Into<String>) -> Self {
        Self {
            name,
            value,
            unit: Some("0..1".to_string()),
            horizon: None,
            explanation: explanation.into(),
            inputs: BTreeMap::new(),
        }
    }

    /// Record an input.
    pub fn with_input(mut self, key: &str, value: f64) -> Self {
        self.inputs.insert(key.to_string(), value);
        self
    }

    /// Set horizon.
    pub fn with_horizon(mut self, horizon: &str) -> Self {
        self.horizon = Some(horizon.to_string());
        self
    }
}

/// A citation backing a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// e.g. "portfolio", "oracle", "rules"
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl EvidenceItem {
    /// Create an evidence item.
    pub fn new(source: &str, r#ref: &str, detail: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            r#ref: Some(r#ref.to_string()),
            detail: Some(detail.into()),
        }
    }
}

/// One agent's opinion for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    /// Agent identity
    pub agent: String,
    pub kind: SignalKind,
    pub severity: Severity,
    pub summary: String,
    /// Free-form structured details
    #[serde(default)]
    pub details: serde_json::Value,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Agent-local risk score (0 - 100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub metrics: Vec<RiskMetric>,
    #[serde(default)]
    pub recommendations: Vec<ActionIntent>,
    /// Compliance veto
    #[serde(default)]
    pub veto: bool,
    #[serde(default)]
    pub stance: Stance,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    /// Rule or constraint ids, e.g. "RISK:SLIPPAGE_TOO_HIGH"
    #[serde(default)]
    pub constraints_touched: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    /// Create a new signal stamped now.
    pub fn new(
        agent: impl Into<String>,
        kind: SignalKind,
        severity: Severity,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            kind,
            severity,
            summary: summary.into(),
            details: serde_json::Value::Null,
            confidence: NEUTRAL_CONFIDENCE,
            risk_score: None,
            metrics: vec![],
            recommendations: vec![],
            veto: false,
            stance: Stance::Neutral,
            reasons: vec![],
            evidence: vec![],
            constraints_touched: vec![],
            created_at: Utc::now(),
        }
    }

    /// Set confidence level.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set stance.
    pub fn with_stance(mut self, stance: Stance) -> Self {
        self.stance = stance;
        self
    }

    /// Raise or clear the veto.
    pub fn with_veto(mut self, veto: bool) -> Self {
        self.veto = veto;
        self
    }

    /// Add a recommended action.
    pub fn recommend(mut self, intent: ActionIntent) -> Self {
        self.recommendations.push(intent);
        self
    }

    /// Add a reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    /// Add a metric.
    pub fn with_metric(mut self, metric: RiskMetric) -> Self {
        self.metrics.push(metric);
        self
    }

    /// Add evidence.
    pub fn with_evidence(mut self, evidence: EvidenceItem) -> Self {
        self.evidence.push(evidence);
        self
    }

    /// Set the agent-local risk score.
    pub fn with_risk_score(mut self, score: f64) -> Self {
        self.risk_score = Some(score);
        self
    }

    /// Set details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Confidence clamped to [0, 1]; non-finite values read as neutral.
    pub fn effective_confidence(&self) -> f64 {
        if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            NEUTRAL_CONFIDENCE
        }
    }

    /// Find a metric by name.
    pub fn metric(&self, name: RiskMetricName) -> Option<&RiskMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

/// Error types for the policy crate.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A recognized parameter carries the wrong type
    #[error("Invalid parameter {key}: {reason}")]
    InvalidParam { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, PolicyError>;
