//! Consensus aggregation over one cycle's signals.
//!
//! Each distinct action (by [`ActionKey`]) collects reputation-weighted
//! support from the agents that recommend it. Opposition is global: every
//! OPPOSE-stanced agent and every counted vetoer weighs against every action
//! of the cycle, including actions it never saw. Classification precedence:
//!
//! 1. vetoed and not PAUSE → DENIED
//! 2. support ≥ threshold → APPROVED
//! 3. oppose ≥ threshold → DENIED
//! 4. otherwise → ESCALATE

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};

use policy::{ActionIntent, ActionKey, ActionType, Signal, Stance};

use crate::config::ConsensusConfig;
use crate::risk::RiskAssessment;
use crate::types::{ActionConsensus, ConsensusStatus, ConsensusSummary, Decision, DeniedAction};

pub const VETO_DENIAL: &str = "Compliance veto active.";
pub const OPPOSE_DENIAL: &str = "Consensus oppose threshold exceeded.";

pub const ESCALATION_VETO: &str = "Compliance veto raised.";
pub const ESCALATION_CRITICAL_RISK: &str = "Risk score exceeds critical threshold.";
pub const ESCALATION_NO_CONSENSUS: &str = "Insufficient consensus; human oversight required.";

/// Classify one action. Pure in its inputs.
pub fn classify(
    action_type: ActionType,
    support_weight: f64,
    oppose_weight: f64,
    vetoed: bool,
    threshold_weight: f64,
) -> ConsensusStatus {
    if vetoed && !action_type.is_circuit_breaker() {
        ConsensusStatus::Denied
    } else if support_weight >= threshold_weight {
        ConsensusStatus::Approved
    } else if oppose_weight >= threshold_weight {
        ConsensusStatus::Denied
    } else {
        ConsensusStatus::Escalate
    }
}

/// Weight of an agent; unknown agents and malformed weights count as 0.
fn weight_of(weights: &BTreeMap<String, f64>, agent: &str) -> f64 {
    match weights.get(agent) {
        Some(w) if w.is_finite() && *w >= 0.0 => *w,
        _ => 0.0,
    }
}

struct Tally {
    action: ActionIntent,
    /// Largest influence per contributing agent
    support: BTreeMap<String, f64>,
    reasons: Vec<String>,
}

/// Merges signals into a [`Decision`].
pub struct ConsensusAggregator {
    config: ConsensusConfig,
}

impl ConsensusAggregator {
    /// Create with default configuration.
    pub fn new() -> Self {
        Self::with_config(ConsensusConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: ConsensusConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    fn counts_veto(&self, signal: &Signal) -> bool {
        signal.veto && self.config.can_veto(&signal.agent)
    }

    /// Whether any counted agent vetoed.
    pub fn is_vetoed(&self, signals: &[Signal]) -> bool {
        signals.iter().any(|s| self.counts_veto(s))
    }

    /// Tally and classify every distinct recommended action, in order of first appearance.
    pub fn tally(&self, signals: &[Signal], weights: &BTreeMap<String, f64>) -> Vec<ActionConsensus> {
        let vetoed = self.is_vetoed(signals);
        let mut tallies: Vec<Tally> = Vec::new();
        let mut index: HashMap<ActionKey, usize> = HashMap::new();

        for signal in signals {
            let influence = weight_of(weights, &signal.agent) * signal.effective_confidence();

            for intent in &signal.recommendations {
                if let Err(e) = intent.params.validate() {
                    warn!(agent = %signal.agent, action = %intent.action_type, error = %e, "Dropping malformed recommendation");
                    continue;
                }

                let slot = *index.entry(intent.key()).or_insert_with(|| {
                    tallies.push(Tally {
                        action: intent.clone(),
                        support: BTreeMap::new(),
                        reasons: Vec::new(),
                    });
                    tallies.len() - 1
                });
                let tally = &mut tallies[slot];

                let best = tally.support.entry(signal.agent.clone()).or_insert(0.0);
                if influence > *best {
                    *best = influence;
                }
                for reason in &signal.reasons {
                    if !tally.reasons.contains(reason) {
                        tally.reasons.push(reason.clone());
                    }
                }
            }
        }

        let opposers: BTreeSet<String> = signals
            .iter()
            .filter(|s| s.stance == Stance::Oppose || self.counts_veto(s))
            .map(|s| s.agent.clone())
            .collect();
        let oppose_weight: f64 = opposers.iter().map(|a| weight_of(weights, a)).sum();

        tallies
            .into_iter()
            .map(|tally| {
                let support_weight: f64 = tally.support.values().sum();
                let status = classify(
                    tally.action.action_type,
                    support_weight,
                    oppose_weight,
                    vetoed,
                    self.config.threshold_weight,
                );

                let mut reasons = tally.reasons;
                if status == ConsensusStatus::Denied && vetoed && !tally.action.action_type.is_circuit_breaker() {
                    reasons.push(VETO_DENIAL.to_string());
                }

                debug!(
                    action = %tally.action.action_type,
                    action_id = %tally.action.key().short_id(),
                    support_weight,
                    oppose_weight,
                    status = status.as_str(),
                    "Classified action"
                );

                ActionConsensus {
                    action: tally.action,
                    support_weight,
                    oppose_weight,
                    support_agents: tally.support.into_keys().collect(),
                    oppose_agents: opposers.clone(),
                    status,
                    reasons,
                }
            })
            .collect()
    }

    /// Build the cycle's decision.
    pub fn decide(
        &self,
        signals: Arc<[Signal]>,
        risk: RiskAssessment,
        weights: &BTreeMap<String, f64>,
    ) -> Decision {
        let vetoed = self.is_vetoed(&signals);
        let tallied = self.tally(&signals, weights);
        let agent_weights: BTreeMap<String, f64> = weights
            .keys()
            .map(|a| (a.clone(), weight_of(weights, a)))
            .collect();

        let mut consensus = ConsensusSummary {
            threshold_weight: self.config.threshold_weight,
            total_weight: agent_weights.values().sum(),
            ..ConsensusSummary::default()
        };
        let mut approved_actions = Vec::new();
        let mut denied_actions = Vec::new();

        for entry in tallied {
            match entry.status {
                ConsensusStatus::Approved => {
                    approved_actions.push(entry.action.clone());
                    consensus.approved.push(entry);
                }
                ConsensusStatus::Denied => {
                    let reason = if vetoed && !entry.action.action_type.is_circuit_breaker() {
                        VETO_DENIAL
                    } else {
                        OPPOSE_DENIAL
                    };
                    denied_actions.push(DeniedAction {
                        intent: entry.action.clone(),
                        reason: reason.to_string(),
                    });
                    consensus.denied.push(entry);
                }
                ConsensusStatus::Escalate => consensus.escalated.push(entry),
            }
        }

        let critical = risk.score >= self.config.critical_risk_score;
        let undecided = !consensus.escalated.is_empty();
        let mut escalation_reasons = Vec::new();
        if vetoed {
            escalation_reasons.push(ESCALATION_VETO.to_string());
        }
        if critical {
            escalation_reasons.push(ESCALATION_CRITICAL_RISK.to_string());
        }
        if undecided {
            escalation_reasons.push(ESCALATION_NO_CONSENSUS.to_string());
        }

        let rationale = rationale(&signals, &risk);
        let decision = Decision {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            risk_score: risk.score,
            risk_metrics: risk.metrics,
            rationale,
            signals,
            approved_actions,
            denied_actions,
            escalation_required: vetoed || critical || undecided,
            escalation_reasons,
            consensus,
            agent_weights,
        };

        info!(
            decision_id = %decision.id,
            risk_score = decision.risk_score,
            approved = decision.consensus.approved.len(),
            denied = decision.consensus.denied.len(),
            escalated = decision.consensus.escalated.len(),
            escalation_required = decision.escalation_required,
            "Decision made"
        );

        decision
    }
}

impl Default for ConsensusAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-signal summaries followed by the risk metrics.
fn rationale(signals: &[Signal], risk: &RiskAssessment) -> String {
    let mut text = signals
        .iter()
        .map(|s| format!("- [{}] {}", s.agent, s.summary))
        .collect::<Vec<_>>()
        .join("\n");
    if !risk.metrics.is_empty() {
        text.push_str("\n\nRisk Sentinel Metrics:");
        for metric in &risk.metrics {
            let _ = write!(text, "\n- {}: {}", metric.name.as_str(), metric.value);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::{param_keys, ActionParams, RiskMetric, RiskMetricName, Severity, SignalKind};

    fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(a, w)| (a.to_string(), *w)).collect()
    }

    fn recommending(agent: &str, intent: ActionIntent, confidence: f64) -> Signal {
        Signal::new(agent, SignalKind::Strategy, Severity::Info, format!("{} proposes", agent))
            .with_confidence(confidence)
            .recommend(intent)
    }

    fn rebalance() -> ActionIntent {
        ActionIntent::new(ActionType::Rebalance, "trim")
            .with_params(ActionParams::new().with(param_keys::TURNOVER, 0.04))
    }

    fn low_risk() -> RiskAssessment {
        RiskAssessment { score: 20, metrics: vec![] }
    }

    #[test]
    fn test_classify_precedence() {
        assert_eq!(classify(ActionType::Hedge, 1.0, 0.0, true, 0.67), ConsensusStatus::Denied);
        assert_eq!(classify(ActionType::Pause, 1.0, 0.0, true, 0.67), ConsensusStatus::Approved);
        assert_eq!(classify(ActionType::Hedge, 0.67, 0.9, false, 0.67), ConsensusStatus::Approved);
        assert_eq!(classify(ActionType::Hedge, 0.1, 0.67, false, 0.67), ConsensusStatus::Denied);
        assert_eq!(classify(ActionType::Hedge, 0.1, 0.1, false, 0.67), ConsensusStatus::Escalate);
        assert_eq!(classify(ActionType::Pause, 0.1, 0.1, true, 0.67), ConsensusStatus::Escalate);
    }

    #[test]
    fn test_two_agents_agree() {
        let signals: Arc<[Signal]> = vec![
            recommending("A", rebalance(), 1.0),
            recommending("B", rebalance(), 1.0),
        ]
        .into();
        let decision = ConsensusAggregator::new().decide(signals, low_risk(), &weights(&[("A", 0.5), ("B", 0.5)]));

        assert_eq!(decision.consensus.approved.len(), 1);
        let entry = &decision.consensus.approved[0];
        assert_eq!(entry.support_weight, 1.0);
        assert_eq!(entry.support_agents.len(), 2);
        assert_eq!(decision.approved_actions.len(), 1);
        assert!(!decision.escalation_required);
        assert!(decision.escalation_reasons.is_empty());
        assert_eq!(decision.consensus.total_weight, 1.0);
    }

    #[test]
    fn test_duplicate_contributions_count_once() {
        let noisy = Signal::new("A", SignalKind::Risk, Severity::Info, "twice")
            .with_confidence(0.6)
            .recommend(rebalance())
            .recommend(rebalance());
        let again = recommending("A", rebalance(), 0.9);
        let signals: Arc<[Signal]> = vec![noisy, again].into();

        let tallied = ConsensusAggregator::new().tally(&signals, &weights(&[("A", 0.5)]));
        assert_eq!(tallied.len(), 1);
        assert!((tallied[0].support_weight - 0.45).abs() < 1e-12);
        assert_eq!(tallied[0].support_agents.len(), 1);

        let reversed: Vec<Signal> = signals.iter().rev().cloned().collect();
        let tallied_rev = ConsensusAggregator::new().tally(&reversed, &weights(&[("A", 0.5)]));
        assert_eq!(tallied_rev[0].support_weight, tallied[0].support_weight);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let config = ConsensusConfig { threshold_weight: 0.5, ..ConsensusConfig::default() };
        let signals: Arc<[Signal]> = vec![recommending("A", rebalance(), 1.0)].into();
        let decision = ConsensusAggregator::with_config(config).decide(signals, low_risk(), &weights(&[("A", 0.5)]));
        assert_eq!(decision.consensus.approved.len(), 1);
    }

    #[test]
    fn test_veto_denies_all_but_pause() {
        let hedge = ActionIntent::new(ActionType::Hedge, "hedge");
        let pause = ActionIntent::new(ActionType::Pause, "halt");
        let veto = Signal::new("ComplianceAgent", SignalKind::Compliance, Severity::Critical, "breach")
            .with_veto(true)
            .with_stance(Stance::Oppose)
            .with_reason("sanctioned holding");
        let signals: Arc<[Signal]> = vec![
            recommending("Hedger", hedge, 1.0).with_reason("concentration"),
            veto,
            recommending("Breaker", pause, 1.0),
        ]
        .into();
        let w = weights(&[("Hedger", 0.5), ("ComplianceAgent", 0.5), ("Breaker", 0.5)]);
        let config = ConsensusConfig { threshold_weight: 0.5, ..ConsensusConfig::default() };

        let decision = ConsensusAggregator::with_config(config).decide(signals, low_risk(), &w);

        assert_eq!(decision.denied_actions.len(), 1);
        assert_eq!(decision.denied_actions[0].intent.action_type, ActionType::Hedge);
        assert!(decision.denied_actions[0].reason.contains("veto"));
        assert!(decision.consensus.denied[0].reasons.contains(&VETO_DENIAL.to_string()));
        assert!(decision.consensus.denied[0].reasons.contains(&"concentration".to_string()));

        assert_eq!(decision.approved_actions.len(), 1);
        assert_eq!(decision.approved_actions[0].action_type, ActionType::Pause);
        assert!(decision.escalation_required);
        assert_eq!(decision.escalation_reasons, vec![ESCALATION_VETO.to_string()]);
    }

    #[test]
    fn test_veto_from_unlisted_agent_is_ignored() {
        let rogue = Signal::new("Rogue", SignalKind::Risk, Severity::High, "no").with_veto(true);
        let signals: Arc<[Signal]> = vec![recommending("A", rebalance(), 1.0), rogue].into();
        let w = weights(&[("A", 0.7), ("Rogue", 0.3)]);

        let decision = ConsensusAggregator::new().decide(signals.clone(), low_risk(), &w);
        assert_eq!(decision.approved_actions.len(), 1);
        assert!(decision.consensus.approved[0].oppose_agents.is_empty());

        let open = ConsensusConfig { veto_agents: vec![], ..ConsensusConfig::default() };
        let decision = ConsensusAggregator::with_config(open).decide(signals, low_risk(), &w);
        assert_eq!(decision.denied_actions.len(), 1);
        assert!(decision.consensus.denied[0].oppose_agents.contains("Rogue"));
    }

    #[test]
    fn test_oppose_weight_applies_to_every_action() {
        // An agent opposing the cycle weighs against actions it never saw.
        let other = ActionIntent::new(ActionType::Hedge, "h");
        let signals: Arc<[Signal]> = vec![
            recommending("A", rebalance(), 0.5),
            recommending("B", other, 0.5),
            Signal::new("Skeptic", SignalKind::Risk, Severity::Warn, "against").with_stance(Stance::Oppose),
        ]
        .into();
        let w = weights(&[("A", 0.2), ("B", 0.1), ("Skeptic", 0.7)]);

        let decision = ConsensusAggregator::new().decide(signals, low_risk(), &w);
        assert_eq!(decision.consensus.denied.len(), 2);
        for entry in &decision.consensus.denied {
            assert_eq!(entry.oppose_weight, 0.7);
            assert!(entry.oppose_agents.contains("Skeptic"));
        }
        assert_eq!(decision.denied_actions[0].reason, OPPOSE_DENIAL);
        assert!(!decision.escalation_required);
    }

    #[test]
    fn test_escalation_reasons_in_order() {
        let weak = recommending("A", rebalance(), 0.1);
        let veto = Signal::new("ComplianceAgent", SignalKind::Compliance, Severity::Critical, "v").with_veto(true);
        let pause = recommending("B", ActionIntent::new(ActionType::Pause, "halt"), 0.1);
        let signals: Arc<[Signal]> = vec![weak, veto, pause].into();
        let w = weights(&[("A", 0.4), ("ComplianceAgent", 0.2), ("B", 0.4)]);

        let decision = ConsensusAggregator::new().decide(signals, RiskAssessment { score: 95, metrics: vec![] }, &w);
        assert_eq!(
            decision.escalation_reasons,
            vec![ESCALATION_VETO, ESCALATION_CRITICAL_RISK, ESCALATION_NO_CONSENSUS]
        );
    }

    #[test]
    fn test_critical_risk_boundary() {
        let aggregator = ConsensusAggregator::new();
        let w = weights(&[("A", 1.0)]);
        let signals: Arc<[Signal]> = vec![recommending("A", rebalance(), 1.0)].into();

        let at = aggregator.decide(signals.clone(), RiskAssessment { score: 90, metrics: vec![] }, &w);
        assert!(at.escalation_required);
        assert_eq!(at.escalation_reasons, vec![ESCALATION_CRITICAL_RISK]);

        let below = aggregator.decide(signals, RiskAssessment { score: 89, metrics: vec![] }, &w);
        assert!(!below.escalation_required);
    }

    #[test]
    fn test_unknown_agent_and_nan_sanitized() {
        let stranger = recommending("Stranger", rebalance(), 1.0);
        let nan = recommending("A", ActionIntent::new(ActionType::Hedge, "h"), f64::NAN);
        let signals: Arc<[Signal]> = vec![stranger, nan].into();
        let w = weights(&[("A", 0.8), ("Broken", f64::NAN)]);

        let tallied = ConsensusAggregator::new().tally(&signals, &w);
        assert_eq!(tallied[0].support_weight, 0.0);
        assert_eq!(tallied[0].status, ConsensusStatus::Escalate);
        assert!((tallied[1].support_weight - 0.4).abs() < 1e-12);
        assert!(tallied.iter().all(|t| t.support_weight.is_finite() && t.oppose_weight >= 0.0));
    }

    #[test]
    fn test_malformed_params_are_dropped() {
        let bad = ActionIntent::new(ActionType::Rebalance, "bad")
            .with_params(ActionParams::new().with(param_keys::TURNOVER, "lots"));
        let signals: Arc<[Signal]> = vec![recommending("A", bad, 1.0)].into();
        let tallied = ConsensusAggregator::new().tally(&signals, &weights(&[("A", 1.0)]));
        assert!(tallied.is_empty());
    }

    #[test]
    fn test_rationale_layout() {
        let signals: Arc<[Signal]> = vec![
            Signal::new("A", SignalKind::Risk, Severity::Info, "first"),
            Signal::new("B", SignalKind::Risk, Severity::Info, "second"),
        ]
        .into();
        let risk = RiskAssessment {
            score: 10,
            metrics: vec![RiskMetric::unit_interval(RiskMetricName::Concentration, 0.5, "x")],
        };
        let decision = ConsensusAggregator::new().decide(signals, risk, &BTreeMap::new());
        assert_eq!(
            decision.rationale,
            "- [A] first\n- [B] second\n\nRisk Sentinel Metrics:\n- Concentration: 0.5"
        );
        assert!(decision.consensus.all().next().is_none());
        assert_eq!(decision.risk_metrics.len(), 1);
    }
}
