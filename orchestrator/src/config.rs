//! Configuration for the decision orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::{OrchestratorError, Result};

/// Tolerance for configured weights summing to 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Configuration for the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Consensus configuration
    pub consensus: ConsensusConfig,
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,
    /// Risk scorer inputs
    pub risk: RiskConfig,
    /// Dry-run execution settings
    pub execution: ExecutionConfig,
}

impl OrchestratorConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Reject values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.consensus.validate()?;
        self.scheduler.validate()
    }
}

/// Consensus configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Weight an action needs to be approved or oppose-denied, in (0, 1]
    pub threshold_weight: f64,
    /// Agents whose veto counts; empty means every agent's veto counts
    pub veto_agents: Vec<String>,
    /// Explicit base weights; `None` splits 1.0 equally across registered agents
    pub weights: Option<BTreeMap<String, f64>>,
    /// Risk score at or above which the cycle escalates
    pub critical_risk_score: u8,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold_weight: 0.67,
            veto_agents: vec!["ComplianceAgent".to_string()],
            weights: None,
            critical_risk_score: 90,
        }
    }
}

impl ConsensusConfig {
    /// Whether `agent`'s veto counts.
    pub fn can_veto(&self, agent: &str) -> bool {
        self.veto_agents.is_empty() || self.veto_agents.iter().any(|a| a == agent)
    }

    /// Base weights for the registered agents.
    ///
    /// With explicit weights, registered agents missing from the map get 0.
    pub fn base_weights<'a>(&self, agents: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, f64> {
        let agents: Vec<&str> = agents.into_iter().collect();
        match &self.weights {
            Some(weights) => agents
                .iter()
                .map(|a| (a.to_string(), weights.get(*a).copied().unwrap_or(0.0)))
                .collect(),
            None if agents.is_empty() => BTreeMap::new(),
            None => {
                let share = 1.0 / agents.len() as f64;
                agents.iter().map(|a| (a.to_string(), share)).collect()
            }
        }
    }

    /// Check explicit weights against the registered agents.
    ///
    /// Every weighted agent must be registered and the registered agents'
    /// weights must sum to 1.
    pub fn validate_agents<'a>(&self, agents: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let Some(weights) = &self.weights else {
            return Ok(());
        };
        let agents: Vec<&str> = agents.into_iter().collect();
        if let Some(unknown) = weights.keys().find(|k| !agents.contains(&k.as_str())) {
            return Err(OrchestratorError::Config(format!(
                "consensus.weights.{} names an agent that is not registered",
                unknown
            )));
        }
        let sum: f64 = self.base_weights(agents).values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(OrchestratorError::Config(format!(
                "registered agents' weights must sum to 1, got {}",
                sum
            )));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(self.threshold_weight.is_finite() && self.threshold_weight > 0.0 && self.threshold_weight <= 1.0) {
            return Err(OrchestratorError::Config(format!(
                "consensus.threshold_weight must be in (0, 1], got {}",
                self.threshold_weight
            )));
        }
        if self.critical_risk_score > 100 {
            return Err(OrchestratorError::Config(format!(
                "consensus.critical_risk_score must be at most 100, got {}",
                self.critical_risk_score
            )));
        }
        if let Some(weights) = &self.weights {
            if let Some((agent, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
                return Err(OrchestratorError::Config(format!(
                    "consensus.weights.{} must be a non-negative number, got {}",
                    agent, w
                )));
            }
            let sum: f64 = weights.values().sum();
            if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(OrchestratorError::Config(format!(
                    "consensus.weights must sum to 1, got {}",
                    sum
                )));
            }
        }
        Ok(())
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay between the end of one tick and the start of the next (seconds)
    pub tick_secs: u64,
    /// Per-agent timeout (ms); `None` waits indefinitely
    pub agent_timeout_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 10,
            agent_timeout_ms: None,
        }
    }
}

impl SchedulerConfig {
    /// Inter-tick delay.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Per-agent timeout, if any.
    pub fn agent_timeout(&self) -> Option<Duration> {
        self.agent_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_secs == 0 {
            return Err(OrchestratorError::Config("scheduler.tick_secs must be positive".to_string()));
        }
        if self.agent_timeout_ms == Some(0) {
            return Err(OrchestratorError::Config(
                "scheduler.agent_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which agents feed the risk scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Agent whose `LiquidityStress` metric is used
    pub liquidity_agent: String,
    /// Agent whose `CreditScore` metric is used
    pub credit_agent: String,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            liquidity_agent: "LiquidityAgent".to_string(),
            credit_agent: "CreditCounterpartyAgent".to_string(),
        }
    }
}

/// Dry-run execution settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Policy values served to the constraint gate, e.g. `maxSlippageBps`
    pub policy: BTreeMap<String, serde_json::Value>,
}
