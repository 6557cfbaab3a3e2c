//! Per-agent reputation.
//!
//! Scores start at 0.5 and drift by fixed steps after each decision: agents
//! on the winning side of an action gain, agents on the losing side lose.
//! Escalated actions adjust nobody. Scores stay in [0, 1].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::types::{ConsensusStatus, ConsensusSummary, Result};

/// Score of an agent never seen before.
pub const DEFAULT_SCORE: f64 = 0.5;

/// Adjustment per decided action.
pub const STEP: f64 = 0.02;

/// One agent's trust record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReputation {
    /// Trust score (0.0 - 1.0)
    pub score: f64,
    /// Number of adjustments applied
    pub sample_count: u64,
}

impl Default for AgentReputation {
    fn default() -> Self {
        Self {
            score: DEFAULT_SCORE,
            sample_count: 0,
        }
    }
}

fn clamp01(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        DEFAULT_SCORE
    }
}

/// Process-wide reputation table.
pub struct ReputationStore {
    table: DashMap<String, AgentReputation>,
}

impl ReputationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self { table: DashMap::new() }
    }

    /// Reputation of an agent.
    pub fn get(&self, agent: &str) -> AgentReputation {
        self.table.get(agent).map(|r| *r).unwrap_or_default()
    }

    /// Score of an agent.
    pub fn score(&self, agent: &str) -> f64 {
        self.get(agent).score
    }

    /// `base × (0.5 + score)`: between 0.5× and 1.5× the base weight.
    ///
    /// Negative or non-finite base weights count as 0.
    pub fn effective_weight(&self, base: f64, agent: &str) -> f64 {
        if !base.is_finite() || base < 0.0 {
            return 0.0;
        }
        base * (0.5 + self.score(agent))
    }

    /// Effective weight for every agent in `base`.
    pub fn effective_weights(&self, base: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        base.iter()
            .map(|(agent, w)| (agent.clone(), self.effective_weight(*w, agent)))
            .collect()
    }

    /// Reward and penalize agents from one cycle's classified actions.
    pub fn apply_consensus(&self, summary: &ConsensusSummary) {
        let mut adjusted = 0usize;
        for entry in summary.all() {
            let (winners, losers) = match entry.status {
                ConsensusStatus::Approved => (&entry.support_agents, &entry.oppose_agents),
                ConsensusStatus::Denied => (&entry.oppose_agents, &entry.support_agents),
                ConsensusStatus::Escalate => continue,
            };
            for agent in winners {
                self.adjust(agent, STEP);
                adjusted += 1;
            }
            for agent in losers {
                self.adjust(agent, -STEP);
                adjusted += 1;
            }
        }
        debug!(adjusted, "Applied consensus to reputation");
    }

    fn adjust(&self, agent: &str, delta: f64) {
        let mut entry = self.table.entry(agent.to_string()).or_default();
        entry.score = clamp01(entry.score + delta);
        entry.sample_count += 1;
    }

    /// Copy of the whole table.
    pub fn snapshot(&self) -> BTreeMap<String, AgentReputation> {
        self.table
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect()
    }

    /// Replace the table; scores are clamped on the way in.
    pub fn restore(&self, snapshot: BTreeMap<String, AgentReputation>) {
        self.table.clear();
        for (agent, mut reputation) in snapshot {
            reputation.score = clamp01(reputation.score);
            self.table.insert(agent, reputation);
        }
    }

    /// Number of agents with a record.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no agent has a record.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Load a JSON snapshot; a missing file leaves the store empty.
    pub async fn load(&self, path: &Path) -> Result<()> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No reputation snapshot, starting fresh");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: BTreeMap<String, AgentReputation> = serde_json::from_str(&raw)?;
        info!(path = %path.display(), agents = snapshot.len(), "Restored reputation snapshot");
        self.restore(snapshot);
        Ok(())
    }

    /// Write the snapshot as JSON.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

impl Default for ReputationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionConsensus;
    use policy::{ActionIntent, ActionType};
    use std::collections::BTreeSet;

    fn entry(status: ConsensusStatus, support: &[&str], oppose: &[&str]) -> ActionConsensus {
        ActionConsensus {
            action: ActionIntent::new(ActionType::Rebalance, "r"),
            support_weight: 0.0,
            oppose_weight: 0.0,
            support_agents: support.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            oppose_agents: oppose.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            status,
            reasons: vec![],
        }
    }

    fn summary(entries: Vec<ActionConsensus>) -> ConsensusSummary {
        let mut summary = ConsensusSummary::default();
        for e in entries {
            match e.status {
                ConsensusStatus::Approved => summary.approved.push(e),
                ConsensusStatus::Denied => summary.denied.push(e),
                ConsensusStatus::Escalate => summary.escalated.push(e),
            }
        }
        summary
    }

    #[test]
    fn test_default_score_and_weight() {
        let store = ReputationStore::new();
        assert_eq!(store.score("unseen"), 0.5);
        assert_eq!(store.effective_weight(0.5, "unseen"), 0.5);
        assert_eq!(store.effective_weight(f64::NAN, "unseen"), 0.0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_consensus_rewards_winners() {
        let store = ReputationStore::new();
        store.apply_consensus(&summary(vec![
            entry(ConsensusStatus::Approved, &["A"], &["B"]),
            entry(ConsensusStatus::Denied, &["C"], &["D"]),
            entry(ConsensusStatus::Escalate, &["E"], &["F"]),
        ]));

        assert!((store.score("A") - 0.52).abs() < 1e-12);
        assert!((store.score("B") - 0.48).abs() < 1e-12);
        assert!((store.score("C") - 0.48).abs() < 1e-12);
        assert!((store.score("D") - 0.52).abs() < 1e-12);
        assert_eq!(store.get("E").sample_count, 0);
        assert_eq!(store.get("A").sample_count, 1);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_scores_stay_clamped() {
        let store = ReputationStore::new();
        let winning = summary(vec![entry(ConsensusStatus::Approved, &["A"], &["B"])]);
        for _ in 0..100 {
            store.apply_consensus(&winning);
        }
        assert_eq!(store.score("A"), 1.0);
        assert_eq!(store.score("B"), 0.0);
        assert_eq!(store.effective_weight(0.2, "A"), 0.2 * 1.5);
        assert_eq!(store.effective_weight(0.2, "B"), 0.2 * 0.5);
    }

    #[test]
    fn test_effective_weight_is_monotonic() {
        let store = ReputationStore::new();
        let mut previous = 0.0;
        for score in [0.0, 0.1, 0.5, 0.9, 1.0] {
            store.restore(BTreeMap::from([("A".to_string(), AgentReputation { score, sample_count: 1 })]));
            let weight = store.effective_weight(0.25, "A");
            assert!(weight >= previous);
            previous = weight;
        }
    }

    #[test]
    fn test_snapshot_restore() {
        let store = ReputationStore::new();
        store.apply_consensus(&summary(vec![entry(ConsensusStatus::Approved, &["A"], &[])]));
        let snapshot = store.snapshot();

        let other = ReputationStore::new();
        other.restore(snapshot.clone());
        assert_eq!(other.snapshot(), snapshot);

        other.restore(BTreeMap::from([
            ("X".to_string(), AgentReputation { score: 7.0, sample_count: 3 }),
            ("Y".to_string(), AgentReputation { score: f64::NAN, sample_count: 0 }),
        ]));
        assert_eq!(other.score("X"), 1.0);
        assert_eq!(other.score("Y"), 0.5);
        assert_eq!(other.score("A"), 0.5);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reputation.json");

        let store = ReputationStore::new();
        store.load(&path).await.unwrap();
        assert!(store.is_empty());

        store.apply_consensus(&summary(vec![entry(ConsensusStatus::Denied, &["A"], &["B"])]));
        store.save(&path).await.unwrap();

        let restored = ReputationStore::new();
        restored.load(&path).await.unwrap();
        assert_eq!(restored.snapshot(), store.snapshot());
    }
}
