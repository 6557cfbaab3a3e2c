//! Live runtime state for external status readers.
//!
//! Last write wins. A stage only patches the fields it produced, so a failed
//! stage leaves the previous values in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use policy::{Severity, Signal};
use rpm_agent::ObservationFrame;

use crate::scheduler::TickPhase;
use crate::types::Decision;

/// Full live-state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStateSnapshot {
    pub ok: bool,
    pub server_time: DateTime<Utc>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_observed_at: Option<DateTime<Utc>>,
    pub last_frame: Option<Arc<ObservationFrame>>,
    pub last_signals: Option<Arc<[Signal]>>,
    pub last_decision: Option<Arc<Decision>>,
    pub last_risk_score: Option<u8>,
    pub last_severity: Option<Severity>,
    pub phase: TickPhase,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct LiveStatePatch {
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_observed_at: Option<DateTime<Utc>>,
    pub last_frame: Option<Arc<ObservationFrame>>,
    pub last_signals: Option<Arc<[Signal]>>,
    pub last_decision: Option<Arc<Decision>>,
    pub last_risk_score: Option<u8>,
    pub last_severity: Option<Severity>,
    pub phase: Option<TickPhase>,
}

impl LiveStatePatch {
    pub fn tick_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_tick_at = Some(at);
        self
    }

    pub fn observed(mut self, at: DateTime<Utc>, frame: Arc<ObservationFrame>) -> Self {
        self.last_observed_at = Some(at);
        self.last_frame = Some(frame);
        self
    }

    pub fn signals(mut self, signals: Arc<[Signal]>, severity: Option<Severity>) -> Self {
        self.last_signals = Some(signals);
        self.last_severity = severity;
        self
    }

    pub fn decision(mut self, decision: Arc<Decision>) -> Self {
        self.last_risk_score = Some(decision.risk_score);
        self.last_decision = Some(decision);
        self
    }

    pub fn phase(mut self, phase: TickPhase) -> Self {
        self.phase = Some(phase);
        self
    }
}

/// Accepts partial live-state updates.
#[async_trait]
pub trait LiveStateSink: Send + Sync {
    /// Merge a patch into the current state.
    async fn update(&self, patch: LiveStatePatch);
}

/// In-memory live state.
pub struct LiveState {
    inner: RwLock<LiveStateSnapshot>,
}

impl LiveState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LiveStateSnapshot {
                ok: true,
                server_time: Utc::now(),
                ..LiveStateSnapshot::default()
            }),
        }
    }

    /// Current snapshot.
    pub async fn snapshot(&self) -> LiveStateSnapshot {
        self.inner.read().await.clone()
    }
}

impl Default for LiveState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveStateSink for LiveState {
    async fn update(&self, patch: LiveStatePatch) {
        let mut state = self.inner.write().await;
        state.ok = true;
        state.server_time = Utc::now();
        if let Some(at) = patch.last_tick_at {
            state.last_tick_at = Some(at);
        }
        if let Some(at) = patch.last_observed_at {
            state.last_observed_at = Some(at);
        }
        if let Some(frame) = patch.last_frame {
            state.last_frame = Some(frame);
        }
        if let Some(signals) = patch.last_signals {
            state.last_signals = Some(signals);
            state.last_severity = patch.last_severity;
        }
        if let Some(decision) = patch.last_decision {
            state.last_decision = Some(decision);
        }
        if let Some(score) = patch.last_risk_score {
            state.last_risk_score = Some(score);
        }
        if let Some(phase) = patch.phase {
            state.phase = phase;
        }
    }
}
