//! Tick scheduler - one evaluation cycle at a time on a fixed delay.
//!
//! `IDLE → OBSERVING → EVALUATING → DECIDING → EXECUTING_OR_ESCALATING → IDLE`
//!
//! The delay is measured from the end of one tick to the start of the next,
//! so a slow tick pushes the following one back. Collaborator failures are
//! audited and degrade the tick; they never end the loop.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use policy::{highest_severity, ConstraintGate, Signal};
use rpm_agent::{Agent, AgentError, ExecutionAdapter, ObservationFrame, ObservationSource};

use crate::audit::{AuditRecord, AuditSink, MemoryAuditLog};
use crate::config::OrchestratorConfig;
use crate::consensus::ConsensusAggregator;
use crate::execution::ExecutionStage;
use crate::reputation::ReputationStore;
use crate::risk::{self, RiskInputs};
use crate::state::{LiveState, LiveStatePatch, LiveStateSink};
use crate::types::{Decision, OrchestratorError, Result};

/// Note attached to escalation records.
pub const ESCALATION_NOTE: &str = "Human approval required.";

/// Where the scheduler is within a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickPhase {
    #[default]
    Idle,
    Observing,
    Evaluating,
    Deciding,
    ExecutingOrEscalating,
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Another tick was still running
    Skipped,
    /// No frame; nothing was evaluated
    ObservationFailed { error: String },
    /// A decision was made and acted on
    Decided {
        decision: Arc<Decision>,
        /// Agents that contributed no signals because they failed
        agent_failures: Vec<String>,
        /// Signals from the execution stage; empty when escalated
        execution_signals: Vec<Signal>,
    },
}

impl TickOutcome {
    /// The decision, if one was made.
    pub fn decision(&self) -> Option<&Arc<Decision>> {
        match self {
            Self::Decided { decision, .. } => Some(decision),
            _ => None,
        }
    }
}

/// Drives evaluation cycles.
pub struct TickScheduler {
    config: OrchestratorConfig,
    agents: Vec<Arc<dyn Agent>>,
    observation: Arc<dyn ObservationSource>,
    execution: ExecutionStage,
    aggregator: ConsensusAggregator,
    audit: Arc<dyn AuditSink>,
    live_state: Arc<dyn LiveStateSink>,
    reputation: Arc<ReputationStore>,
    reputation_path: Option<PathBuf>,
    phase: RwLock<TickPhase>,
    cycle: Mutex<()>,
}

impl TickScheduler {
    /// Start building a scheduler.
    pub fn builder(
        observation: Arc<dyn ObservationSource>,
        adapter: Arc<dyn ExecutionAdapter>,
    ) -> TickSchedulerBuilder {
        TickSchedulerBuilder::new(observation, adapter)
    }

    /// Current phase.
    pub async fn phase(&self) -> TickPhase {
        *self.phase.read().await
    }

    /// Shared reputation store.
    pub fn reputation(&self) -> &Arc<ReputationStore> {
        &self.reputation
    }

    /// Configuration in use.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Registered agent names, in registration order.
    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    /// Run one evaluation cycle.
    ///
    /// Returns [`TickOutcome::Skipped`] if a tick is already in progress.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_cycle) = self.cycle.try_lock() else {
            warn!("Tick already in progress, skipping");
            return TickOutcome::Skipped;
        };

        let outcome = self.run_cycle().await;
        self.enter(TickPhase::Idle).await;
        outcome
    }

    async fn run_cycle(&self) -> TickOutcome {
        let tick_at = chrono::Utc::now();

        // Observe
        self.enter(TickPhase::Observing).await;
        let frame = match self.observation.observe().await {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                error!(error = %e, "Observation failed, aborting tick");
                self.record(AuditRecord::error("observe", None, &e)).await;
                return TickOutcome::ObservationFailed { error: e.to_string() };
            }
        };
        self.live_state
            .update(
                LiveStatePatch::default()
                    .tick_at(tick_at)
                    .observed(chrono::Utc::now(), frame.clone())
                    .phase(TickPhase::Evaluating),
            )
            .await;

        // Evaluate
        self.enter(TickPhase::Evaluating).await;
        let (signals, failures) = self.evaluate(&frame).await;
        let severity = highest_severity(signals.iter());
        for signal in signals.iter() {
            self.record(AuditRecord::Signal { signal: signal.clone() }).await;
        }
        for (agent, e) in &failures {
            self.record(AuditRecord::error("agent", Some(agent.as_str()), e)).await;
        }
        let signals: Arc<[Signal]> = signals.into();
        self.live_state
            .update(
                LiveStatePatch::default()
                    .signals(signals.clone(), severity)
                    .phase(TickPhase::Deciding),
            )
            .await;

        // Decide
        self.enter(TickPhase::Deciding).await;
        let inputs = RiskInputs::from_signals(&signals, &self.config.risk);
        let assessment = risk::score(&frame.positions, inputs);
        let base = self.config.consensus.base_weights(self.agent_names());
        let weights = self.reputation.effective_weights(&base);
        let decision = Arc::new(self.aggregator.decide(signals, assessment, &weights));

        self.record(AuditRecord::Decision { decision: decision.clone() }).await;
        self.live_state
            .update(
                LiveStatePatch::default()
                    .decision(decision.clone())
                    .phase(TickPhase::ExecutingOrEscalating),
            )
            .await;

        info!(
            decision_id = %decision.id,
            risk_score = decision.risk_score,
            severity = severity.map(|s| s.as_str()).unwrap_or("NONE"),
            agent_failures = failures.len(),
            "Tick decided"
        );

        // Execute or escalate
        self.enter(TickPhase::ExecutingOrEscalating).await;
        let execution_signals = if decision.escalation_required {
            info!(
                decision_id = %decision.id,
                reasons = %decision.escalation_reasons.join(" "),
                "Escalating to human oversight"
            );
            self.record(AuditRecord::Escalation {
                decision_id: decision.id.clone(),
                note: ESCALATION_NOTE.to_string(),
                reasons: decision.escalation_reasons.clone(),
            })
            .await;
            Vec::new()
        } else {
            self.execute(&frame, &decision).await
        };

        // Reputation, once per tick, after the decision is final
        self.reputation.apply_consensus(&decision.consensus);
        if let Some(path) = &self.reputation_path {
            if let Err(e) = self.reputation.save(path).await {
                warn!(path = %path.display(), error = %e, "Failed to persist reputation");
                self.record(AuditRecord::error("reputation", None, &e)).await;
            }
        }
        self.live_state
            .update(LiveStatePatch::default().phase(TickPhase::Idle))
            .await;

        TickOutcome::Decided {
            decision,
            agent_failures: failures.into_iter().map(|(agent, _)| agent).collect(),
            execution_signals,
        }
    }

    /// Fan out to every agent and wait for all of them.
    ///
    /// Signals come back in agent-registration order. An agent that errors,
    /// panics or times out contributes nothing.
    async fn evaluate(&self, frame: &Arc<ObservationFrame>) -> (Vec<Signal>, Vec<(String, String)>) {
        let timeout = self.config.scheduler.agent_timeout();

        let handles = self.agents.iter().map(|agent| {
            let agent = agent.clone();
            let frame = frame.clone();
            tokio::spawn(async move { run_agent(agent.as_ref(), &frame, timeout).await })
        });
        let results = join_all(handles).await;

        let mut signals = Vec::new();
        let mut failures = Vec::new();
        for (agent, result) in self.agents.iter().zip(results) {
            let name = agent.name();
            match result {
                Ok(Ok(mut produced)) => {
                    debug!(agent = %name, signals = produced.len(), "Agent finished");
                    for signal in produced.iter_mut() {
                        if signal.agent != name {
                            warn!(agent = %name, claimed = %signal.agent, "Signal agent mismatch, using registered name");
                            signal.agent = name.to_string();
                        }
                    }
                    signals.extend(produced);
                }
                Ok(Err(e)) => {
                    warn!(agent = %name, error = %e, "Agent failed");
                    failures.push((name.to_string(), e.to_string()));
                }
                Err(join_error) => {
                    error!(agent = %name, error = %join_error, "Agent task panicked");
                    failures.push((name.to_string(), format!("Agent task panicked: {}", join_error)));
                }
            }
        }

        (signals, failures)
    }

    async fn execute(&self, frame: &ObservationFrame, decision: &Decision) -> Vec<Signal> {
        match self
            .execution
            .execute(&frame.positions, decision.risk_score, &decision.approved_actions)
            .await
        {
            Ok(report) => {
                for signal in &report.signals {
                    self.record(AuditRecord::Signal { signal: signal.clone() }).await;
                }
                for failure in &report.failures {
                    self.record(AuditRecord::error("execution", None, failure)).await;
                }
                info!(
                    decision_id = %decision.id,
                    approved = decision.approved_actions.len(),
                    submitted = report.submitted(),
                    "Execution finished"
                );
                report.signals
            }
            Err(e) => {
                error!(decision_id = %decision.id, error = %e, "Execution stage failed");
                self.record(AuditRecord::error("execution", None, &e)).await;
                Vec::new()
            }
        }
    }

    /// Tick until cancelled; returns the number of ticks run.
    ///
    /// Setting the channel to `true` or dropping its sender cancels. A tick
    /// in progress completes; no further sleep or tick starts.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) -> u64 {
        let interval = self.config.scheduler.tick_interval();
        let mut ticks = 0u64;

        info!(
            agents = self.agents.len(),
            interval_secs = interval.as_secs(),
            "Scheduler started"
        );

        loop {
            if is_cancelled(&cancel) {
                break;
            }
            self.tick().await;
            ticks += 1;
            if is_cancelled(&cancel) {
                break;
            }
            if !sleep_or_cancel(interval, &mut cancel).await {
                break;
            }
        }

        info!(ticks, "Scheduler stopped");
        ticks
    }

    /// Internal phase only; live state gets its phase with each stage's patch.
    async fn enter(&self, phase: TickPhase) {
        *self.phase.write().await = phase;
    }

    async fn record(&self, record: AuditRecord) {
        let kind = record.kind();
        if let Err(e) = self.audit.append(record).await {
            error!(kind, error = %e, "Failed to append audit record");
        }
    }
}

async fn run_agent(
    agent: &dyn Agent,
    frame: &ObservationFrame,
    timeout: Option<Duration>,
) -> rpm_agent::Result<Vec<Signal>> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, agent.run(frame))
            .await
            .map_err(|_| AgentError::Unavailable(format!("timed out after {}ms", limit.as_millis())))?,
        None => agent.run(frame).await,
    }
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

/// Sleep for `interval`; `false` if cancelled first.
async fn sleep_or_cancel(interval: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    info!("Cancellation received");
                    return false;
                }
            }
        }
    }
}

/// Builder for [`TickScheduler`].
pub struct TickSchedulerBuilder {
    config: OrchestratorConfig,
    agents: Vec<Arc<dyn Agent>>,
    observation: Arc<dyn ObservationSource>,
    adapter: Arc<dyn ExecutionAdapter>,
    audit: Option<Arc<dyn AuditSink>>,
    live_state: Option<Arc<dyn LiveStateSink>>,
    reputation: Option<Arc<ReputationStore>>,
    reputation_path: Option<PathBuf>,
}

impl TickSchedulerBuilder {
    /// Create a builder with default config and no agents.
    pub fn new(observation: Arc<dyn ObservationSource>, adapter: Arc<dyn ExecutionAdapter>) -> Self {
        Self {
            config: OrchestratorConfig::default(),
            agents: Vec::new(),
            observation,
            adapter,
            audit: None,
            live_state: None,
            reputation: None,
            reputation_path: None,
        }
    }

    /// Set config.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an agent.
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Register several agents.
    pub fn with_agents(mut self, agents: impl IntoIterator<Item = Arc<dyn Agent>>) -> Self {
        self.agents.extend(agents);
        self
    }

    /// Set audit sink (default: in-memory).
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Set live-state sink (default: in-memory).
    pub fn with_live_state(mut self, live_state: Arc<dyn LiveStateSink>) -> Self {
        self.live_state = Some(live_state);
        self
    }

    /// Share a reputation store.
    pub fn with_reputation(mut self, reputation: Arc<ReputationStore>) -> Self {
        self.reputation = Some(reputation);
        self
    }

    /// Persist reputation to this file after every tick.
    pub fn persist_reputation(mut self, path: impl Into<PathBuf>) -> Self {
        self.reputation_path = Some(path.into());
        self
    }

    /// Set the inter-tick delay.
    pub fn tick_secs(mut self, secs: u64) -> Self {
        self.config.scheduler.tick_secs = secs;
        self
    }

    /// Set a per-agent timeout.
    pub fn agent_timeout_ms(mut self, ms: u64) -> Self {
        self.config.scheduler.agent_timeout_ms = Some(ms);
        self
    }

    /// Validate config and build.
    pub fn build(self) -> Result<TickScheduler> {
        self.config.validate()?;

        let mut seen = std::collections::BTreeSet::new();
        if let Some(dup) = self.agents.iter().map(|a| a.name()).find(|n| !seen.insert(*n)) {
            return Err(OrchestratorError::Config(format!("agent {} registered twice", dup)));
        }
        self.config
            .consensus
            .validate_agents(self.agents.iter().map(|a| a.name()))?;

        let gate = ConstraintGate::with_critical_risk_score(self.config.consensus.critical_risk_score);
        Ok(TickScheduler {
            aggregator: ConsensusAggregator::with_config(self.config.consensus.clone()),
            execution: ExecutionStage::with_gate(self.adapter, gate),
            config: self.config,
            agents: self.agents,
            observation: self.observation,
            audit: self.audit.unwrap_or_else(|| Arc::new(MemoryAuditLog::new())),
            live_state: self.live_state.unwrap_or_else(|| Arc::new(LiveState::new())),
            reputation: self.reputation.unwrap_or_default(),
            reputation_path: self.reputation_path,
            phase: RwLock::new(TickPhase::Idle),
            cycle: Mutex::new(()),
        })
    }
}
