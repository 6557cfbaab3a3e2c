//! Full evaluation-cycle integration tests

use std::sync::Arc;
use std::time::Duration;

use orchestrator::config::ConsensusConfig;
use orchestrator::consensus::{OPPOSE_DENIAL, VETO_DENIAL};
use orchestrator::{
    AuditRecord, ConsensusStatus, JsonlAuditLog, LiveState, MemoryAuditLog, OrchestratorConfig, ReputationStore,
    TickOutcome, TickPhase, TickScheduler,
};
use policy::{ActionIntent, ActionType, Severity, Signal, SignalKind, Stance};
use rpm_agent::{Agent, DryRunExecution, MockAgent, ObservationFrame, StaticObservation};

fn recommending(action_type: ActionType) -> Signal {
    Signal::new("unset", SignalKind::Strategy, Severity::Info, "proposal")
        .with_confidence(1.0)
        .with_stance(Stance::Support)
        .with_reason("proposed")
        .recommend(ActionIntent::new(action_type, "proposed"))
}

fn opposing() -> Signal {
    Signal::new("unset", SignalKind::Risk, Severity::Warn, "against").with_stance(Stance::Oppose)
}

fn veto() -> Signal {
    Signal::new("unset", SignalKind::Compliance, Severity::Critical, "Sanctioned exposure")
        .with_confidence(0.92)
        .with_stance(Stance::Oppose)
        .with_veto(true)
}

fn agent(name: &str, signal: Signal) -> Arc<dyn Agent> {
    Arc::new(MockAgent::new(name).with_signal(signal))
}

fn config_with_threshold(threshold_weight: f64) -> OrchestratorConfig {
    OrchestratorConfig {
        consensus: ConsensusConfig {
            threshold_weight,
            ..ConsensusConfig::default()
        },
        ..OrchestratorConfig::default()
    }
}

struct Harness {
    scheduler: Arc<TickScheduler>,
    audit: Arc<MemoryAuditLog>,
    venue: Arc<DryRunExecution>,
    live: Arc<LiveState>,
    observation: Arc<StaticObservation>,
}

fn harness(config: OrchestratorConfig, agents: Vec<Arc<dyn Agent>>) -> Harness {
    let audit = Arc::new(MemoryAuditLog::new());
    let venue = Arc::new(DryRunExecution::new());
    let live = Arc::new(LiveState::new());
    let observation = Arc::new(StaticObservation::new(ObservationFrame::new()));

    let scheduler = TickScheduler::builder(observation.clone(), venue.clone())
        .with_config(config)
        .with_agents(agents)
        .with_audit(audit.clone())
        .with_live_state(live.clone())
        .build()
        .unwrap();

    Harness {
        scheduler: Arc::new(scheduler),
        audit,
        venue,
        live,
        observation,
    }
}

#[tokio::test]
async fn test_two_agents_agree_on_rebalance() {
    let h = harness(
        OrchestratorConfig::default(),
        vec![
            agent("a", recommending(ActionType::Rebalance)),
            agent("b", recommending(ActionType::Rebalance)),
        ],
    );

    let outcome = h.scheduler.tick().await;
    let decision = outcome.decision().unwrap();

    assert!(!decision.escalation_required);
    assert_eq!(decision.consensus.approved.len(), 1);
    let entry = &decision.consensus.approved[0];
    assert_eq!(entry.status, ConsensusStatus::Approved);
    assert!((entry.support_weight - 1.0).abs() < 1e-9);

    let submitted = h.venue.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].action_type, ActionType::Rebalance);

    assert_eq!(h.audit.kinds().await, vec!["signal", "signal", "decision", "signal"]);
}

#[tokio::test]
async fn test_veto_denies_hedge_but_not_pause() {
    // Three agents at 1/3 each; PAUSE clears a 0.3 threshold.
    let h = harness(
        config_with_threshold(0.3),
        vec![
            agent("StrategyAgent", recommending(ActionType::Hedge)),
            agent("ComplianceAgent", veto()),
            agent("Sentinel", recommending(ActionType::Pause)),
        ],
    );

    let outcome = h.scheduler.tick().await;
    let decision = outcome.decision().unwrap();

    assert_eq!(decision.denied_actions.len(), 1);
    assert_eq!(decision.denied_actions[0].intent.action_type, ActionType::Hedge);
    assert!(decision.denied_actions[0].reason.to_lowercase().contains("veto"));
    assert!(decision.consensus.denied[0].reasons.iter().any(|r| r == VETO_DENIAL));

    assert_eq!(decision.approved_actions.len(), 1);
    assert_eq!(decision.approved_actions[0].action_type, ActionType::Pause);

    // Vetoed cycles escalate and submit nothing.
    assert!(decision.escalation_required);
    assert!(h.venue.submitted().await.is_empty());
    assert_eq!(
        h.audit.kinds().await,
        vec!["signal", "signal", "signal", "decision", "escalation"]
    );
    match h.audit.records().await.last() {
        Some(AuditRecord::Escalation { decision_id, note, reasons }) => {
            assert_eq!(decision_id, &decision.id);
            assert_eq!(note, "Human approval required.");
            assert_eq!(reasons, &decision.escalation_reasons);
        }
        other => panic!("expected escalation record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failing_agents_are_isolated() {
    let h = harness(
        config_with_threshold(0.3),
        vec![
            agent("healthy", recommending(ActionType::Rebalance)),
            Arc::new(MockAgent::new("broken").failing("feed down")),
            Arc::new(MockAgent::new("crashy").panicking()),
        ],
    );

    match h.scheduler.tick().await {
        TickOutcome::Decided {
            decision,
            agent_failures,
            execution_signals,
        } => {
            assert_eq!(agent_failures, vec!["broken", "crashy"]);
            assert_eq!(decision.signals.len(), 1);
            assert_eq!(decision.signals[0].agent, "healthy");
            assert_eq!(decision.approved_actions.len(), 1);
            assert_eq!(execution_signals.len(), 1);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert_eq!(
        h.audit.kinds().await,
        vec!["signal", "error", "error", "decision", "signal"]
    );
    let records = h.audit.records().await;
    match &records[1] {
        AuditRecord::Error { stage, agent, error } => {
            assert_eq!(stage, "agent");
            assert_eq!(agent.as_deref(), Some("broken"));
            assert!(error.contains("feed down"));
        }
        other => panic!("expected error record, got {:?}", other),
    }
    assert_eq!(h.scheduler.phase().await, TickPhase::Idle);
}

#[tokio::test]
async fn test_observation_failure_keeps_previous_snapshot() {
    let h = harness(
        OrchestratorConfig::default(),
        vec![agent("a", recommending(ActionType::Rebalance))],
    );

    let first = h.scheduler.tick().await;
    let first_id = first.decision().unwrap().id.clone();
    let before = h.live.snapshot().await;

    tokio::time::sleep(Duration::from_millis(5)).await;
    h.observation.set_failing(true);
    let outcome = h.scheduler.tick().await;
    assert!(matches!(outcome, TickOutcome::ObservationFailed { .. }));

    let after = h.live.snapshot().await;
    assert_eq!(after, before);
    assert_eq!(after.last_decision.as_ref().map(|d| d.id.clone()), Some(first_id));
    assert_eq!(after.phase, TickPhase::Idle);

    assert_eq!(h.audit.kinds().await.last(), Some(&"error"));
}

#[tokio::test]
async fn test_reputation_updates_once_per_tick() {
    let reputation = Arc::new(ReputationStore::new());
    let scheduler = TickScheduler::builder(
        Arc::new(StaticObservation::default()),
        Arc::new(DryRunExecution::new()),
    )
    .with_agents(vec![
        agent("a", recommending(ActionType::Rebalance)),
        agent("b", recommending(ActionType::Rebalance)),
    ])
    .with_reputation(reputation.clone())
    .build()
    .unwrap();

    scheduler.tick().await;
    assert!((reputation.score("a") - 0.52).abs() < 1e-9);
    assert_eq!(reputation.get("a").sample_count, 1);

    let second = scheduler.tick().await;
    assert!((reputation.score("b") - 0.54).abs() < 1e-9);
    assert_eq!(reputation.get("b").sample_count, 2);

    // The second decision was weighted with the first tick's reputation.
    let weights = &second.decision().unwrap().agent_weights;
    assert!((weights["a"] - 0.5 * 1.02).abs() < 1e-9);
}

#[tokio::test]
async fn test_persisted_reputation_and_jsonl_audit() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let reputation_path = dir.path().join("reputation.json");

    let scheduler = TickScheduler::builder(
        Arc::new(StaticObservation::default()),
        Arc::new(DryRunExecution::new()),
    )
    .with_agents(vec![
        agent("a", recommending(ActionType::Rebalance)),
        agent("b", recommending(ActionType::Rebalance)),
    ])
    .with_audit(Arc::new(JsonlAuditLog::open(&audit_path).await.unwrap()))
    .persist_reputation(&reputation_path)
    .build()
    .unwrap();
    scheduler.tick().await;

    let raw = tokio::fs::read_to_string(&audit_path).await.unwrap();
    let types: Vec<String> = raw
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(types, vec!["signal", "signal", "decision", "signal"]);

    let restored = ReputationStore::new();
    restored.load(&reputation_path).await.unwrap();
    assert!((restored.score("a") - 0.52).abs() < 1e-9);
}

#[tokio::test]
async fn test_oppose_weight_applies_to_every_action() {
    // "skeptic" recommends nothing, yet its OPPOSE stance counts against
    // the action "planner" proposed.
    let h = harness(
        config_with_threshold(0.6),
        vec![
            agent("planner", recommending(ActionType::Rebalance)),
            agent("skeptic", opposing()),
            agent("doubter", opposing()),
        ],
    );

    let outcome = h.scheduler.tick().await;
    let decision = outcome.decision().unwrap();

    assert_eq!(decision.consensus.denied.len(), 1);
    let entry = &decision.consensus.denied[0];
    assert!(entry.oppose_agents.contains("skeptic"));
    assert!(entry.oppose_agents.contains("doubter"));
    assert!((entry.oppose_weight - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(decision.denied_actions[0].reason, OPPOSE_DENIAL);
    assert!(h.venue.submitted().await.is_empty());
}

#[tokio::test]
async fn test_cancellation_stops_loop() {
    let h = harness(
        OrchestratorConfig::default(),
        vec![agent("a", recommending(ActionType::Pause))],
    );
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    let scheduler = h.scheduler.clone();
    let running = tokio::spawn(async move { scheduler.run(cancel_rx).await });

    while h.audit.len().await == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel_tx.send(true).unwrap();

    let ticks = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ticks, 1);
}

#[tokio::test]
async fn test_cancel_during_tick_finishes_the_tick() {
    let slow: Arc<dyn Agent> = Arc::new(
        MockAgent::new("slow")
            .with_signal(recommending(ActionType::Pause))
            .with_delay(Duration::from_millis(300)),
    );
    let h = harness(OrchestratorConfig::default(), vec![slow]);
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    let scheduler = h.scheduler.clone();
    let running = tokio::spawn(async move { scheduler.run(cancel_rx).await });

    while h.scheduler.phase().await != TickPhase::Evaluating {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cancel_tx.send(true).unwrap();
    assert!(h.audit.is_empty().await);

    let ticks = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ticks, 1);
    assert_eq!(h.audit.kinds().await, vec!["signal", "decision", "signal"]);
    assert_eq!(h.venue.submitted().await.len(), 1);
    assert_eq!(h.scheduler.phase().await, TickPhase::Idle);
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let h = harness(OrchestratorConfig::default(), vec![]);
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(true);

    assert_eq!(h.scheduler.run(cancel_rx).await, 0);
    assert!(h.audit.is_empty().await);
    drop(cancel_tx);

    let (dropped_tx, dropped_rx) = tokio::sync::watch::channel(false);
    drop(dropped_tx);
    assert_eq!(h.scheduler.run(dropped_rx).await, 0);
}
