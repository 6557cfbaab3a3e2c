//! Decision orchestrator for the RWA Portfolio Manager.
//!
//! One evaluation cycle ("tick") runs these stages in order:
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────────────┐   ┌──────────────────────────┐
//! │ OBSERVING │──▶│  EVALUATING  │──▶│       DECIDING       │──▶│ EXECUTING_OR_ESCALATING  │
//! │  frame    │   │ agents fan   │   │ risk score, weights, │   │ gate + submit, or record │
//! │           │   │ out / in     │   │ consensus, Decision  │   │ escalation; reputation   │
//! └───────────┘   └──────────────┘   └──────────────────────┘   └──────────────────────────┘
//! ```
//!
//! Only one tick runs at a time. The [`ReputationStore`] and the
//! [`LiveState`] snapshot are the only state that outlives a tick.

pub mod audit;
pub mod config;
pub mod consensus;
pub mod execution;
pub mod reputation;
pub mod risk;
pub mod scheduler;
pub mod state;
pub mod types;

pub use audit::{AuditRecord, AuditSink, JsonlAuditLog, MemoryAuditLog};
pub use config::OrchestratorConfig;
pub use consensus::ConsensusAggregator;
pub use execution::ExecutionStage;
pub use reputation::{AgentReputation, ReputationStore};
pub use risk::{RiskAssessment, RiskInputs};
pub use scheduler::{TickOutcome, TickPhase, TickScheduler};
pub use state::{LiveState, LiveStatePatch, LiveStateSink, LiveStateSnapshot};
pub use types::*;
