//! Execution adapters.
//!
//! The adapter submits gate-approved actions and serves the loose policy map
//! the constraint gate reads. Real ledger submission is out of scope; the
//! dry-run adapter logs and hashes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

use policy::ActionIntent;

/// Error types for execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The venue refused the action
    #[error("Submission rejected: {0}")]
    Rejected(String),

    /// The venue is unreachable
    #[error("Venue unavailable: {0}")]
    Unavailable(String),
}

/// Proof of submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub tx_hash: String,
}

/// Submits actions to an execution venue.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Submit one approved action.
    async fn submit_action(&self, intent: &ActionIntent) -> Result<SubmissionReceipt, ExecutionError>;

    /// Current venue policy values.
    async fn get_dynamic_constraints(
        &self,
    ) -> Result<BTreeMap<String, serde_json::Value>, ExecutionError>;
}

/// Logs submissions and returns deterministic `0x` hashes.
///
/// The n-th submission of an action always yields the same hash for the same
/// action key.
pub struct DryRunExecution {
    policy: BTreeMap<String, serde_json::Value>,
    fail_submissions: AtomicBool,
    fail_constraints: AtomicBool,
    sequence: AtomicU64,
    submitted: RwLock<Vec<ActionIntent>>,
}

impl DryRunExecution {
    /// Create an adapter serving an empty policy map.
    pub fn new() -> Self {
        Self {
            policy: BTreeMap::new(),
            fail_submissions: AtomicBool::new(false),
            fail_constraints: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            submitted: RwLock::new(Vec::new()),
        }
    }

    /// Serve these policy values.
    pub fn with_policy(mut self, policy: BTreeMap<String, serde_json::Value>) -> Self {
        self.policy = policy;
        self
    }

    /// Set one policy value.
    pub fn with_policy_value(mut self, key: &str, value: serde_json::Value) -> Self {
        self.policy.insert(key.to_string(), value);
        self
    }

    /// Reject every submission.
    pub fn with_failing_submissions(self, failing: bool) -> Self {
        self.fail_submissions.store(failing, Ordering::SeqCst);
        self
    }

    /// Fail policy lookups.
    pub fn with_failing_constraints(self, failing: bool) -> Self {
        self.fail_constraints.store(failing, Ordering::SeqCst);
        self
    }

    /// Actions submitted so far, in order.
    pub async fn submitted(&self) -> Vec<ActionIntent> {
        self.submitted.read().await.clone()
    }
}

impl Default for DryRunExecution {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionAdapter for DryRunExecution {
    async fn submit_action(&self, intent: &ActionIntent) -> Result<SubmissionReceipt, ExecutionError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(ExecutionError::Rejected("Dry-run submissions disabled".to_string()));
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let key = intent.key();
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        hasher.update(seq.to_be_bytes());
        let tx_hash = format!("0x{}", hex::encode(hasher.finalize()));

        info!(
            action = %intent.action_type,
            action_id = %key.short_id(),
            tx_hash = %tx_hash,
            "Dry-run submission"
        );

        self.submitted.write().await.push(intent.clone());
        Ok(SubmissionReceipt { tx_hash })
    }

    async fn get_dynamic_constraints(
        &self,
    ) -> Result<BTreeMap<String, serde_json::Value>, ExecutionError> {
        if self.fail_constraints.load(Ordering::SeqCst) {
            return Err(ExecutionError::Unavailable("Dry-run policy lookup disabled".to_string()));
        }
        Ok(self.policy.clone())
    }
}
