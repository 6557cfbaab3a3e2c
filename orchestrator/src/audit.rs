//! Append-only audit trail.
//!
//! Records within one tick are appended in order: agent signals, agent
//! failures, the decision, then execution signals or the escalation record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use policy::Signal;

use crate::types::{Decision, OrchestratorError, Result};

/// Maximum records kept by [`MemoryAuditLog`] before pruning.
const MAX_MEMORY_RECORDS: usize = 10_000;

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuditRecord {
    /// A signal from an agent or the execution stage
    Signal { signal: Signal },
    /// A finalized decision
    Decision { decision: Arc<Decision> },
    /// A collaborator failure
    Error {
        /// Stage that failed, e.g. "observe", "agent", "execution"
        stage: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
        error: String,
    },
    /// The decision was routed to human oversight
    Escalation {
        #[serde(rename = "decisionId")]
        decision_id: String,
        note: String,
        reasons: Vec<String>,
    },
}

impl AuditRecord {
    /// Record a collaborator failure.
    pub fn error(stage: &str, agent: Option<&str>, error: impl ToString) -> Self {
        Self::Error {
            stage: stage.to_string(),
            agent: agent.map(str::to_string),
            error: error.to_string(),
        }
    }

    /// Record type tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Signal { .. } => "signal",
            Self::Decision { .. } => "decision",
            Self::Error { .. } => "error",
            Self::Escalation { .. } => "escalation",
        }
    }
}

/// A record as written to disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLine {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub record: AuditRecord,
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record.
    async fn append(&self, record: AuditRecord) -> Result<()>;
}

/// Newline-delimited JSON audit file.
pub struct JsonlAuditLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JsonlAuditLog {
    /// Open `path` for appending, creating it if needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Audit file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        let line = AuditLine { ts: Utc::now(), record };
        let mut json = serde_json::to_string(&line)?;
        json.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| OrchestratorError::Audit(format!("{}: {}", self.path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| OrchestratorError::Audit(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

/// In-memory audit trail, oldest records pruned first.
pub struct MemoryAuditLog {
    records: RwLock<VecDeque<AuditRecord>>,
}

impl MemoryAuditLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
        }
    }

    /// All records in append order.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.iter().cloned().collect()
    }

    /// Record type tags in append order.
    pub async fn kinds(&self) -> Vec<&'static str> {
        self.records.read().await.iter().map(AuditRecord::kind).collect()
    }

    /// Number of records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push_back(record);
        while records.len() > MAX_MEMORY_RECORDS {
            records.pop_front();
        }
        Ok(())
    }
}
