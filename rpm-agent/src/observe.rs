//! Observation sources.
//!
//! A source builds one [`ObservationFrame`] per tick. A failure aborts that
//! tick; nothing is retried mid-cycle.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::frame::ObservationFrame;

/// Error types for observation.
#[derive(Debug, thiserror::Error)]
pub enum ObservationError {
    /// Reading the source failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The source returned something that is not a frame
    #[error("Parse error: {0}")]
    Parse(String),

    /// The source is down
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Builds observation frames.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Observe the portfolio once.
    async fn observe(&self) -> Result<ObservationFrame, ObservationError>;
}

/// Reads a JSON or YAML frame fixture on every call.
///
/// Files ending in `.yaml` or `.yml` are parsed as YAML, anything else as JSON.
pub struct FileObservation {
    path: PathBuf,
}

impl FileObservation {
    /// Create a source over a fixture file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Fixture path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_yaml(&self) -> bool {
        matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
    }
}

#[async_trait]
impl ObservationSource for FileObservation {
    async fn observe(&self) -> Result<ObservationFrame, ObservationError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let frame: ObservationFrame = if self.is_yaml() {
            serde_yaml::from_str(&raw).map_err(|e| ObservationError::Parse(e.to_string()))?
        } else {
            serde_json::from_str(&raw).map_err(|e| ObservationError::Parse(e.to_string()))?
        };

        debug!(
            path = %self.path.display(),
            positions = frame.positions.len(),
            datapoints = frame.data.len(),
            "Loaded observation frame"
        );
        Ok(frame)
    }
}

/// Serves a fixed in-memory frame.
pub struct StaticObservation {
    frame: RwLock<ObservationFrame>,
    failing: AtomicBool,
    call_count: AtomicU32,
}

impl StaticObservation {
    /// Create a source serving `frame`.
    pub fn new(frame: ObservationFrame) -> Self {
        Self {
            frame: RwLock::new(frame),
            failing: AtomicBool::new(false),
            call_count: AtomicU32::new(0),
        }
    }

    /// Make every call fail.
    pub fn with_failing(self, failing: bool) -> Self {
        self.failing.store(failing, Ordering::SeqCst);
        self
    }

    /// Toggle failure at runtime.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Replace the served frame.
    pub async fn set_frame(&self, frame: ObservationFrame) {
        *self.frame.write().await = frame;
    }

    /// Number of observe calls so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for StaticObservation {
    fn default() -> Self {
        Self::new(ObservationFrame::default())
    }
}

#[async_trait]
impl ObservationSource for StaticObservation {
    async fn observe(&self) -> Result<ObservationFrame, ObservationError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(ObservationError::Unavailable("Static source disabled".to_string()));
        }
        Ok(self.frame.read().await.clone())
    }
}
