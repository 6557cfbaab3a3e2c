//! The agent trait.

use async_trait::async_trait;
use policy::Signal;

use crate::frame::ObservationFrame;

/// Error types for agent runs.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent gave up on this frame
    #[error("Agent failed: {0}")]
    Failed(String),

    /// A data source the agent depends on is down
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// An independent evaluator.
///
/// Agents must not share state with one another; each sees the same frame
/// and returns zero or more signals for the cycle.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent identity, used for weights, reputation and vetoes.
    fn name(&self) -> &str;

    /// Evaluate one observation frame.
    async fn run(&self, frame: &ObservationFrame) -> crate::Result<Vec<Signal>>;
}
