//! Mock agent for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use policy::Signal;

use crate::agent::{Agent, AgentError};
use crate::frame::ObservationFrame;

#[derive(Debug, Clone)]
enum Behavior {
    Respond,
    Fail(String),
    Panic,
    Hang,
}

/// Mock agent for testing.
///
/// Returns preset signals, or fails, panics or never returns.
pub struct MockAgent {
    name: String,
    signals: Vec<Signal>,
    behavior: Behavior,
    delay: Option<Duration>,
    call_count: AtomicU32,
}

impl MockAgent {
    /// Create a mock agent that returns no signals.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signals: Vec::new(),
            behavior: Behavior::Respond,
            delay: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Add a signal to return; its `agent` is overwritten with this agent's name.
    pub fn with_signal(mut self, mut signal: Signal) -> Self {
        signal.agent = self.name.clone();
        self.signals.push(signal);
        self
    }

    /// Return an error from every run.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::Fail(message.into());
        self
    }

    /// Panic inside every run.
    pub fn panicking(mut self) -> Self {
        self.behavior = Behavior::Panic;
        self
    }

    /// Never return.
    pub fn hanging(mut self) -> Self {
        self.behavior = Behavior::Hang;
        self
    }

    /// Sleep before responding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times run was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _frame: &ObservationFrame) -> crate::Result<Vec<Signal>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            Behavior::Respond => Ok(self.signals.clone()),
            Behavior::Fail(message) => Err(AgentError::Failed(message.clone())),
            Behavior::Panic => panic!("mock agent {} panicked", self.name),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }
}
