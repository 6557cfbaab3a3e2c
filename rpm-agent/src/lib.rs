//! Agent plumbing for the RWA Portfolio Manager.
//!
//! The decision core treats agents and I/O as black boxes behind narrow
//! async traits:
//!
//! - [`Agent`]: `run(frame) -> Signal[]`, may be slow or fail
//! - [`ObservationSource`]: builds one [`ObservationFrame`] per tick
//! - [`ExecutionAdapter`]: submits approved actions and serves dynamic policy
//!
//! Rule-based reference agents live in [`agents`]; [`MockAgent`] is a
//! programmable agent for tests.

pub mod agent;
pub mod agents;
pub mod execution;
pub mod frame;
pub mod mock;
pub mod observe;

pub use agent::{Agent, AgentError};
pub use execution::{DryRunExecution, ExecutionAdapter, ExecutionError, SubmissionReceipt};
pub use frame::ObservationFrame;
pub use mock::MockAgent;
pub use observe::{FileObservation, ObservationError, ObservationSource, StaticObservation};

/// Result type for agent runs.
pub type Result<T> = std::result::Result<T, AgentError>;
