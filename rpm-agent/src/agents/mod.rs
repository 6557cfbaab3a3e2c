//! Rule-based reference agents.
//!
//! Deterministic evaluators over a single frame. None of them call out to
//! external services.

pub mod compliance;
pub mod credit;
pub mod data_provenance;
pub mod liquidity;
pub mod strategy;
pub mod valuation;

pub use compliance::ComplianceAgent;
pub use credit::CreditCounterpartyAgent;
pub use data_provenance::DataProvenanceAgent;
pub use liquidity::LiquidityAgent;
pub use strategy::StrategyAgent;
pub use valuation::ValuationOracleAgent;

use std::sync::Arc;

use crate::agent::Agent;

/// All reference agents in registration order.
pub fn reference_agents() -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(DataProvenanceAgent::new()),
        Arc::new(ValuationOracleAgent::new()),
        Arc::new(LiquidityAgent::new()),
        Arc::new(CreditCounterpartyAgent::new()),
        Arc::new(StrategyAgent::new()),
        Arc::new(ComplianceAgent::new()),
    ]
}
