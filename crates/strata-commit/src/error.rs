//! Error types for the strata-commit crate.
//!
//! Conflicts, integrity failures and deferrals are outcomes, not errors; an
//! `Err` here means the work can be retried once the cause is fixed.

use thiserror::Error;

use strata_core::types::ProposalStatus;

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] strata_ledger::LedgerError),

    #[error("Graph error: {0}")]
    Graph(#[from] strata_graph::GraphError),

    #[error("Invalid proposal: {0}")]
    Proposal(#[from] strata_core::ProposalError),

    #[error("Proposal {proposal_id} is {status}, cannot {action}")]
    InvalidState {
        proposal_id: String,
        status: ProposalStatus,
        action: &'static str,
    },

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CommitError>;
