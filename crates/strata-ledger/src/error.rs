use thiserror::Error;

/// Errors from the relational ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Proposal {proposal_id} cannot move from {expected} to {to} (currently {actual})")]
    InvalidTransition {
        proposal_id: String,
        expected: String,
        to: String,
        actual: String,
    },

    #[error("Tenant {tenant_id} is no longer at version {expected}")]
    VersionRace { tenant_id: String, expected: i64 },

    #[error("Corrupt row: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
