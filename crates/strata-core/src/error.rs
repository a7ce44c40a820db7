use thiserror::Error;

/// Top-level error type for shared Strata code.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Proposal(#[from] ProposalError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for CoreError {
    fn from(e: config::ConfigError) -> Self {
        CoreError::Config(e.to_string())
    }
}

/// Validation failures raised before a proposal is ever created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    #[error("proposal has no operations")]
    Empty,

    #[error("evidence required for {op_type} operation {op_id}")]
    EvidenceRequired { op_id: String, op_type: String },

    #[error("malformed operation {op_id}: {reason}")]
    MalformedOperation { op_id: String, reason: String },

    #[error("could not serialize operations: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
