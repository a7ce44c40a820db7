//! strata-commit: The commit control plane.
//!
//! Drives proposals through rebase, integrity, graph apply and ledger
//! recording; drains the outbox to delivery channels; re-checks deferred
//! integrity work; and builds review diffs and impact subgraphs.

pub mod delivery;
pub mod diff;
pub mod error;
pub mod ingestion;
pub mod integrity_worker;
pub mod metrics;
pub mod outbox;
pub mod pipeline;
pub mod scheduler;

pub use error::{CommitError, Result};
pub use pipeline::{CommitOutcome, CommitPipeline};
