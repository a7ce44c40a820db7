//! strata-ledger: The relational source of truth for Strata.
//!
//! Holds the per-tenant version counter and change log, proposals and their
//! status, the audit log, the transactional outbox, background job records,
//! evidence links and the source-chunk store. Commit bookkeeping is written
//! in one relational transaction so the version bump, change rows, audit row
//! and outbox row appear together or not at all.

pub mod audit;
pub mod chunks;
pub mod error;
pub mod jobs;
pub mod outbox;
pub mod proposals;
pub mod rebase;
pub mod schema;
pub mod store;
pub mod versions;

pub use audit::{AuditRecord, EvidenceLink};
pub use error::{LedgerError, Result};
pub use jobs::{JobRecord, JobStatus};
pub use outbox::{OutboxClaim, OutboxEvent, UNDECODABLE_PAYLOAD};
pub use proposals::ProposalRecord;
pub use rebase::{RebaseChecker, RebaseOutcome, RebaseStatus};
pub use store::LedgerStore;
pub use versions::{CommitRecord, CommittedVersion, GraphChange};
