//! strata-core: Shared types, canonicalization, and proposal construction for Strata.
//!
//! This crate provides the foundational pieces used across all Strata components:
//! - Operation, proposal and status types plus the canon whitelist
//! - Deterministic text/JSON canonicalization and checksums
//! - The proposal builder and changeset planning
//! - Pure revert computation for applied operations
//! - Event payloads, configuration, and common error types

pub mod canon;
pub mod changeset;
pub mod config;
pub mod error;
pub mod events;
pub mod proposal;
pub mod revert;
pub mod types;

pub use error::{CoreError, ProposalError, Result};
