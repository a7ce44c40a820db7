//! strata-integrity: Validates a candidate changeset against graph-shape rules.
//!
//! The checker is deterministic and side-effect-free. It runs on plain
//! node/edge collections, so the inline commit gate and the background
//! integrity worker share exactly the same logic.

pub mod checker;
pub mod cycles;
pub mod graph;

pub use checker::{IntegrityChecker, IntegrityReport, IntegrityRules};
