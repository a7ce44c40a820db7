//! strata-graph: access to the versioned property graph.
//!
//! This crate is the single mutation point for the graph store. Every
//! changeset application, snapshot and neighborhood read flows through the
//! [`GraphStore`] trait so that tenant isolation, canon-checked labels and
//! lifecycle stamping stay consistent across backends.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryGraph;
pub use store::{EdgeRecord, GraphStore, NodeRecord, RelAddress, Subgraph};
