//! Proposal construction.
//!
//! `create_draft` is pure: it validates, checksums and assigns an id.
//! Persisting the draft is the caller's job.

use std::collections::HashSet;

use crate::canon::checksum;
use crate::error::ProposalError;
use crate::types::{Operation, Proposal, ProposalId, ProposalStatus, TenantId};

/// Check every operation before it may enter a proposal.
pub fn validate_operations(operations: &[Operation]) -> Result<(), ProposalError> {
    if operations.is_empty() {
        return Err(ProposalError::Empty);
    }

    let mut seen = HashSet::new();
    for op in operations {
        if op.op_id.trim().is_empty() {
            return Err(malformed(op, "op_id is empty"));
        }
        if !seen.insert(op.op_id.as_str()) {
            return Err(malformed(op, "duplicate op_id"));
        }
        if op.op_type.requires_evidence() && !op.evidence.is_complete() {
            return Err(ProposalError::EvidenceRequired {
                op_id: op.op_id.clone(),
                op_type: op.op_type.as_str().to_string(),
            });
        }
        if op.op_type.is_node() {
            if op.node_uid().is_none() {
                return Err(malformed(op, "node operation has no uid, target_id or temp_id"));
            }
        } else if op.op_type.is_upsert() {
            if op.rel_endpoints().is_none() {
                return Err(malformed(op, "relationship operation has no endpoints"));
            }
        } else if op.rel_uid().is_none() {
            return Err(malformed(op, "relationship operation has no target"));
        }
    }
    Ok(())
}

fn malformed(op: &Operation, reason: &str) -> ProposalError {
    ProposalError::MalformedOperation {
        op_id: op.op_id.clone(),
        reason: reason.to_string(),
    }
}

/// Build a DRAFT proposal from a validated operation list.
pub fn create_draft(
    tenant_id: TenantId,
    base_graph_version: i64,
    operations: Vec<Operation>,
) -> Result<Proposal, ProposalError> {
    validate_operations(&operations)?;
    let proposal_checksum = checksum(&operations)?;

    Ok(Proposal {
        proposal_id: ProposalId::generate(),
        tenant_id,
        base_graph_version,
        proposal_checksum,
        status: ProposalStatus::Draft,
        operations,
    })
}
