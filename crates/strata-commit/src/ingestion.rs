//! Turning submitted content into operations.
//!
//! Content generation (curricula, questions, extraction) lives outside the
//! control plane and reaches it through [`IngestionStrategy`].

use async_trait::async_trait;
use serde::Deserialize;

use strata_core::types::{Operation, TenantId};

use crate::error::{CommitError, Result};

#[async_trait]
pub trait IngestionStrategy: Send + Sync {
    /// Operations describing `content` for `tenant`.
    async fn operations(&self, tenant: &TenantId, content: &str) -> Result<Vec<Operation>>;
}

/// Content that already is an operation list: either a bare JSON array or an
/// object with an `operations` array.
#[derive(Debug, Default)]
pub struct JsonOperations;

#[derive(Deserialize)]
#[serde(untagged)]
enum OperationDocument {
    List(Vec<Operation>),
    Wrapped { operations: Vec<Operation> },
}

#[async_trait]
impl IngestionStrategy for JsonOperations {
    async fn operations(&self, tenant: &TenantId, content: &str) -> Result<Vec<Operation>> {
        let doc: OperationDocument = serde_json::from_str(content)
            .map_err(|e| CommitError::Ingestion(format!("tenant {tenant}: not an operation list: {e}")))?;
        Ok(match doc {
            OperationDocument::List(ops) | OperationDocument::Wrapped { operations: ops } => ops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::types::OpType;

    #[tokio::test]
    async fn accepts_bare_and_wrapped_lists() {
        let tenant = TenantId::new("t1");
        let bare = r#"[{"op_id": "o1", "op_type": "CREATE_NODE", "target_id": "C1"}]"#;
        let wrapped = r#"{"operations": [{"op_id": "o1", "op_type": "DELETE_NODE", "target_id": "C1"}]}"#;

        let ops = JsonOperations.operations(&tenant, bare).await.unwrap();
        assert_eq!(ops[0].op_type, OpType::CreateNode);
        let ops = JsonOperations.operations(&tenant, wrapped).await.unwrap();
        assert_eq!(ops[0].op_type, OpType::DeleteNode);
    }

    #[tokio::test]
    async fn rejects_other_documents() {
        let err = JsonOperations
            .operations(&TenantId::new("t1"), r#"{"ops": []}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::Ingestion(_)));
    }
}
