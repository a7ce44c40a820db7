//! Neo4j connection and the shared graph client.
//!
//! Every canon node carries `tenant_id` and `uid`; the pair is the node's
//! identity, so [`GraphClient::ensure_indexes`] indexes it per label.

use neo4rs::{query, ConfigBuilder, Graph, Query};

use strata_core::config::Neo4jConfig;
use strata_core::types::{NodeType, SOURCE_CHUNK_LABEL};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Type not in canon: {0}")]
    InvalidType(String),

    #[error("Operation {op_id} cannot be addressed: {reason}")]
    Unaddressable { op_id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Graph store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "strata-dev".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

impl From<&Neo4jConfig> for GraphConfig {
    fn from(cfg: &Neo4jConfig) -> Self {
        Self {
            uri: cfg.uri.clone(),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            ..Self::default()
        }
    }
}

/// Pooled Neo4j client shared by the pipeline and the review tools.
/// Clones share the pool.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, user = %config.user, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Create the `(tenant_id, uid)` index of every canon label and of
    /// source chunks. Idempotent.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let labels = NodeType::ALL
            .iter()
            .map(|t| t.as_str())
            .chain(std::iter::once(SOURCE_CHUNK_LABEL));
        let mut created = 0;
        for label in labels {
            self.run(query(&identity_index_cypher(label))).await?;
            created += 1;
        }
        tracing::debug!(labels = created, "Graph identity indexes ensured");
        Ok(())
    }

    /// Execute a write-only query outside any changeset transaction.
    pub async fn run(&self, query: Query) -> Result<()> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Begin the transaction a changeset is applied in.
    pub async fn start_txn(&self) -> Result<neo4rs::Txn> {
        Ok(self.graph.start_txn().await?)
    }
}

fn identity_index_cypher(label: &str) -> String {
    format!(
        "CREATE INDEX strata_{}_identity IF NOT EXISTS FOR (n:{label}) ON (n.tenant_id, n.uid)",
        label.to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_maps_connection_fields() {
        let cfg = Neo4jConfig {
            uri: "bolt://graph:7687".into(),
            user: "strata".into(),
            password: "pw".into(),
        };
        let graph = GraphConfig::from(&cfg);
        assert_eq!(graph.uri, "bolt://graph:7687");
        assert_eq!(graph.user, "strata");
        assert_eq!(graph.password, "pw");
        assert_eq!(graph.max_connections, GraphConfig::default().max_connections);
    }

    #[test]
    fn identity_index_is_named_per_label() {
        assert_eq!(
            identity_index_cypher("ContentUnit"),
            "CREATE INDEX strata_contentunit_identity IF NOT EXISTS FOR (n:ContentUnit) ON (n.tenant_id, n.uid)"
        );
    }
}
