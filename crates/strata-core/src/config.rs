//! Configuration management for Strata services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`STRATA__` prefix, `__` separator)
//! 2. Config file (`strata.toml`)
//! 3. Defaults

use serde::Deserialize;

use crate::error::Result;

/// Top-level Strata configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub integrity_worker: IntegrityWorkerConfig,
    #[serde(default)]
    pub impact: ImpactConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
}

impl StrataConfig {
    /// Load from `<file_prefix>.toml` (optional) and `STRATA__*` variables.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("STRATA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

/// Commit pipeline and integrity gate settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Estimated check cost above which integrity runs asynchronously.
    #[serde(default = "default_sync_threshold_ms")]
    pub integrity_sync_threshold_ms: u64,

    /// Estimated integrity cost of one changeset element, in microseconds.
    #[serde(default = "default_cost_per_element_us")]
    pub integrity_cost_per_element_us: u64,

    /// Minimum BASED_ON edges a Skill must have.
    #[serde(default = "default_skill_min")]
    pub skill_based_on_min: usize,

    /// Maximum BASED_ON edges a Skill may have (unbounded if unset).
    #[serde(default)]
    pub skill_based_on_max: Option<usize>,

    /// Rebase retries after losing a version race.
    #[serde(default = "default_commit_retries")]
    pub max_commit_retries: u32,
}

/// Outbox publisher settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,

    /// Delivery attempts before a row stops being claimed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How long a claimed row stays invisible to other publishers.
    #[serde(default = "default_claim_ttl")]
    pub claim_ttl_secs: u64,

    #[serde(default = "default_outbox_interval")]
    pub interval_secs: u64,

    /// Named queue receiving `graph_committed` payloads.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

/// Background integrity worker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrityWorkerConfig {
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,

    #[serde(default = "default_integrity_interval")]
    pub interval_secs: u64,

    /// Re-enter commit for proposals the worker marks READY.
    #[serde(default = "default_true")]
    pub resume_commits: bool,
}

/// Impact subgraph settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ImpactConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_depth")]
    pub default_depth: u32,
}

/// Relational store connection.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Graph store connection.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jConfig {
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,
    #[serde(default = "default_neo4j_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_sync_threshold_ms() -> u64 {
    250
}

fn default_cost_per_element_us() -> u64 {
    500
}

fn default_skill_min() -> usize {
    1
}

fn default_commit_retries() -> u32 {
    3
}

fn default_batch_limit() -> u32 {
    100
}

fn default_max_attempts() -> u32 {
    10
}

fn default_claim_ttl() -> u64 {
    60
}

fn default_outbox_interval() -> u64 {
    5
}

fn default_queue_name() -> String {
    "events:graph_committed".to_string()
}

fn default_integrity_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_depth() -> u32 {
    1
}

fn default_database_url() -> String {
    "sqlite://strata.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_neo4j_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            integrity_sync_threshold_ms: default_sync_threshold_ms(),
            integrity_cost_per_element_us: default_cost_per_element_us(),
            skill_based_on_min: default_skill_min(),
            skill_based_on_max: None,
            max_commit_retries: default_commit_retries(),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            max_attempts: default_max_attempts(),
            claim_ttl_secs: default_claim_ttl(),
            interval_secs: default_outbox_interval(),
            queue_name: default_queue_name(),
        }
    }
}

impl Default for IntegrityWorkerConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            interval_secs: default_integrity_interval(),
            resume_commits: default_true(),
        }
    }
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            default_depth: default_depth(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: default_neo4j_uri(),
            user: default_neo4j_user(),
            password: String::new(),
        }
    }
}
