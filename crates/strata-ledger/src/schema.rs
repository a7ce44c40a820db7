//! Relational schema. Every statement is idempotent so `init_schema` can run
//! on each startup.

pub const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS proposals (
        proposal_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        base_graph_version INTEGER NOT NULL,
        proposal_checksum TEXT NOT NULL,
        status TEXT NOT NULL,
        operations_json TEXT NOT NULL,
        failure_json TEXT,
        created_at_ms INTEGER NOT NULL,
        updated_at_ms INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_proposals_status ON proposals(status, created_at_ms)",
    "CREATE INDEX IF NOT EXISTS idx_proposals_tenant ON proposals(tenant_id, created_at_ms)",
    "CREATE INDEX IF NOT EXISTS idx_proposals_checksum ON proposals(tenant_id, proposal_checksum)",
    "CREATE TABLE IF NOT EXISTS tenant_graph_version (
        tenant_id TEXT PRIMARY KEY,
        graph_version INTEGER NOT NULL DEFAULT 0,
        updated_at_ms INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS graph_changes (
        tenant_id TEXT NOT NULL,
        graph_version INTEGER NOT NULL,
        target_id TEXT NOT NULL,
        change_type TEXT NOT NULL,
        PRIMARY KEY (tenant_id, graph_version, target_id)
    )",
    "CREATE TABLE IF NOT EXISTS audit_log (
        tx_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        proposal_id TEXT NOT NULL,
        graph_version INTEGER NOT NULL,
        operations_applied TEXT NOT NULL,
        revert_operations TEXT NOT NULL,
        correlation_id TEXT,
        created_at_ms INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_audit_proposal ON audit_log(proposal_id)",
    "CREATE TABLE IF NOT EXISTS events_outbox (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id TEXT NOT NULL UNIQUE,
        tenant_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        published INTEGER NOT NULL DEFAULT 0,
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        dead_lettered INTEGER NOT NULL DEFAULT 0,
        claimed_by TEXT,
        claim_expires_ms INTEGER,
        created_at_ms INTEGER NOT NULL,
        published_at_ms INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_outbox_pending ON events_outbox(published, dead_lettered, seq)",
    "CREATE TABLE IF NOT EXISTS evidence_links (
        tenant_id TEXT NOT NULL,
        tx_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        source_chunk_id TEXT NOT NULL,
        quote TEXT NOT NULL,
        PRIMARY KEY (tx_id, target_id, source_chunk_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_evidence_target ON evidence_links(tenant_id, target_id)",
    "CREATE TABLE IF NOT EXISTS source_chunks (
        tenant_id TEXT NOT NULL,
        chunk_id TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL,
        PRIMARY KEY (tenant_id, chunk_id)
    )",
    "CREATE TABLE IF NOT EXISTS jobs (
        job_id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at_ms INTEGER NOT NULL,
        finished_at_ms INTEGER,
        result_json TEXT
    )",
];
