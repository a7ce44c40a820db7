//! CLI entry point for the Strata commit control plane.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{fmt, EnvFilter};

use strata_core::config::StrataConfig;
use strata_core::types::{ProposalId, TenantId};
use strata_graph::{GraphClient, GraphConfig, GraphStore};
use strata_ledger::LedgerStore;

use strata_commit::delivery::JsonLinesChannel;
use strata_commit::diff::DiffBuilder;
use strata_commit::ingestion::JsonOperations;
use strata_commit::integrity_worker::IntegrityWorker;
use strata_commit::outbox::OutboxPublisher;
use strata_commit::scheduler::{integrity_pass, publish_pass, BackgroundScheduler};
use strata_commit::CommitPipeline;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Commit control plane for the Strata knowledge graph")]
struct Cli {
    /// Config file prefix (default: strata).
    #[arg(short, long, default_value = "strata")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit an operation list as a DRAFT proposal.
    Submit {
        #[arg(long)]
        tenant_id: String,
        /// Graph version the operations were authored against (default: current).
        #[arg(long)]
        base_version: Option<i64>,
        /// JSON file with the operations (default: stdin).
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Show a stored proposal.
    Show { proposal_id: String },
    RequestReview { proposal_id: String },
    Approve { proposal_id: String },
    Reject {
        proposal_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Commit a DRAFT, APPROVED or READY proposal.
    Commit { proposal_id: String },
    /// Per-operation before/after diff of a proposal.
    Diff { proposal_id: String },
    /// Stored neighborhood of everything a proposal touches.
    Impact {
        proposal_id: String,
        #[arg(long)]
        depth: Option<u32>,
    },
    /// Audit rows and evidence links of a committed proposal.
    Audit { proposal_id: String },
    /// Run one outbox publishing pass and exit.
    OutboxOnce {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Run one deferred integrity pass and exit.
    IntegrityOnce {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Store the full text of an evidence chunk (default: stdin).
    PutChunk {
        #[arg(long)]
        tenant_id: String,
        #[arg(long)]
        chunk_id: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Look up a background job.
    Job { job_id: String },
    /// Run the outbox, integrity and cache loops until interrupted.
    Daemon,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = StrataConfig::load(&cli.config)?;

    let ledger = LedgerStore::connect(&config.database.url, config.database.max_connections).await?;
    let client = GraphClient::connect(&GraphConfig::from(&config.neo4j)).await?;
    client.ensure_indexes().await?;
    let graph: Arc<dyn GraphStore> = Arc::new(client);
    let pipeline = Arc::new(CommitPipeline::new(ledger.clone(), graph.clone(), config.pipeline.clone()));
    let diff = Arc::new(DiffBuilder::new(
        ledger.clone(),
        graph.clone(),
        Arc::new(ledger.clone()),
        Duration::from_secs(config.impact.cache_ttl_secs),
    ));

    match cli.command {
        Command::Submit {
            tenant_id,
            base_version,
            file,
        } => {
            let tenant = TenantId::new(&tenant_id);
            let content = read_input(file).await?;
            let base = match base_version {
                Some(v) => v,
                None => ledger.current_version(&tenant).await?,
            };
            let proposal = pipeline.submit_content(&JsonOperations, tenant, base, &content).await?;
            print_json(&proposal)?;
        }
        Command::Show { proposal_id } => {
            let record = ledger.require_proposal(&ProposalId::from(proposal_id.as_str())).await?;
            print_json(&json!({
                "proposal": record.proposal,
                "failure": record.failure,
                "created_at": record.created_at,
                "updated_at": record.updated_at,
            }))?;
        }
        Command::RequestReview { proposal_id } => {
            let id = ProposalId::from(proposal_id.as_str());
            pipeline.request_review(&id).await?;
            print_status(&ledger, &id).await?;
        }
        Command::Approve { proposal_id } => {
            let id = ProposalId::from(proposal_id.as_str());
            pipeline.approve(&id).await?;
            print_status(&ledger, &id).await?;
        }
        Command::Reject { proposal_id, reason } => {
            let id = ProposalId::from(proposal_id.as_str());
            pipeline.reject(&id, reason.as_deref()).await?;
            print_status(&ledger, &id).await?;
        }
        Command::Commit { proposal_id } => {
            let outcome = pipeline.commit(&ProposalId::from(proposal_id.as_str())).await?;
            print_json(&outcome)?;
        }
        Command::Diff { proposal_id } => {
            let view = diff.build_diff(&ProposalId::from(proposal_id.as_str())).await?;
            print_json(&view)?;
        }
        Command::Impact { proposal_id, depth } => {
            let depth = depth.unwrap_or(config.impact.default_depth);
            let subgraph = diff
                .impact_subgraph(&ProposalId::from(proposal_id.as_str()), depth)
                .await?;
            print_json(&subgraph)?;
        }
        Command::Audit { proposal_id } => {
            let audits = ledger.list_audit_for_proposal(&ProposalId::from(proposal_id.as_str())).await?;
            let mut rows = Vec::with_capacity(audits.len());
            for audit in audits {
                let evidence = ledger.evidence_links(&audit.tx_id).await?;
                rows.push(json!({ "audit": audit, "evidence": evidence }));
            }
            print_json(&rows)?;
        }
        Command::OutboxOnce { limit } => {
            let publisher = OutboxPublisher::new(ledger.clone(), Arc::new(JsonLinesChannel), config.outbox.clone())?;
            let limit = limit.unwrap_or(config.outbox.batch_limit);
            let (job_id, report) = publish_pass(&ledger, &publisher, limit).await?;
            tracing::info!(job_id = %job_id, ?report, "Outbox pass recorded");
            eprintln!("{}", publisher.export_metrics()?);
        }
        Command::IntegrityOnce { limit } => {
            let worker = IntegrityWorker::new(pipeline.clone(), config.integrity_worker.clone());
            let limit = limit.unwrap_or(config.integrity_worker.batch_limit);
            let (job_id, report) = integrity_pass(&ledger, &worker, limit).await?;
            print_json(&json!({ "job_id": job_id, "report": report }))?;
        }
        Command::PutChunk {
            tenant_id,
            chunk_id,
            file,
        } => {
            let tenant = TenantId::new(&tenant_id);
            let content = read_input(file).await?;
            let text = content.trim_end();
            ledger.put_chunk(&tenant, &chunk_id, text).await?;
            print_json(&json!({ "tenant_id": tenant, "chunk_id": chunk_id, "chars": text.chars().count() }))?;
        }
        Command::Job { job_id } => {
            let job = ledger
                .get_job(&job_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("job {job_id} not found"))?;
            print_json(&job)?;
        }
        Command::Daemon => {
            let publisher = OutboxPublisher::new(ledger.clone(), Arc::new(JsonLinesChannel), config.outbox.clone())?;
            let worker = IntegrityWorker::new(pipeline.clone(), config.integrity_worker.clone());
            let scheduler = BackgroundScheduler::new(
                ledger.clone(),
                publisher,
                worker,
                diff.clone(),
                config.outbox.clone(),
                config.integrity_worker.clone(),
            );
            scheduler.run().await?;
        }
    }

    Ok(())
}

async fn read_input(file: Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => Ok(tokio::fs::read_to_string(&path).await?),
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            Ok(buf)
        }
    }
}

async fn print_status(ledger: &LedgerStore, id: &ProposalId) -> anyhow::Result<()> {
    let record = ledger.require_proposal(id).await?;
    print_json(&json!({ "proposal_id": id, "status": record.proposal.status }))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
