//! Background job records, looked up by id.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::store::{now_ms, opt_datetime, to_datetime, LedgerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCEEDED" => Ok(JobStatus::Succeeded),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub kind: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
}

impl LedgerStore {
    /// Open a RUNNING job of `kind` and return its id.
    pub async fn start_job(&self, kind: &str) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO jobs (job_id, kind, status, started_at_ms) VALUES (?, ?, ?, ?)")
            .bind(&job_id)
            .bind(kind)
            .bind(JobStatus::Running.as_str())
            .bind(now_ms())
            .execute(self.pool())
            .await?;
        Ok(job_id)
    }

    pub async fn finish_job(&self, job_id: &str, status: JobStatus, result: &Value) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE jobs SET status = ?, finished_at_ms = ?, result_json = ? WHERE job_id = ?",
        )
        .bind(status.as_str())
        .bind(now_ms())
        .bind(serde_json::to_string(result)?)
        .bind(job_id)
        .execute(self.pool())
        .await?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("job {job_id}")));
        }
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!("{SELECT_JOB} WHERE job_id = ?"))
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    /// Jobs of `kind`, most recently started first.
    pub async fn list_jobs(&self, kind: &str, limit: u32) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_JOB} WHERE kind = ? ORDER BY started_at_ms DESC, rowid DESC LIMIT ?"
        ))
        .bind(kind)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_job).collect()
    }
}

const SELECT_JOB: &str = "SELECT job_id, kind, status, started_at_ms, finished_at_ms, result_json FROM jobs";

fn row_to_job(row: &SqliteRow) -> Result<JobRecord> {
    let status: String = row.try_get("status")?;
    let result: Option<String> = row.try_get("result_json")?;
    Ok(JobRecord {
        job_id: row.try_get("job_id")?,
        kind: row.try_get("kind")?,
        status: status.parse().map_err(LedgerError::Decode)?,
        started_at: to_datetime(row.try_get("started_at_ms")?)?,
        finished_at: opt_datetime(row.try_get("finished_at_ms")?)?,
        result: result.as_deref().map(serde_json::from_str).transpose()?,
    })
}
