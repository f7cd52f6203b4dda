//! Durable job summaries.
//!
//! A [`JobSummary`] is a snapshot of a job plus the execution statistics the
//! in-memory store does not keep: sequence counts and lengths, the CPU count
//! granted by the governor and the estimated CPU time. Summaries outlive the
//! process and feed the CPU-time report.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::EngineError;
use crate::job::{Algorithm, Job, JobFailure, JobStatus, Parameters, Tool};
use crate::normalize::InputSequences;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub tool: Tool,
    pub algorithm: Algorithm,
    pub database: String,
    pub parameters: Parameters,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sequence_count: Option<u64>,
    #[serde(default)]
    pub sequence_lengths: Vec<u64>,
    pub allocated_cpus: Option<u64>,
    pub cpu_time_seconds: Option<f64>,
    pub failure: Option<JobFailure>,
}

impl JobSummary {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            tool: job.tool,
            algorithm: job.algorithm,
            database: job.database.clone(),
            parameters: job.parameters.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            sequence_count: None,
            sequence_lengths: Vec::new(),
            allocated_cpus: None,
            cpu_time_seconds: None,
            failure: job.failure.clone(),
        }
    }

    pub fn record_sequences(&mut self, input: &InputSequences) {
        self.sequence_count = Some(input.len() as u64);
        self.sequence_lengths = input.lengths();
    }

    pub fn with_cpus(mut self, cpus: u64) -> Self {
        self.allocated_cpus = Some(cpus);
        self
    }

    /// Wall-clock seconds of tool execution times the allocated CPU count.
    pub fn record_cpu_time(&mut self, wall_seconds: f64) {
        let cpus = self.allocated_cpus.unwrap_or(1) as f64;
        self.cpu_time_seconds = Some(wall_seconds * cpus);
    }
}

/// Persistent home for job summaries. Snapshots arrive at job start and at
/// the terminal transition; callers log failures and carry on.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Insert or replace the summary for `summary.job_id`.
    async fn persist(&self, summary: &JobSummary) -> Result<(), EngineError>;

    async fn list(&self) -> Result<Vec<JobSummary>, EngineError>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS job_summaries (
    job_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    tool TEXT NOT NULL,
    database_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    cpu_time_seconds REAL,
    summary TEXT NOT NULL
)";

const UPSERT: &str = "INSERT INTO job_summaries
    (job_id, status, tool, database_id, created_at, completed_at, cpu_time_seconds, summary)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(job_id) DO UPDATE SET
        status = excluded.status,
        completed_at = excluded.completed_at,
        cpu_time_seconds = excluded.cpu_time_seconds,
        summary = excluded.summary";

/// Summaries in a SQLite database, one row per job. The full snapshot is kept
/// as JSON next to the columns reports filter on.
pub struct SqliteSummaryStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSummaryStore {
    /// Open the database at `path`, creating it and its table if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute(SCHEMA, [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_job_summaries_created ON job_summaries(created_at)",
            [],
        )?;
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, EngineError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&conn)
        })
        .await?
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    async fn persist(&self, summary: &JobSummary) -> Result<(), EngineError> {
        let snapshot = serde_json::to_string(summary)?;
        let summary = summary.clone();
        self.with_conn(move |conn| {
            conn.execute(
                UPSERT,
                params![
                    summary.job_id,
                    summary.status.to_string(),
                    summary.tool.to_string(),
                    summary.database,
                    timestamp(summary.created_at),
                    summary.completed_at.map(timestamp),
                    summary.cpu_time_seconds,
                    snapshot,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<JobSummary>, EngineError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT summary FROM job_summaries ORDER BY created_at, job_id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut summaries: Vec<JobSummary> = Vec::new();
            for row in rows {
                summaries.push(serde_json::from_str(&row?)?);
            }
            Ok(summaries)
        })
        .await
    }
}

/// In-process store, for tests and one-shot CLI runs.
#[derive(Default)]
pub struct MemorySummaryStore {
    summaries: tokio::sync::Mutex<BTreeMap<String, JobSummary>>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, job_id: &str) -> Option<JobSummary> {
        self.summaries.lock().await.get(job_id).cloned()
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn persist(&self, summary: &JobSummary) -> Result<(), EngineError> {
        self.summaries
            .lock()
            .await
            .insert(summary.job_id.clone(), summary.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<JobSummary>, EngineError> {
        let mut summaries: Vec<JobSummary> = self.summaries.lock().await.values().cloned().collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_id.cmp(&b.job_id)));
        Ok(summaries)
    }
}

/// Total recorded CPU time in hours, rounded to one decimal.
pub fn cpu_hours(summaries: &[JobSummary]) -> f64 {
    let seconds: f64 = summaries.iter().filter_map(|s| s.cpu_time_seconds).sum();
    (seconds / 3600.0 * 10.0).round() / 10.0
}
