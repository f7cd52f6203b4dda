//! Transport-facing facade.
//!
//! [`AnnotationService`] is what a web layer or the CLI talks to. Input errors
//! (unknown upload, unknown database, tool/algorithm mismatch) are returned
//! from [`AnnotationService::submit`] before any job exists; everything that
//! goes wrong later only shows up as the job's terminal status.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::governor::{Governor, GovernorSettings};
use crate::job::{
    FailureKind, Job, JobFailure, JobPage, JobRequest, JobStatus, JobStore, MemoryJobStore,
};
use crate::registry::{RefDbInfo, RefDbRegistry, UploadStore};
use crate::summary::SummaryStore;
use crate::tools::{CommandExecutor, ToolAdapter, ToolSettings};

/// Status as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Short failure summary; raw tool stderr never appears here.
    pub error: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error: job
                .failure
                .as_ref()
                .map(|f| format!("{} failure: {}", f.kind, f.message)),
        }
    }
}

/// Answer to a result lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultLookup {
    /// Path of the job's ResultDocument.
    Ready(PathBuf),
    NotReady(JobStatus),
    NotFound,
}

/// Collaborators the service is built from.
pub struct ServiceParts {
    pub uploads: Arc<dyn UploadStore>,
    pub refdbs: Arc<dyn RefDbRegistry>,
    pub summaries: Arc<dyn SummaryStore>,
    pub executor: Arc<dyn CommandExecutor>,
}

pub struct AnnotationService {
    jobs: Arc<dyn JobStore>,
    uploads: Arc<dyn UploadStore>,
    refdbs: Arc<dyn RefDbRegistry>,
    summaries: Arc<dyn SummaryStore>,
    governor: Governor,
}

impl AnnotationService {
    /// Build the service and start its governor. Must be called from within
    /// a tokio runtime.
    pub fn start(config: &EngineConfig, parts: ServiceParts) -> Self {
        let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let tools = ToolAdapter::new(parts.executor, ToolSettings::from(config));
        let governor = Governor::start(
            GovernorSettings::from(config),
            jobs.clone(),
            parts.uploads.clone(),
            parts.summaries.clone(),
            tools,
        );
        tracing::info!(
            max_concurrent_jobs = config.max_concurrent_jobs(),
            fair_share = governor.fair_share(),
            output_dir = %config.output_dir.display(),
            "annotation service started"
        );
        Self {
            jobs,
            uploads: parts.uploads,
            refdbs: parts.refdbs,
            summaries: parts.summaries,
            governor,
        }
    }

    /// Validate and queue a job, returning its id.
    pub async fn submit(&self, request: JobRequest) -> Result<String, EngineError> {
        request.algorithm.check_tool(request.tool)?;
        if self.uploads.resolve(&request.file_id).is_none() {
            return Err(EngineError::UploadNotFound(request.file_id));
        }
        let database_path = self
            .refdbs
            .resolve(&request.database, request.tool, request.algorithm)?;

        let job_id = self.jobs.create(Job::new(request, database_path));
        tracing::info!(%job_id, "job queued");

        if let Err(e) = self.governor.enqueue(&job_id).await {
            let failure = JobFailure::new(FailureKind::Internal, e.to_string());
            if let Err(e) = self.jobs.fail(&job_id, failure) {
                tracing::error!(%job_id, error = %e, "could not fail unqueued job");
            }
            return Err(e);
        }
        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatusView, EngineError> {
        self.jobs
            .get(job_id)
            .map(|job| JobStatusView::from(&job))
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))
    }

    pub fn result(&self, job_id: &str) -> ResultLookup {
        let Some(job) = self.jobs.get(job_id) else {
            return ResultLookup::NotFound;
        };
        match (job.status, job.result_files.get("json")) {
            (JobStatus::Finished, Some(path)) => ResultLookup::Ready(path.clone()),
            (status, _) => ResultLookup::NotReady(status),
        }
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id)
    }

    pub fn list(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> JobPage {
        self.jobs.page(status, limit, offset)
    }

    pub fn refdbs(&self) -> Vec<RefDbInfo> {
        self.refdbs.list()
    }

    pub fn summaries(&self) -> Arc<dyn SummaryStore> {
        self.summaries.clone()
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait(&self, job_id: &str, interval: Duration) -> Result<Job, EngineError> {
        loop {
            let job = self
                .jobs
                .get(job_id)
                .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
            if job.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Stop accepting work and let queued and running jobs finish.
    pub async fn shutdown(self) {
        self.governor.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefDbConfig;
    use crate::job::{Algorithm, Parameters, Tool};
    use crate::registry::{ConfigRefDbRegistry, MemoryUploadStore};
    use crate::summary::MemorySummaryStore;
    use crate::tools::testing::CannedExecutor;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const VSEARCH_HITS: &str = "q2\tB7;Fungi;Basidiomycota;Agaricomycetes;.;.;.;.\t98.5\t4\t0\t0\t1\t4\t10\t13\t-1\t20\t100.0\t-\t4\t40\n";

    struct Fixture {
        _dir: TempDir,
        uploads: Arc<MemoryUploadStore>,
        service: AnnotationService,
        file_id: String,
    }

    fn fixture(executor: CannedExecutor) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let fasta = dir.path().join("reads.fa");
        std::fs::write(&fasta, ">q1\nACGTACGT\n>q2\nACGT\n>q3\nAC\n").unwrap();
        let uploads = Arc::new(MemoryUploadStore::new());
        let file_id = uploads.register(&fasta).unwrap();

        let refdbs = ConfigRefDbRegistry::new(BTreeMap::from([(
            "EUKARYOME".to_string(),
            RefDbConfig {
                paths: BTreeMap::from([
                    ("vsearch_global".to_string(), PathBuf::from("/db/euk.fasta")),
                    ("blast".to_string(), PathBuf::from("/db/euk")),
                ]),
                ..Default::default()
            },
        )]));
        let config = EngineConfig {
            output_dir: dir.path().join("outputs"),
            total_cpus: Some(8),
            ..Default::default()
        };
        let service = AnnotationService::start(
            &config,
            ServiceParts {
                uploads: uploads.clone(),
                refdbs: Arc::new(refdbs),
                summaries: Arc::new(MemorySummaryStore::new()),
                executor: Arc::new(executor),
            },
        );
        Fixture {
            _dir: dir,
            uploads,
            service,
            file_id,
        }
    }

    fn request(file_id: &str, tool: Tool, algorithm: Algorithm, database: &str) -> JobRequest {
        JobRequest {
            file_id: file_id.to_string(),
            tool,
            algorithm,
            database: database.to_string(),
            parameters: Parameters::new(),
        }
    }

    #[tokio::test]
    async fn input_errors_are_synchronous_and_create_nothing() {
        let f = fixture(CannedExecutor::default());
        let cases = [
            request("missing", Tool::Vsearch, Algorithm::UsearchGlobal, "EUKARYOME"),
            request(&f.file_id, Tool::Vsearch, Algorithm::UsearchGlobal, "SILVA"),
            request(&f.file_id, Tool::Vsearch, Algorithm::SearchExact, "EUKARYOME"),
            request(&f.file_id, Tool::Blast, Algorithm::UsearchGlobal, "EUKARYOME"),
        ];
        for case in cases {
            let err = f.service.submit(case).await.unwrap_err();
            assert!(err.is_input_error(), "{err}");
        }
        assert_eq!(f.service.list(None, 20, 0).total, 0);
        assert!(f.uploads.resolve(&f.file_id).is_some());
        f.service.shutdown().await;
    }

    #[tokio::test]
    async fn finished_job_exposes_result_path() {
        let f = fixture(CannedExecutor::with_hits(VSEARCH_HITS));
        let id = f
            .service
            .submit(request(&f.file_id, Tool::Vsearch, Algorithm::UsearchGlobal, "EUKARYOME"))
            .await
            .unwrap();
        let job = f.service.wait(&id, Duration::from_millis(5)).await.unwrap();
        assert_eq!(job.status, JobStatus::Finished);

        let ResultLookup::Ready(path) = f.service.result(&id) else {
            panic!("result not ready");
        };
        let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(doc["summary"]["total_queries"], 3);
        assert_eq!(doc["summary"]["total_hits"], 1);
        let hit = &doc["results"][1]["hits"][0];
        assert_eq!(hit["sstrand"], "minus");
        assert!(hit.get("alignment").is_none());
        assert!(hit.get("evalue").is_none());

        let status = f.service.status(&id).unwrap();
        assert!(status.started_at.is_some());
        assert!(status.error.is_none());
        f.service.shutdown().await;
    }

    #[tokio::test]
    async fn failed_job_reports_summary_not_stderr() {
        let f = fixture(CannedExecutor {
            code: 2,
            ..Default::default()
        });
        let id = f
            .service
            .submit(request(&f.file_id, Tool::Blast, Algorithm::Megablast, "EUKARYOME"))
            .await
            .unwrap();
        f.service.wait(&id, Duration::from_millis(5)).await.unwrap();

        let status = f.service.status(&id).unwrap();
        assert_eq!(status.status, JobStatus::Failed);
        let error = status.error.unwrap();
        assert!(error.contains("blast exited with status 2"));
        assert!(!error.contains("database missing"));
        assert_eq!(f.service.result(&id), ResultLookup::NotReady(JobStatus::Failed));
        let retained = f.service.job(&id).and_then(|job| job.failure).and_then(|failure| failure.stderr);
        assert_eq!(retained.as_deref(), Some("fatal: database missing"));
        f.service.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_job_lookups() {
        let f = fixture(CannedExecutor::default());
        assert!(matches!(f.service.status("nope"), Err(EngineError::JobNotFound(_))));
        assert_eq!(f.service.result("nope"), ResultLookup::NotFound);
        assert!(f.service.job("nope").is_none());
        f.service.shutdown().await;
    }

    #[tokio::test]
    async fn listing_filters_by_status() {
        let f = fixture(CannedExecutor::with_hits(VSEARCH_HITS));
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                f.service
                    .submit(request(&f.file_id, Tool::Vsearch, Algorithm::UsearchGlobal, "EUKARYOME"))
                    .await
                    .unwrap(),
            );
        }
        for id in &ids {
            f.service.wait(id, Duration::from_millis(5)).await.unwrap();
        }
        let page = f.service.list(Some(JobStatus::Finished), 2, 0);
        assert_eq!(page.total, 3);
        assert_eq!(page.jobs.len(), 2);
        assert_eq!(f.service.list(Some(JobStatus::Failed), 10, 0).total, 0);
        assert_eq!(f.service.refdbs()[0].id, "EUKARYOME");
        f.service.shutdown().await;
    }
}
