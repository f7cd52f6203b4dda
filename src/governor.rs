//! Concurrency & resource governor.
//!
//! Jobs are queued on a bounded channel. A single dispatcher task pulls job
//! ids in order and, for each, waits for one of `N` semaphore permits before
//! spawning the job's execution. The permit travels with the spawned task and
//! is dropped when it ends, whatever the outcome, so slots are released on
//! success, failure and panic alike.
//!
//! Each job is granted `min(requested_threads, max(1, total_cpus / N))` CPUs.
//!
//! Job summaries are handed to a single writer task over a channel. Jobs never
//! wait on the summary store, and one job's snapshots are written in the order
//! they were taken.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::job::{FailureKind, Job, JobFailure, JobStatus, JobStore, Tool};
use crate::normalize::{InputSequences, gunzip, is_gzip, normalize_artifacts};
use crate::registry::UploadStore;
use crate::summary::{JobSummary, SummaryStore};
use crate::tools::{ToolRequest, ToolAdapter};

pub const PROGRESS_WAITING: &str = "waiting for slot";
pub const PROGRESS_NORMALIZING: &str = "normalizing results";
pub const RESULTS_FILE: &str = "results.json";
/// Decompressed copy of a gzipped upload, for tools that cannot read gzip.
pub const PLAIN_QUERY_FILE: &str = "query.fasta";

/// Fair CPU share for one of `max_concurrent` jobs on `total_cpus` CPUs,
/// capped by what the job asked for.
pub fn allocate_cpus(requested: u64, total_cpus: u64, max_concurrent: usize) -> u64 {
    let fair_share = (total_cpus / max_concurrent.max(1) as u64).max(1);
    requested.clamp(1, fair_share)
}

#[derive(Debug, Clone)]
pub struct GovernorSettings {
    pub max_concurrent_jobs: usize,
    pub total_cpus: u64,
    pub queue_capacity: usize,
    pub output_dir: PathBuf,
}

impl From<&EngineConfig> for GovernorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs(),
            total_cpus: config.total_cpus(),
            queue_capacity: config.queue_capacity.max(1),
            output_dir: config.output_dir.clone(),
        }
    }
}

/// Counts executions in progress for as long as it is alive.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a running job needs, shared by all job tasks.
struct Executor {
    jobs: Arc<dyn JobStore>,
    uploads: Arc<dyn UploadStore>,
    summaries: mpsc::UnboundedSender<JobSummary>,
    tools: ToolAdapter,
    settings: GovernorSettings,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Executor {
    async fn execute(&self, job_id: String, _permit: OwnedSemaphorePermit) {
        let _flight = InFlight::enter(&self.in_flight, &self.peak);

        let job = match self.jobs.transition(&job_id, JobStatus::Running) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "job could not be started");
                return;
            }
        };
        let requested = job.requested_threads(self.tools.default_threads(job.tool));
        let cpus = allocate_cpus(requested, self.settings.total_cpus, self.settings.max_concurrent_jobs);
        tracing::info!(%job_id, tool = %job.tool, algorithm = %job.algorithm, requested, cpus, "job started");

        let mut summary = JobSummary::from_job(&job).with_cpus(cpus);
        self.record(summary.clone());

        let result = self.run(&job, cpus, &mut summary).await;

        let terminal = match result {
            Ok(files) => self.jobs.finish(&job_id, &files),
            Err(failure) => {
                tracing::warn!(%job_id, kind = %failure.kind, reason = %failure.message, "job failed");
                self.jobs.fail(&job_id, failure)
            }
        };
        match terminal {
            Ok(job) => {
                tracing::info!(%job_id, status = %job.status, "job completed");
                summary.status = job.status;
                summary.completed_at = job.completed_at;
                summary.failure = job.failure.clone();
                self.record(summary);
            }
            Err(e) => tracing::error!(%job_id, error = %e, "terminal transition rejected"),
        }
    }

    /// Everything between RUNNING and the terminal transition. Statistics are
    /// recorded on `summary` as they become known.
    async fn run(
        &self,
        job: &Job,
        cpus: u64,
        summary: &mut JobSummary,
    ) -> Result<BTreeMap<String, PathBuf>, JobFailure> {
        let input = self.uploads.resolve(&job.file_id).ok_or_else(|| {
            JobFailure::new(
                FailureKind::Input,
                format!("input file '{}' is no longer available", job.file_id),
            )
        })?;

        let sequences = {
            let input = input.clone();
            tokio::task::spawn_blocking(move || InputSequences::from_path(&input))
                .await
                .map_err(|e| JobFailure::new(FailureKind::Internal, e.to_string()))?
                .map_err(|e| JobFailure::new(FailureKind::Input, e.to_string()))?
        };
        summary.record_sequences(&sequences);

        let job_dir = self.settings.output_dir.join(&job.id);
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|e| JobFailure::new(FailureKind::Internal, format!("{}: {e}", job_dir.display())))?;

        let query = if job.tool == Tool::Blast && is_gzip(&input) {
            let target = job_dir.join(PLAIN_QUERY_FILE);
            let (source, plain) = (input.clone(), target.clone());
            tokio::task::spawn_blocking(move || gunzip(&source, &plain))
                .await
                .map_err(|e| JobFailure::new(FailureKind::Internal, e.to_string()))?
                .map_err(|e| JobFailure::new(FailureKind::Input, format!("{}: {e}", input.display())))?;
            target
        } else {
            input
        };

        self.progress(&job.id, &format!("running {}", job.tool));
        let request = ToolRequest::for_job(job, &query, cpus, &job_dir);
        let started = Instant::now();
        let artifacts = self.tools.run(&request).await;
        summary.record_cpu_time(started.elapsed().as_secs_f64());
        let artifacts = artifacts.map_err(|e| {
            JobFailure::new(FailureKind::ToolExecution, e.to_string()).with_stderr(e.stderr().unwrap_or_default())
        })?;

        self.progress(&job.id, PROGRESS_NORMALIZING);
        let tool = job.tool;
        let raw = artifacts.clone();
        let json_path = job_dir.join(RESULTS_FILE);
        let target = json_path.clone();
        let document = tokio::task::spawn_blocking(move || {
            let document =
                normalize_artifacts(tool, &raw.hits, raw.alignments.as_deref(), Some(&sequences));
            document.write_json(&target).map(|()| document)
        })
        .await
        .map_err(|e| JobFailure::new(FailureKind::Internal, e.to_string()))?
        .map_err(|e| JobFailure::new(FailureKind::Internal, e.to_string()))?;

        if let Some(error) = document.error {
            return Err(JobFailure::new(FailureKind::Parse, error.to_string()));
        }
        tracing::debug!(
            job_id = %job.id,
            queries = document.summary.total_queries,
            hits = document.summary.total_hits,
            "results normalized"
        );
        let mut files = artifacts.files();
        files.insert("json".to_string(), json_path);
        Ok(files)
    }

    fn progress(&self, job_id: &str, progress: &str) {
        if let Err(e) = self.jobs.set_progress(job_id, progress) {
            tracing::warn!(%job_id, error = %e, "progress update failed");
        }
    }

    fn record(&self, summary: JobSummary) {
        if self.summaries.send(summary).is_err() {
            tracing::warn!("summary writer has stopped; snapshot dropped");
        }
    }

    /// Last resort for a job whose task died without reaching a terminal state.
    fn abandon(&self, job_id: &str, reason: String) {
        let Some(job) = self.jobs.get(job_id) else { return };
        if job.is_terminal() {
            return;
        }
        if let Err(e) = self.jobs.fail(job_id, JobFailure::new(FailureKind::Internal, reason)) {
            tracing::error!(%job_id, error = %e, "could not mark abandoned job as failed");
        }
    }
}

async fn write_summaries(store: Arc<dyn SummaryStore>, mut receiver: mpsc::UnboundedReceiver<JobSummary>) {
    while let Some(summary) = receiver.recv().await {
        if let Err(e) = store.persist(&summary).await {
            tracing::error!(job_id = %summary.job_id, status = %summary.status, error = %e, "failed to persist job summary");
        }
    }
}

/// Admits queued jobs under the concurrency bound.
pub struct Governor {
    executor: Arc<Executor>,
    sender: mpsc::Sender<String>,
    dispatcher: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Governor {
    /// Start the dispatcher. Must be called from within a tokio runtime.
    pub fn start(
        settings: GovernorSettings,
        jobs: Arc<dyn JobStore>,
        uploads: Arc<dyn UploadStore>,
        summaries: Arc<dyn SummaryStore>,
        tools: ToolAdapter,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let slots = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
        let (summary_sender, summary_receiver) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_summaries(summaries, summary_receiver));
        let executor = Arc::new(Executor {
            jobs,
            uploads,
            summaries: summary_sender,
            tools,
            settings,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let dispatcher = tokio::spawn(dispatch(executor.clone(), slots, receiver));
        Self {
            executor,
            sender,
            dispatcher,
            writer,
        }
    }

    /// Queue a job for execution. Waits while the queue is full.
    pub async fn enqueue(&self, job_id: &str) -> Result<(), EngineError> {
        if let Err(e) = self.executor.jobs.set_progress(job_id, PROGRESS_WAITING) {
            tracing::debug!(%job_id, error = %e, "could not mark job as waiting");
        }
        self.sender
            .send(job_id.to_string())
            .await
            .map_err(|_| EngineError::QueueClosed)
    }

    /// Jobs executing right now.
    pub fn in_flight(&self) -> usize {
        self.executor.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously executing jobs seen so far.
    pub fn peak_in_flight(&self) -> usize {
        self.executor.peak.load(Ordering::SeqCst)
    }

    pub fn fair_share(&self) -> u64 {
        let settings = &self.executor.settings;
        allocate_cpus(u64::MAX, settings.total_cpus, settings.max_concurrent_jobs)
    }

    pub fn output_dir(&self) -> &Path {
        &self.executor.settings.output_dir
    }

    /// Stop accepting jobs, wait for every queued and running job to end,
    /// then for their summaries to be written.
    pub async fn shutdown(self) {
        let Governor {
            executor,
            sender,
            dispatcher,
            writer,
        } = self;
        drop(sender);
        if let Err(e) = dispatcher.await {
            tracing::error!(error = %e, "dispatcher task failed");
        }
        // The writer drains once the last executor handle is gone.
        drop(executor);
        if let Err(e) = writer.await {
            tracing::error!(error = %e, "summary writer failed");
        }
    }
}

async fn dispatch(executor: Arc<Executor>, slots: Arc<Semaphore>, mut receiver: mpsc::Receiver<String>) {
    let mut running = JoinSet::new();
    let mut owners = HashMap::new();

    while let Some(job_id) = receiver.recv().await {
        while let Some(joined) = running.try_join_next_with_id() {
            reap(&executor, &mut owners, joined);
        }
        let permit = match slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        tracing::debug!(%job_id, "slot acquired");
        let task_executor = executor.clone();
        let task_job = job_id.clone();
        let handle = running.spawn(async move { task_executor.execute(task_job, permit).await });
        owners.insert(handle.id(), job_id);
    }

    while let Some(joined) = running.join_next_with_id().await {
        reap(&executor, &mut owners, joined);
    }
}

fn reap(
    executor: &Executor,
    owners: &mut HashMap<tokio::task::Id, String>,
    joined: Result<(tokio::task::Id, ()), tokio::task::JoinError>,
) {
    match joined {
        Ok((id, ())) => {
            owners.remove(&id);
        }
        Err(e) => {
            let job_id = owners.remove(&e.id()).unwrap_or_default();
            tracing::error!(%job_id, error = %e, "job task aborted");
            executor.abandon(&job_id, format!("job task aborted: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Algorithm, JobRequest, MemoryJobStore, ParamValue, Parameters, Tool};
    use crate::registry::MemoryUploadStore;
    use crate::summary::MemorySummaryStore;
    use crate::tools::ToolSettings;
    use crate::tools::testing::CannedExecutor;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    const HITS: &str = "q1\tA1;Fungi;Ascomycota;.;.;.;.;.\t99.0\t20\t0\t0\t1\t20\t1\t20\t1e-5\t40.0\t100\tplus\t20\t20\tACGTACGTACGTACGTACGT\tACGTACGTACGTACGTACGT\n";

    struct Harness {
        dir: TempDir,
        jobs: Arc<MemoryJobStore>,
        uploads: Arc<MemoryUploadStore>,
        summaries: Arc<MemorySummaryStore>,
        file_id: String,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let fasta = dir.path().join("reads.fasta");
        std::fs::write(&fasta, ">q1\nACGTACGTACGTACGTACGT\n>q2\nACGT\n").unwrap();
        let uploads = Arc::new(MemoryUploadStore::new());
        let file_id = uploads.register(&fasta).unwrap();
        Harness {
            dir,
            jobs: Arc::new(MemoryJobStore::new()),
            uploads,
            summaries: Arc::new(MemorySummaryStore::new()),
            file_id,
        }
    }

    /// Refuses every write.
    struct BrokenStore;

    #[async_trait]
    impl SummaryStore for BrokenStore {
        async fn persist(&self, _summary: &JobSummary) -> Result<(), EngineError> {
            Err(EngineError::Io(std::io::Error::other("disk full")))
        }

        async fn list(&self) -> Result<Vec<JobSummary>, EngineError> {
            Ok(Vec::new())
        }
    }

    /// Never completes a write.
    struct StalledStore;

    #[async_trait]
    impl SummaryStore for StalledStore {
        async fn persist(&self, _summary: &JobSummary) -> Result<(), EngineError> {
            std::future::pending().await
        }

        async fn list(&self) -> Result<Vec<JobSummary>, EngineError> {
            Ok(Vec::new())
        }
    }

    fn start(h: &Harness, executor: Arc<CannedExecutor>, n: usize, total_cpus: u64) -> Governor {
        start_with_store(h, executor, n, total_cpus, h.summaries.clone())
    }

    fn start_with_store(
        h: &Harness,
        executor: Arc<CannedExecutor>,
        n: usize,
        total_cpus: u64,
        summaries: Arc<dyn SummaryStore>,
    ) -> Governor {
        Governor::start(
            GovernorSettings {
                max_concurrent_jobs: n,
                total_cpus,
                queue_capacity: 16,
                output_dir: h.dir.path().join("out"),
            },
            h.jobs.clone(),
            h.uploads.clone(),
            summaries,
            ToolAdapter::new(executor, ToolSettings::default()),
        )
    }

    fn submit(h: &Harness, parameters: Parameters) -> String {
        submit_file(h, &h.file_id, parameters)
    }

    fn submit_file(h: &Harness, file_id: &str, parameters: Parameters) -> String {
        let job = Job::new(
            JobRequest {
                file_id: file_id.to_string(),
                tool: Tool::Blast,
                algorithm: Algorithm::Megablast,
                database: "EUKARYOME".into(),
                parameters,
            },
            PathBuf::from("/db/eukaryome"),
        );
        h.jobs.create(job)
    }

    #[test]
    fn fair_share_caps_requested_threads() {
        assert_eq!(allocate_cpus(16, 8, 2), 4);
        assert_eq!(allocate_cpus(2, 8, 2), 2);
        assert_eq!(allocate_cpus(4, 1, 2), 1);
        assert_eq!(allocate_cpus(0, 8, 2), 1);
        assert_eq!(allocate_cpus(8, 8, 0), 8);
    }

    #[tokio::test]
    async fn never_runs_more_than_the_bound() {
        let h = harness();
        let executor = Arc::new(CannedExecutor {
            delay: Duration::from_millis(40),
            ..CannedExecutor::with_hits(HITS)
        });
        let governor = start(&h, executor.clone(), 2, 8);

        let ids: Vec<String> = (0..6).map(|_| submit(&h, Parameters::new())).collect();
        for id in &ids {
            governor.enqueue(id).await.unwrap();
        }
        governor.shutdown().await;

        assert!(executor.peak.load(Ordering::SeqCst) <= 2);
        for id in &ids {
            assert_eq!(h.jobs.get(id).unwrap().status, JobStatus::Finished);
        }
    }

    async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    #[tokio::test]
    async fn in_flight_counter_tracks_admissions() {
        let h = harness();
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(CannedExecutor {
            gate: Some(gate.clone()),
            ..CannedExecutor::with_hits(HITS)
        });
        let governor = start(&h, executor.clone(), 2, 8);
        let ids: Vec<String> = (0..6).map(|_| submit(&h, Parameters::new())).collect();
        for id in &ids {
            governor.enqueue(id).await.unwrap();
        }

        wait_until("two admitted jobs", || executor.current.load(Ordering::SeqCst) == 2).await;
        assert_eq!(governor.in_flight(), 2);
        let queued = ids
            .iter()
            .filter(|id| h.jobs.get(id).unwrap().status == JobStatus::Queued)
            .count();
        assert_eq!(queued, 4);
        assert_eq!(
            h.jobs.get(&ids[5]).unwrap().progress.as_deref(),
            Some(PROGRESS_WAITING)
        );

        gate.add_permits(ids.len());
        governor.shutdown().await;
        assert_eq!(executor.current.load(Ordering::SeqCst), 0);
        assert_eq!(executor.peak.load(Ordering::SeqCst), 2);
        for id in &ids {
            assert_eq!(h.jobs.get(id).unwrap().status, JobStatus::Finished);
        }
    }

    #[tokio::test]
    async fn summary_write_errors_do_not_hold_the_slot() {
        let h = harness();
        let governor = start_with_store(&h, Arc::new(CannedExecutor::with_hits(HITS)), 1, 4, Arc::new(BrokenStore));
        let first = submit(&h, Parameters::new());
        let second = submit(&h, Parameters::new());
        governor.enqueue(&first).await.unwrap();
        governor.enqueue(&second).await.unwrap();
        governor.shutdown().await;

        for id in [&first, &second] {
            assert_eq!(h.jobs.get(id).unwrap().status, JobStatus::Finished);
        }
    }

    #[tokio::test]
    async fn failure_summary_errors_do_not_hold_the_slot() {
        let h = harness();
        let executor = Arc::new(CannedExecutor {
            code: 1,
            ..Default::default()
        });
        let governor = start_with_store(&h, executor, 1, 4, Arc::new(BrokenStore));
        let first = submit(&h, Parameters::new());
        let second = submit(&h, Parameters::new());
        governor.enqueue(&first).await.unwrap();
        governor.enqueue(&second).await.unwrap();
        governor.shutdown().await;

        for id in [&first, &second] {
            assert_eq!(h.jobs.get(id).unwrap().status, JobStatus::Failed);
        }
    }

    #[tokio::test]
    async fn stalled_summary_store_does_not_block_execution() {
        let h = harness();
        let executor = Arc::new(CannedExecutor::with_hits(HITS));
        let governor = start_with_store(&h, executor.clone(), 1, 4, Arc::new(StalledStore));
        let first = submit(&h, Parameters::new());
        let second = submit(&h, Parameters::new());
        governor.enqueue(&first).await.unwrap();
        governor.enqueue(&second).await.unwrap();

        wait_until("both jobs to finish", || {
            [&first, &second]
                .iter()
                .all(|id| h.jobs.get(id).is_some_and(|job| job.status == JobStatus::Finished))
        })
        .await;
        assert_eq!(executor.queries.lock().unwrap().len(), 2);
        wait_until("slots to drain", || governor.in_flight() == 0).await;
    }

    #[tokio::test]
    async fn requested_threads_are_capped_by_fair_share() {
        let h = harness();
        let executor = Arc::new(CannedExecutor::with_hits(HITS));
        let governor = start(&h, executor.clone(), 2, 8);
        assert_eq!(governor.fair_share(), 4);

        let params = Parameters::from([("num_threads".to_string(), ParamValue::Integer(16))]);
        let id = submit(&h, params);
        governor.enqueue(&id).await.unwrap();
        governor.shutdown().await;

        assert_eq!(executor.threads.lock().unwrap().as_slice(), ["4"]);
        let summary = h.summaries.get(&id).await.unwrap();
        assert_eq!(summary.allocated_cpus, Some(4));
        assert_eq!(summary.status, JobStatus::Finished);
        assert_eq!(summary.sequence_count, Some(2));
        assert!(summary.cpu_time_seconds.is_some());
    }

    #[tokio::test]
    async fn finished_job_has_backfilled_results() {
        let h = harness();
        let governor = start(&h, Arc::new(CannedExecutor::with_hits(HITS)), 2, 8);
        let id = submit(&h, Parameters::new());
        governor.enqueue(&id).await.unwrap();
        governor.shutdown().await;

        let job = h.jobs.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Finished);
        assert!(job.started_at.is_some() && job.completed_at.is_some());
        assert!(job.progress.is_none());
        let json = job.result_files.get("json").unwrap();
        let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(doc["summary"]["total_queries"], 2);
        assert_eq!(doc["summary"]["total_hits"], 1);
        assert!(job.result_files.contains_key("raw"));
    }

    #[tokio::test]
    async fn tool_failure_fails_the_job_and_frees_the_slot() {
        let h = harness();
        let executor = Arc::new(CannedExecutor {
            code: 1,
            ..Default::default()
        });
        let governor = start(&h, executor, 1, 4);
        let first = submit(&h, Parameters::new());
        let second = submit(&h, Parameters::new());
        governor.enqueue(&first).await.unwrap();
        governor.enqueue(&second).await.unwrap();
        governor.shutdown().await;

        for id in [&first, &second] {
            let job = h.jobs.get(id).unwrap();
            assert_eq!(job.status, JobStatus::Failed);
            let failure = job.failure.unwrap();
            assert_eq!(failure.kind, FailureKind::ToolExecution);
            assert!(!failure.message.contains("database missing"));
            assert_eq!(failure.stderr.as_deref(), Some("fatal: database missing"));
        }
        let summary = h.summaries.get(&first).await.unwrap();
        assert_eq!(summary.status, JobStatus::Failed);
        assert_eq!(
            summary.failure.and_then(|f| f.stderr).as_deref(),
            Some("fatal: database missing")
        );
    }

    #[tokio::test]
    async fn gzipped_upload_is_decompressed_for_blast() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let h = harness();
        let gz = h.dir.path().join("reads.fa.gz");
        let mut encoder = GzEncoder::new(std::fs::File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(b">q1\nACGTACGTACGTACGTACGT\n>q2\nACGT\n").unwrap();
        encoder.finish().unwrap();
        let file_id = h.uploads.register(&gz).unwrap();

        let executor = Arc::new(CannedExecutor::with_hits(HITS));
        let governor = start(&h, executor.clone(), 2, 8);
        let id = submit_file(&h, &file_id, Parameters::new());
        governor.enqueue(&id).await.unwrap();
        governor.shutdown().await;

        assert_eq!(h.jobs.get(&id).unwrap().status, JobStatus::Finished);
        let query = PathBuf::from(&executor.queries.lock().unwrap()[0]);
        assert_eq!(query, h.dir.path().join("out").join(&id).join(PLAIN_QUERY_FILE));
        assert!(std::fs::read_to_string(&query).unwrap().starts_with(">q1"));
        assert_eq!(h.summaries.get(&id).await.unwrap().sequence_count, Some(2));
    }

    #[tokio::test]
    async fn unparseable_output_fails_the_job() {
        let h = harness();
        let governor = start(&h, Arc::new(CannedExecutor::with_hits("q1\tonly\tthree\n")), 2, 8);
        let id = submit(&h, Parameters::new());
        governor.enqueue(&id).await.unwrap();
        governor.shutdown().await;

        let job = h.jobs.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure.unwrap().kind, FailureKind::Parse);
        assert!(job.result_files.is_empty());
    }

    #[tokio::test]
    async fn missing_upload_is_an_input_failure() {
        let h = harness();
        let governor = start(&h, Arc::new(CannedExecutor::with_hits(HITS)), 2, 8);
        let job = Job::new(
            JobRequest {
                file_id: "gone".into(),
                tool: Tool::Blast,
                algorithm: Algorithm::Blastn,
                database: "EUKARYOME".into(),
                parameters: Parameters::new(),
            },
            PathBuf::from("/db/eukaryome"),
        );
        let id = h.jobs.create(job);
        governor.enqueue(&id).await.unwrap();
        governor.shutdown().await;

        let job = h.jobs.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure.unwrap().kind, FailureKind::Input);
    }
}
