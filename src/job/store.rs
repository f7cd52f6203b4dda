//! Injectable job table.
//!
//! [`JobStore`] is the single source of truth for job existence and status.
//! Backends only implement `insert`/`get`/`update`/`all`; the lifecycle
//! operations are provided on top of those so every backend enforces the
//! same transition rules.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::Utc;
use serde::Serialize;

use super::model::{Job, JobFailure, JobStatus};
use super::state::Lifecycle;
use crate::error::LifecycleError;

/// Mutation applied to a stored job under the store's lock.
pub type JobUpdate<'a> = &'a mut dyn FnMut(&mut Job) -> Result<(), LifecycleError>;

/// One page of a job listing.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
}

pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job);

    fn get(&self, id: &str) -> Option<Job>;

    /// Apply `f` to the job atomically and return the updated copy.
    fn update(&self, id: &str, f: JobUpdate<'_>) -> Result<Job, LifecycleError>;

    /// Every job, oldest first.
    fn all(&self) -> Vec<Job>;

    /// Store a freshly created (QUEUED) job and return its id.
    fn create(&self, job: Job) -> String {
        let id = job.id.clone();
        self.insert(job);
        id
    }

    fn transition(&self, id: &str, next: JobStatus) -> Result<Job, LifecycleError> {
        self.update(id, &mut |job: &mut Job| Lifecycle::apply(job, next, Utc::now()))
    }

    /// Terminal failure with a short reason.
    fn fail(&self, id: &str, failure: JobFailure) -> Result<Job, LifecycleError> {
        self.update(id, &mut |job: &mut Job| {
            Lifecycle::apply(job, JobStatus::Failed, Utc::now())?;
            job.failure = Some(failure.clone());
            Ok(())
        })
    }

    fn set_progress(&self, id: &str, progress: &str) -> Result<Job, LifecycleError> {
        self.update(id, &mut |job: &mut Job| {
            job.progress = Some(progress.to_string());
            Ok(())
        })
    }

    /// Record output artifacts. Only meaningful once the job has FINISHED;
    /// earlier calls are rejected.
    fn attach_results(
        &self,
        id: &str,
        files: &BTreeMap<String, PathBuf>,
    ) -> Result<Job, LifecycleError> {
        self.update(id, &mut |job: &mut Job| {
            if job.status != JobStatus::Finished {
                return Err(LifecycleError::IllegalTransition {
                    job_id: job.id.clone(),
                    from: job.status,
                    to: JobStatus::Finished,
                });
            }
            job.result_files.extend(files.clone());
            Ok(())
        })
    }

    /// Move a running job to FINISHED and record its artifacts in one step,
    /// so readers never see a finished job without results.
    fn finish(&self, id: &str, files: &BTreeMap<String, PathBuf>) -> Result<Job, LifecycleError> {
        self.update(id, &mut |job: &mut Job| {
            Lifecycle::apply(job, JobStatus::Finished, Utc::now())?;
            job.result_files.extend(files.clone());
            job.progress = None;
            Ok(())
        })
    }

    /// Jobs filtered by status, paginated in creation order.
    fn page(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> JobPage {
        let limit = limit.clamp(1, 100);
        let matching: Vec<Job> = self
            .all()
            .into_iter()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .collect();
        let total = matching.len();
        let jobs = matching.into_iter().skip(offset).take(limit).collect();
        JobPage {
            jobs,
            limit,
            offset,
            total,
        }
    }
}

/// Process-lifetime job table.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id.clone(), job);
    }

    fn get(&self, id: &str) -> Option<Job> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(id).cloned()
    }

    fn update(&self, id: &str, f: JobUpdate<'_>) -> Result<Job, LifecycleError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;
        // Work on a copy so a rejected update leaves the stored job untouched.
        let mut draft = job.clone();
        f(&mut draft)?;
        *job = draft.clone();
        Ok(draft)
    }

    fn all(&self) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }
}
