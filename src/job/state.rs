use chrono::{DateTime, Utc};

use super::model::{Job, JobStatus};
use crate::error::LifecycleError;

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    /// Legal moves of the lifecycle: `QUEUED → RUNNING → {FINISHED | FAILED}`.
    ///
    /// A queued job may also fail directly when it cannot be started at all.
    /// Nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Finished)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// Applies lifecycle transitions to a `Job`, keeping its timestamps consistent.
pub struct Lifecycle;

impl Lifecycle {
    /// Move `job` to `next` at time `now`.
    ///
    /// - `started_at` is stamped on the first entry into `Running`.
    /// - `completed_at` is stamped on entry into a terminal state and never
    ///   precedes `started_at`.
    pub fn apply(job: &mut Job, next: JobStatus, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if !job.status.can_transition_to(next) {
            return Err(LifecycleError::IllegalTransition {
                job_id: job.id.clone(),
                from: job.status,
                to: next,
            });
        }

        if next == JobStatus::Running && job.started_at.is_none() {
            job.started_at = Some(now.max(job.created_at));
        }
        if next.is_terminal() && job.completed_at.is_none() {
            let floor = job.started_at.unwrap_or(job.created_at);
            job.completed_at = Some(now.max(floor));
        }
        job.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Algorithm, JobRequest, Parameters, Tool};
    use chrono::Duration;

    fn make_job() -> Job {
        Job::new(
            JobRequest {
                file_id: "f".into(),
                tool: Tool::Blast,
                algorithm: Algorithm::Megablast,
                database: "db".into(),
                parameters: Parameters::new(),
            },
            "/db".into(),
        )
    }

    #[test]
    fn happy_path_walks_all_states() {
        let mut job = make_job();
        let t0 = job.created_at + Duration::seconds(1);

        Lifecycle::apply(&mut job, JobStatus::Running, t0).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.started_at, Some(t0));
        assert!(job.completed_at.is_none());

        let t1 = t0 + Duration::seconds(30);
        Lifecycle::apply(&mut job, JobStatus::Finished, t1).unwrap();
        assert_eq!(job.status, JobStatus::Finished);
        assert_eq!(job.started_at, Some(t0));
        assert_eq!(job.completed_at, Some(t1));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = make_job();
        let now = Utc::now();
        Lifecycle::apply(&mut job, JobStatus::Running, now).unwrap();
        Lifecycle::apply(&mut job, JobStatus::Failed, now).unwrap();
        let completed = job.completed_at;

        for next in [JobStatus::Queued, JobStatus::Running, JobStatus::Finished, JobStatus::Failed] {
            let err = Lifecycle::apply(&mut job, next, now + Duration::hours(1)).unwrap_err();
            assert!(matches!(err, LifecycleError::IllegalTransition { .. }));
        }
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.completed_at, completed);
    }

    #[test]
    fn queued_job_cannot_finish_without_running() {
        let mut job = make_job();
        assert!(Lifecycle::apply(&mut job, JobStatus::Finished, Utc::now()).is_err());
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn queued_job_may_fail_directly() {
        let mut job = make_job();
        Lifecycle::apply(&mut job, JobStatus::Failed, Utc::now()).unwrap();
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn timestamps_never_run_backwards() {
        let mut job = make_job();
        let started = job.created_at + Duration::seconds(10);
        Lifecycle::apply(&mut job, JobStatus::Running, started).unwrap();
        Lifecycle::apply(&mut job, JobStatus::Finished, started - Duration::seconds(5)).unwrap();
        assert_eq!(job.completed_at, Some(started));
    }

    #[test]
    fn status_display() {
        assert_eq!(JobStatus::Queued.to_string(), "queued");
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert_eq!(JobStatus::Finished.to_string(), "finished");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
