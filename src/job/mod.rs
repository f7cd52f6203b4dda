mod model;
mod state;
mod store;

pub use model::{
    Algorithm, FailureKind, Job, JobFailure, JobRequest, JobStatus, ParamValue, Parameters, Tool,
};
pub use state::Lifecycle;
pub use store::{JobPage, JobStore, JobUpdate, MemoryJobStore};
