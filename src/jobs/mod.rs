//! Generation jobs: identifiers, parameters, status machine and the job store.

mod job;
mod store;

pub use job::{unix_now, JobId, JobInput, JobParams, JobStatus, OperationKind};
pub use store::{JobRecord, JobStore, StatusCounts, StoreError};
