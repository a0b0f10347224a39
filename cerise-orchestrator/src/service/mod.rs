//! Service Module
//!
//! The back end: installing the API on the compute resource, staging jobs
//! in and out, exchanging files with clients, and driving each job through
//! its lifecycle.

mod error;
mod job_files;
mod job_runner;
mod local_files;
mod remote_api;

pub use error::{BackendError, BackendResult};
pub use job_files::RemoteJobFiles;
pub use job_runner::{JobRunner, needs_attention};
pub use local_files::LocalFiles;
pub use remote_api::RemoteApi;
