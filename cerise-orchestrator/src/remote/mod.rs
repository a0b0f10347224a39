//! Remote resource access
//!
//! The compute resource is reached through two seams: a file system that
//! holds the installed API and the job directories, and a scheduler that
//! runs the CWL runner. The local implementations work on the machine the
//! service runs on.

mod filesystem;
mod local_fs;
mod local_scheduler;
mod scheduler;

pub use filesystem::{CopyOptions, FsError, FsResult, RemoteFileSystem};
pub use local_fs::LocalFileSystem;
pub use local_scheduler::LocalScheduler;
pub use scheduler::{JobDescription, JobHandle, Scheduler, SchedulerError, SchedulerStatus};
