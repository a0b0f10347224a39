use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("scheduler I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to run on the compute resource, and how
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDescription {
    pub name: String,
    pub command: String,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub working_directory: String,
    /// Standard output and error of the program; discarded when absent
    pub stdout_file: Option<String>,
    pub stderr_file: Option<String>,
    /// Where the scheduler itself reports, separate from the program's output
    pub system_out_file: Option<String>,
    pub system_err_file: Option<String>,
    pub queue_name: Option<String>,
    pub num_nodes: u64,
    pub processes_per_node: u64,
}

/// Scheduler-assigned identifier of a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Queued,
    Running,
    Done { exit_code: Option<i32> },
}

/// Batch scheduler of the compute resource
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn submit(&self, description: &JobDescription) -> SchedulerResult<JobHandle>;

    /// Once `Done` has been reported the scheduler may forget the job, and
    /// later queries fail with `UnknownJob`
    async fn status(&self, handle: &JobHandle) -> SchedulerResult<SchedulerStatus>;

    /// Stops the job; a job that already ended is left alone
    async fn cancel(&self, handle: &JobHandle) -> SchedulerResult<()>;

    /// Polls until the job is done and returns its exit code
    async fn wait(&self, handle: &JobHandle) -> SchedulerResult<Option<i32>> {
        loop {
            if let SchedulerStatus::Done { exit_code } = self.status(handle).await? {
                return Ok(exit_code);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}
