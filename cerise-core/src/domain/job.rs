//! Job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::log::{LogLevel, format_line};
use crate::domain::state::{Intent, JobState};

/// Job record
///
/// Owned by the job registry. The back end and the REST front end only ever
/// see a copy of it, obtained and written back under the job's lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    /// URI of the workflow document as submitted
    pub workflow: String,
    /// JSON text of the input binding as submitted
    pub local_input: String,
    /// JSON text of the output binding, with locations in the local store
    pub local_output: String,
    pub state: JobState,
    pub please_delete: bool,
    /// Human readable history of the job, one timestamped line per event
    pub log: String,
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Scheduler handle of the runner, once submitted
    pub remote_job_id: Option<String>,
    /// JSON text of the output binding as printed by the runner
    pub remote_output: String,
    /// Everything the runner wrote to standard error so far
    pub remote_error: String,

    pub remote_workdir_path: String,
    pub remote_workflow_path: String,
    pub remote_input_path: String,
    pub remote_stdout_path: String,
    pub remote_stderr_path: String,
    pub remote_system_out_path: String,
    pub remote_system_err_path: String,
}

impl Job {
    /// Creates a freshly submitted job
    pub fn new(name: String, workflow: String, local_input: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            workflow,
            local_input,
            local_output: String::new(),
            state: JobState::Submitted,
            please_delete: false,
            log: String::new(),
            created_at: chrono::Utc::now(),
            remote_job_id: None,
            remote_output: String::new(),
            remote_error: String::new(),
            remote_workdir_path: String::new(),
            remote_workflow_path: String::new(),
            remote_input_path: String::new(),
            remote_stdout_path: String::new(),
            remote_stderr_path: String::new(),
            remote_system_out_path: String::new(),
            remote_system_err_path: String::new(),
        }
    }

    /// Applies `intent` through the lifecycle table; a no-op if the table
    /// has no entry for the current state.
    pub fn apply(&mut self, intent: Intent) -> bool {
        match self.state.next(intent) {
            Some(next) => {
                self.state = next;
                true
            }
            None => false,
        }
    }

    /// Records a cancellation request. Returns false when there was
    /// nothing left to cancel.
    pub fn request_cancel(&mut self) -> bool {
        self.apply(Intent::Cancel)
    }

    pub fn debug(&mut self, message: impl AsRef<str>) {
        self.append_log(LogLevel::Debug, message.as_ref());
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.append_log(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.append_log(LogLevel::Warning, message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.append_log(LogLevel::Error, message.as_ref());
    }

    fn append_log(&mut self, level: LogLevel, message: &str) {
        self.log
            .push_str(&format_line(chrono::Utc::now(), level, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            "test".to_string(),
            "file:///tmp/wf.cwl".to_string(),
            "{}".to_string(),
        )
    }

    #[test]
    fn test_new_job_is_submitted_and_unstaged() {
        let job = job();
        assert_eq!(job.state, JobState::Submitted);
        assert!(job.remote_workdir_path.is_empty());
        assert!(job.remote_output.is_empty());
        assert!(job.remote_job_id.is_none());
    }

    #[test]
    fn test_apply_is_conditional() {
        let mut job = job();
        assert!(!job.apply(Intent::Started));
        assert_eq!(job.state, JobState::Submitted);
        assert!(job.apply(Intent::StartStaging));
        assert_eq!(job.state, JobState::StagingIn);
    }

    #[test]
    fn test_request_cancel_from_running() {
        let mut job = job();
        job.state = JobState::Running;
        assert!(job.request_cancel());
        assert_eq!(job.state, JobState::RunningCr);
        // a second request finds nothing to do
        assert!(!job.request_cancel());
        assert_eq!(job.state, JobState::RunningCr);
    }

    #[test]
    fn test_log_lines_accumulate() {
        let mut job = job();
        job.info("first");
        job.error("second");
        let lines: Vec<&str> = job.log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO    first"));
        assert!(lines[1].ends_with("ERROR   second"));
    }
}
