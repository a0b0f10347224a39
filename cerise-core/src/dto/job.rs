//! Job DTOs for the REST front end

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::Job;
use crate::domain::state::JobState;

/// Request to submit a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub name: String,
    /// URI of the workflow document
    pub workflow: String,
    /// Input binding for the workflow
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Job state as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CwlState {
    Waiting,
    Running,
    Success,
    Cancelled,
    SystemError,
    TemporaryFailure,
    PermanentFailure,
}

impl From<JobState> for CwlState {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Submitted
            | JobState::StagingIn
            | JobState::StagingInCr
            | JobState::Waiting
            | JobState::WaitingCr => CwlState::Waiting,
            JobState::Running
            | JobState::RunningCr
            | JobState::Finished
            | JobState::StagingOut
            | JobState::StagingOutCr => CwlState::Running,
            JobState::Success => CwlState::Success,
            JobState::Cancelled => CwlState::Cancelled,
            JobState::SystemError => CwlState::SystemError,
            JobState::TemporaryFailure => CwlState::TemporaryFailure,
            JobState::PermanentFailure => CwlState::PermanentFailure,
        }
    }
}

/// A job as presented to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub name: String,
    pub workflow: String,
    pub input: serde_json::Value,
    pub state: CwlState,
    pub output: serde_json::Value,
    /// URL where the job's log can be fetched
    pub log: String,
}

impl JobView {
    /// Builds the client view of `job`. Unparseable stored JSON shows up
    /// as null rather than failing the whole request.
    pub fn from_job(job: &Job, base_url: &str) -> Self {
        let output = if job.local_output.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&job.local_output).unwrap_or_default()
        };
        let input = serde_json::from_str(&job.local_input).unwrap_or_default();

        Self {
            id: job.id,
            name: job.name.clone(),
            workflow: job.workflow.clone(),
            input,
            state: job.state.into(),
            output,
            log: format!("{}/jobs/{}/log", base_url.trim_end_matches('/'), job.id),
        }
    }
}
