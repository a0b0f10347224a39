//! Job lifecycle states
//!
//! Every job moves through a fixed set of states. Transitions are looked up in
//! a single table keyed by the current state and the requested [`Intent`]; a
//! lookup that has no entry is a no-op, which is what makes cancellation safe
//! to request without inspecting the job first.
//!
//! ```text
//! SUBMITTED -> STAGING_IN -> WAITING -> RUNNING -> FINISHED -> STAGING_OUT -> <outcome>
//!                  |            |          |          |             |
//!            STAGING_IN_CR  WAITING_CR  RUNNING_CR    |      STAGING_OUT_CR
//!                  \____________\__________\__________\_____________\____> CANCELLED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Submitted,
    StagingIn,
    StagingInCr,
    Waiting,
    WaitingCr,
    Running,
    RunningCr,
    Finished,
    StagingOut,
    StagingOutCr,
    Success,
    PermanentFailure,
    TemporaryFailure,
    SystemError,
    Cancelled,
}

/// Terminal outcome of a job that was not cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    PermanentFailure,
    TemporaryFailure,
    SystemError,
}

impl Outcome {
    /// The terminal state recording this outcome
    pub fn state(self) -> JobState {
        match self {
            Outcome::Success => JobState::Success,
            Outcome::PermanentFailure => JobState::PermanentFailure,
            Outcome::TemporaryFailure => JobState::TemporaryFailure,
            Outcome::SystemError => JobState::SystemError,
        }
    }
}

/// Something that happened to a job, or that somebody asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// The back end picked up a new job and starts staging it
    StartStaging,
    /// Staging completed and the runner was handed to the scheduler
    Enqueued,
    /// The scheduler reports the runner as started
    Started,
    /// The scheduler reports the runner as exited
    Completed,
    /// Output retrieval starts
    StartDestaging,
    /// The job concluded normally with the given outcome
    Conclude(Outcome),
    /// A busy step failed; the job ends with the given outcome
    Abort(Outcome),
    /// A user asked for the job to be cancelled
    Cancel,
    /// The back end stopped the remote work of a cancel-requested job
    Halted,
}

impl JobState {
    pub const ALL: [JobState; 15] = [
        JobState::Submitted,
        JobState::StagingIn,
        JobState::StagingInCr,
        JobState::Waiting,
        JobState::WaitingCr,
        JobState::Running,
        JobState::RunningCr,
        JobState::Finished,
        JobState::StagingOut,
        JobState::StagingOutCr,
        JobState::Success,
        JobState::PermanentFailure,
        JobState::TemporaryFailure,
        JobState::SystemError,
        JobState::Cancelled,
    ];

    /// Looks up the transition for `intent` in the lifecycle table.
    ///
    /// Returns `None` when the intent does not apply to this state.
    pub fn next(self, intent: Intent) -> Option<JobState> {
        use Intent::*;
        use JobState::*;

        match (self, intent) {
            (Submitted, StartStaging) => Some(StagingIn),
            (StagingIn, Enqueued) => Some(Waiting),
            (Waiting, Started) => Some(Running),
            (Waiting | Running, Completed) => Some(Finished),
            (Finished, StartDestaging) => Some(StagingOut),
            (Finished | StagingOut, Conclude(outcome)) => Some(outcome.state()),
            (StagingIn | Waiting | Running | Finished | StagingOut, Abort(outcome)) => {
                Some(outcome.state())
            }

            (Submitted, Cancel) => Some(Cancelled),
            (StagingIn, Cancel) => Some(StagingInCr),
            (Waiting, Cancel) => Some(WaitingCr),
            (Running, Cancel) => Some(RunningCr),
            (Finished, Cancel) => Some(Cancelled),
            (StagingOut, Cancel) => Some(StagingOutCr),

            (StagingInCr | WaitingCr | RunningCr | StagingOutCr, Halted) => Some(Cancelled),

            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Success
                | JobState::PermanentFailure
                | JobState::TemporaryFailure
                | JobState::SystemError
                | JobState::Cancelled
        )
    }

    /// True for the shadow states recording a pending cancellation
    pub fn is_cancel_requested(self) -> bool {
        matches!(
            self,
            JobState::StagingInCr
                | JobState::WaitingCr
                | JobState::RunningCr
                | JobState::StagingOutCr
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Submitted => "SUBMITTED",
            JobState::StagingIn => "STAGING_IN",
            JobState::StagingInCr => "STAGING_IN_CR",
            JobState::Waiting => "WAITING",
            JobState::WaitingCr => "WAITING_CR",
            JobState::Running => "RUNNING",
            JobState::RunningCr => "RUNNING_CR",
            JobState::Finished => "FINISHED",
            JobState::StagingOut => "STAGING_OUT",
            JobState::StagingOutCr => "STAGING_OUT_CR",
            JobState::Success => "SUCCESS",
            JobState::PermanentFailure => "PERMANENT_FAILURE",
            JobState::TemporaryFailure => "TEMPORARY_FAILURE",
            JobState::SystemError => "SYSTEM_ERROR",
            JobState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown state name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for JobState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}
