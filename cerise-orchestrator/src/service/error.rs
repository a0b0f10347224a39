use cerise_core::cwl::CwlError;
use cerise_core::domain::state::Outcome;
use thiserror::Error;

use crate::remote::{FsError, SchedulerError};
use crate::repository::RegistryError;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Cwl(#[from] CwlError),

    #[error("CWL runner produced invalid output: {0}")]
    InvalidRunnerOutput(#[source] CwlError),

    #[error("unexpected output location in runner output: {location}, expected it to start with {prefix}")]
    UnexpectedOutputLocation { location: String, prefix: String },

    #[error("API install script of project {project} returned exit code {exit_code:?}")]
    InstallScriptFailed {
        project: String,
        exit_code: Option<i32>,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl BackendError {
    /// How a job that ran into this error ends. Only a workflow or input
    /// the user got wrong is permanent.
    pub fn outcome(&self) -> Outcome {
        match self {
            BackendError::Cwl(CwlError::Json(_)) => Outcome::SystemError,
            BackendError::Cwl(_) => Outcome::PermanentFailure,
            _ => Outcome::SystemError,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Registry(RegistryError::NotFound(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_outcome() {
        let invalid = BackendError::from(CwlError::validation("no steps"));
        assert_eq!(invalid.outcome(), Outcome::PermanentFailure);

        let missing = BackendError::from(FsError::NotFound("/x".to_string()));
        assert_eq!(missing.outcome(), Outcome::SystemError);

        let garbage = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let garbage = BackendError::from(CwlError::from(garbage));
        assert_eq!(garbage.outcome(), Outcome::SystemError);

        let runner = BackendError::InvalidRunnerOutput(CwlError::validation("no location"));
        assert_eq!(runner.outcome(), Outcome::SystemError);
    }

    #[test]
    fn test_not_found() {
        let err = BackendError::from(RegistryError::NotFound(Uuid::new_v4()));
        assert!(err.is_not_found());
        assert!(!BackendError::Configuration("x".to_string()).is_not_found());
    }
}
