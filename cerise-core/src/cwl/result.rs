//! Interpretation of the runner's log

use crate::domain::state::Outcome;

const VALIDATION_FAILED: &str = "Tool definition failed validation:";
const PERMANENT_FAIL: &str = "Final process status is permanentFail";
const TEMPORARY_FAIL: &str = "Final process status is temporaryFail";
const SUCCESS: &str = "Final process status is success";

/// Classifies a finished run from the standard error of the CWL runner.
///
/// Markers are checked in priority order, so a log that both failed
/// validation and claims success is a permanent failure. A log without
/// any marker means the runner itself broke.
pub fn get_cwltool_result(cwltool_log: &str) -> Outcome {
    if cwltool_log.contains(VALIDATION_FAILED) || cwltool_log.contains(PERMANENT_FAIL) {
        Outcome::PermanentFailure
    } else if cwltool_log.contains(TEMPORARY_FAIL) {
        Outcome::TemporaryFailure
    } else if cwltool_log.contains(SUCCESS) {
        Outcome::Success
    } else {
        Outcome::SystemError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failure_shadows_success() {
        let log = "Tool definition failed validation:\nblah\nFinal process status is success\n";
        assert_eq!(get_cwltool_result(log), Outcome::PermanentFailure);
    }

    #[test]
    fn test_permanent_fail() {
        let log = "[step wc] completed permanentFail\nFinal process status is permanentFail\n";
        assert_eq!(get_cwltool_result(log), Outcome::PermanentFailure);
    }

    #[test]
    fn test_temporary_fail() {
        let log = "Final process status is temporaryFail";
        assert_eq!(get_cwltool_result(log), Outcome::TemporaryFailure);
    }

    #[test]
    fn test_success() {
        let log = "[job wc.cwl] completed success\nFinal process status is success\n";
        assert_eq!(get_cwltool_result(log), Outcome::Success);
    }

    #[test]
    fn test_no_marker_is_system_error() {
        assert_eq!(get_cwltool_result(""), Outcome::SystemError);
        assert_eq!(
            get_cwltool_result("bash: cwltool: command not found\n"),
            Outcome::SystemError
        );
    }
}
