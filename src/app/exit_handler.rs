//! Exit code logic for the downloader process.
//!
//! Single responsibility: map a batch report to the process exit outcome.

use channel_downloader_core::BatchReport;

use crate::ProcessExit;

/// Any failed item or an interrupted run makes the exit non-zero.
pub(crate) fn determine_exit_outcome(report: &BatchReport) -> ProcessExit {
    if report.interrupted {
        ProcessExit::Failure
    } else if report.failed == 0 {
        ProcessExit::Success
    } else if report.completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
