//! Pure mapping from a dual upload outcome to bookkeeping values.

use crate::storage::failures::ErrorCategory;
use crate::storage::uploads::UploadStatus;
use crate::upload::provider::DualOutcome;

/// Maps an outcome to the task status:
/// both ok -> completed, one ok -> partial_success, none -> failed.
pub fn status_for(outcome: &DualOutcome) -> UploadStatus {
    if outcome.both_succeeded() {
        UploadStatus::Completed
    } else if outcome.any_succeeded() {
        UploadStatus::PartialSuccess
    } else {
        UploadStatus::Failed
    }
}

/// Maps an outcome to a failure category, or `None` when nothing failed.
pub fn category_for(outcome: &DualOutcome) -> Option<ErrorCategory> {
    match (outcome.regular.success, outcome.premium.success) {
        (true, true) => None,
        (false, true) => Some(ErrorCategory::RegularFailed),
        (true, false) => Some(ErrorCategory::PremiumFailed),
        (false, false) => Some(ErrorCategory::BothFailed),
    }
}
