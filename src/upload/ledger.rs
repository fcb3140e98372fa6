//! Failure/retry ledger
//!
//! Drives the per-failure state machine
//! `open -> retrying -> {open, resolved, manual_required}` behind the
//! admin retry buttons and the /retry command. Attempt accounting is
//! capped at 3 dispatches; reaching the cap flags the record for manual
//! upload and nothing retries it afterwards.

use std::sync::Arc;

use crate::core::config;
use crate::core::error::AppResult;
use crate::core::retry::{retry, RetryConfig, RetryError};
use crate::storage::db::{get_connection, DbPool};
use crate::storage::failures::{self, ErrorCategory, FailureRecord, FailureState, RetryHistoryEntry};
use crate::storage::uploads::{self, UploadStatus, UploadTask};
use crate::storage::videos::{self, NewVideo};
use crate::upload::provider::{ProviderKind, ProviderResult, UploadRequest, VideoHost};

/// Which provider(s) an admin retry targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTarget {
    Regular,
    Premium,
    Both,
}

impl RetryTarget {
    /// Parses the action component of callback data or a command argument.
    pub fn parse(raw: &str) -> Option<RetryTarget> {
        match raw {
            "regular" => Some(RetryTarget::Regular),
            "premium" => Some(RetryTarget::Premium),
            "both" => Some(RetryTarget::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetryTarget::Regular => "regular",
            RetryTarget::Premium => "premium",
            RetryTarget::Both => "both",
        }
    }
}

/// What a retry dispatch amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Every missing side now has a file code; the task is completed
    Resolved,
    /// Something still misses a code; the record stays open
    StillFailing,
    /// The attempt cap was reached; the record needs a manual upload
    ManualRequired,
    /// Unknown failure ID
    NotFound,
    /// The record was already resolved earlier
    AlreadyResolved,
}

/// Dispatches one admin-triggered retry for a failure record.
///
/// Shares the retry policy with the automatic pipeline; one dispatch
/// counts as one ledger attempt regardless of in-call backoff.
pub async fn dispatch_retry(
    db_pool: &Arc<DbPool>,
    host: &Arc<dyn VideoHost>,
    retry_config: &RetryConfig,
    failure_id: i64,
    target: RetryTarget,
) -> AppResult<RetryOutcome> {
    let (failure, upload, attempt) = {
        let conn = get_connection(db_pool)?;
        let failure = match failures::get_failure(&conn, failure_id)? {
            Some(f) => f,
            None => return Ok(RetryOutcome::NotFound),
        };
        if failure.state == FailureState::Resolved {
            return Ok(RetryOutcome::AlreadyResolved);
        }
        if failure.requires_manual_upload || failure.state == FailureState::ManualRequired {
            return Ok(RetryOutcome::ManualRequired);
        }
        if failure.attempt_count >= i64::from(config::retry::MAX_ATTEMPTS) {
            failures::mark_manual(&conn, failure_id)?;
            log::warn!(
                "Failure {} reached the attempt cap, flagged for manual upload",
                failure_id
            );
            return Ok(RetryOutcome::ManualRequired);
        }
        let upload = match uploads::get_task(&conn, failure.upload_id)? {
            Some(u) => u,
            None => return Ok(RetryOutcome::NotFound),
        };

        let attempt = failures::bump_attempt(&conn, failure_id)?;
        failures::set_state(&conn, failure_id, FailureState::Retrying)?;
        (failure, upload, attempt)
    };

    log::info!(
        "Dispatching retry {}/{} for failure {} (target: {})",
        attempt,
        config::retry::MAX_ATTEMPTS,
        failure_id,
        target.as_str()
    );

    let request = request_from_task(&upload);
    let attempted = execute_target(host, retry_config, target, &request).await;

    settle(db_pool, &failure, &upload, attempt, target, attempted)
}

fn request_from_task(task: &UploadTask) -> UploadRequest {
    UploadRequest {
        file_id: task.file_id.clone(),
        remote_filename: task.remote_filename.clone(),
        original_filename: task.original_filename.clone(),
        file_size: task.file_size,
        mime_type: task.mime_type.clone(),
        duration: task.duration,
    }
}

/// Runs the restricted upload; a call-level failure materializes as
/// per-provider failure results so history stays uniform.
async fn execute_target(
    host: &Arc<dyn VideoHost>,
    retry_config: &RetryConfig,
    target: RetryTarget,
    request: &UploadRequest,
) -> Vec<ProviderResult> {
    match target {
        RetryTarget::Both => {
            let dispatched = retry(retry_config, |_| {
                let host = Arc::clone(host);
                let request = request.clone();
                async move { host.upload_dual(&request).await }
            })
            .await;
            match dispatched.result {
                Ok(outcome) => vec![outcome.regular, outcome.premium],
                Err(RetryError::Exhausted { last_error, .. }) => {
                    let message = last_error.to_string();
                    vec![
                        ProviderResult::err(ProviderKind::Regular, message.clone()),
                        ProviderResult::err(ProviderKind::Premium, message),
                    ]
                }
            }
        }
        RetryTarget::Regular | RetryTarget::Premium => {
            let provider = match target {
                RetryTarget::Regular => ProviderKind::Regular,
                _ => ProviderKind::Premium,
            };
            let dispatched = retry(retry_config, |_| {
                let host = Arc::clone(host);
                let request = request.clone();
                async move { host.upload_single(provider, &request).await }
            })
            .await;
            match dispatched.result {
                Ok(result) => vec![result],
                Err(RetryError::Exhausted { last_error, .. }) => {
                    vec![ProviderResult::err(provider, last_error.to_string())]
                }
            }
        }
    }
}

/// Writes history, merges codes, and recomputes both the task status
/// and the failure state after a retry dispatch.
fn settle(
    db_pool: &Arc<DbPool>,
    failure: &FailureRecord,
    upload: &UploadTask,
    attempt: i64,
    target: RetryTarget,
    attempted: Vec<ProviderResult>,
) -> AppResult<RetryOutcome> {
    let conn = get_connection(db_pool)?;
    let timestamp = chrono::Utc::now().to_rfc3339();

    for result in &attempted {
        failures::append_history(
            &conn,
            failure.id,
            &RetryHistoryEntry {
                timestamp: timestamp.clone(),
                provider: result.provider.as_str().to_string(),
                attempt,
                success: result.success,
            },
        )?;
        if result.success {
            let (regular, premium) = match result.provider {
                ProviderKind::Regular => (result.file_code.as_deref(), None),
                ProviderKind::Premium => (None, result.file_code.as_deref()),
            };
            uploads::set_file_codes(&conn, upload.id, regular, premium)?;
        }
    }

    // The attempted sides overwrite their stored errors; untouched
    // sides keep what the original dispatch recorded.
    let mut regular_error = failure.regular_error.clone();
    let mut premium_error = failure.premium_error.clone();
    for result in &attempted {
        let slot = match result.provider {
            ProviderKind::Regular => &mut regular_error,
            ProviderKind::Premium => &mut premium_error,
        };
        *slot = if result.success { None } else { result.error.clone() };
    }

    let current = uploads::get_task(&conn, upload.id)?.unwrap_or_else(|| upload.clone());
    let has_regular = current.regular_file_code.is_some();
    let has_premium = current.premium_file_code.is_some();

    if current.video_id.is_none() && (has_regular || has_premium) {
        let video_id = videos::insert_or_get(
            &conn,
            &NewVideo {
                title: &current.original_filename,
                regular_file_code: current.regular_file_code.as_deref(),
                premium_file_code: current.premium_file_code.as_deref(),
                file_size: Some(current.file_size),
                duration: Some(current.duration),
            },
        )?;
        uploads::set_video_id(&conn, upload.id, video_id)?;
    }

    if has_regular && has_premium {
        uploads::finish_task(&conn, upload.id, UploadStatus::Completed, None)?;
        failures::resolve(&conn, failure.id)?;
        log::info!(
            "Failure {} resolved on attempt {} (target: {})",
            failure.id,
            attempt,
            target.as_str()
        );
        return Ok(RetryOutcome::Resolved);
    }

    let status = if has_regular || has_premium {
        UploadStatus::PartialSuccess
    } else {
        UploadStatus::Failed
    };
    uploads::finish_task(&conn, upload.id, status, None)?;

    let category = match (has_regular, has_premium) {
        (false, false) => ErrorCategory::BothFailed,
        (false, true) => ErrorCategory::RegularFailed,
        (true, false) => ErrorCategory::PremiumFailed,
        (true, true) => unreachable!("resolved branch returned above"),
    };
    failures::update_errors(&conn, failure.id, category, regular_error.as_deref(), premium_error.as_deref())?;

    if attempt >= i64::from(config::retry::MAX_ATTEMPTS) {
        failures::mark_manual(&conn, failure.id)?;
        log::warn!(
            "Failure {} still failing after attempt {}, flagged for manual upload",
            failure.id,
            attempt
        );
        Ok(RetryOutcome::ManualRequired)
    } else {
        failures::set_state(&conn, failure.id, FailureState::Open)?;
        Ok(RetryOutcome::StillFailing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_target_parsing() {
        assert_eq!(RetryTarget::parse("regular"), Some(RetryTarget::Regular));
        assert_eq!(RetryTarget::parse("premium"), Some(RetryTarget::Premium));
        assert_eq!(RetryTarget::parse("both"), Some(RetryTarget::Both));
        assert_eq!(RetryTarget::parse("cancel"), None);
        assert_eq!(RetryTarget::parse(""), None);
    }
}
