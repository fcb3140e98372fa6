//! End-to-end upload pipeline
//!
//! Takes an accepted `FileInfo`, records the task, dispatches the dual
//! upload through the shared retry policy, reconciles the outcome and
//! persists everything. The caller (the group handler) only reacts and
//! notifies based on the returned report.

use std::sync::Arc;

use crate::core::error::{AppError, AppResult};
use crate::core::retry::{retry, RetryConfig, RetryError};
use crate::storage::db::{get_connection, DbPool};
use crate::storage::failures::{self, ErrorCategory, NewFailure};
use crate::storage::uploads::{self, NewUploadTask, UploadStatus, UploadTask};
use crate::storage::videos::{self, NewVideo};
use crate::upload::classifier::FileInfo;
use crate::upload::provider::{DualOutcome, UploadRequest, VideoHost};
use crate::upload::reconcile;

/// What the pipeline did for one task
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub upload_id: i64,
    pub status: UploadStatus,
    pub video_id: Option<i64>,
    pub failure_id: Option<i64>,
}

pub struct UploadPipeline {
    db_pool: Arc<DbPool>,
    host: Arc<dyn VideoHost>,
    retry_config: RetryConfig,
}

impl UploadPipeline {
    pub fn new(db_pool: Arc<DbPool>, host: Arc<dyn VideoHost>) -> Self {
        Self {
            db_pool,
            host,
            retry_config: RetryConfig::upload(),
        }
    }

    /// Overrides the retry policy (tests use millisecond delays).
    #[must_use]
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// The policy shared with admin-triggered retries.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// Records a new task and runs it to a terminal status.
    pub async fn process(&self, task: &NewUploadTask<'_>) -> AppResult<PipelineReport> {
        let upload_id = {
            let conn = get_connection(&self.db_pool)?;
            let id = uploads::insert_task(&conn, task)?;
            uploads::set_status(&conn, id, UploadStatus::Processing, None)?;
            id
        };

        let request = UploadRequest {
            file_id: task.file_id.to_string(),
            remote_filename: task.remote_filename.to_string(),
            original_filename: task.original_filename.to_string(),
            file_size: task.file_size,
            mime_type: task.mime_type.to_string(),
            duration: task.duration,
        };

        self.run(upload_id, request).await
    }

    /// Re-runs the pipeline for an already recorded task (legacy /retry).
    ///
    /// The stored metadata goes through the acceptance rules again, so a
    /// task that would no longer be admitted is refused instead of
    /// re-dispatched.
    pub async fn process_existing(&self, task: &UploadTask) -> AppResult<PipelineReport> {
        let info = FileInfo {
            file_id: task.file_id.clone(),
            file_unique_id: task.file_unique_id.clone(),
            original_filename: task.original_filename.clone(),
            file_size: task.file_size,
            mime_type: task.mime_type.clone(),
            duration: task.duration,
            // Dimensions are not persisted; they were checked at intake
            dimensions: None,
        };
        if let Err(reason) = info.validate() {
            return Err(AppError::Validation(format!(
                "stored metadata no longer passes the acceptance rules: {}",
                reason
            )));
        }

        {
            let conn = get_connection(&self.db_pool)?;
            uploads::set_status(&conn, task.id, UploadStatus::Processing, None)?;
        }

        let request = UploadRequest {
            file_id: task.file_id.clone(),
            remote_filename: task.remote_filename.clone(),
            original_filename: task.original_filename.clone(),
            file_size: task.file_size,
            mime_type: task.mime_type.clone(),
            duration: task.duration,
        };

        self.run(task.id, request).await
    }

    async fn run(&self, upload_id: i64, request: UploadRequest) -> AppResult<PipelineReport> {
        let host = Arc::clone(&self.host);
        let pool = Arc::clone(&self.db_pool);
        let max_attempts = self.retry_config.max_attempts;

        let dispatched = retry(&self.retry_config, |attempt| {
            let host = Arc::clone(&host);
            let pool = Arc::clone(&pool);
            let request = request.clone();
            async move {
                if attempt > 1 {
                    note_retry_attempt(&pool, upload_id, attempt, max_attempts);
                }
                host.upload_dual(&request).await
            }
        })
        .await;

        match dispatched.result {
            Ok(outcome) => {
                log::info!(
                    "Upload {} dispatched in {} attempt(s): regular={} premium={}",
                    upload_id,
                    dispatched.attempts,
                    outcome.regular.success,
                    outcome.premium.success
                );
                self.finalize(upload_id, &request, &outcome)
            }
            Err(RetryError::Exhausted { attempts, last_error }) => {
                log::error!(
                    "Upload {} failed after {} attempt(s): {}",
                    upload_id,
                    attempts,
                    last_error
                );
                let conn = get_connection(&self.db_pool)?;
                let message = last_error.to_string();
                uploads::finish_task(&conn, upload_id, UploadStatus::Failed, Some(&message))?;
                // No structured per-provider errors exist at this point
                let failure_id = failures::insert_failure(
                    &conn,
                    &NewFailure {
                        upload_id,
                        category: ErrorCategory::Unknown,
                        regular_error: None,
                        premium_error: None,
                    },
                )?;
                Ok(PipelineReport {
                    upload_id,
                    status: UploadStatus::Failed,
                    video_id: None,
                    failure_id: Some(failure_id),
                })
            }
        }
    }

    fn finalize(&self, upload_id: i64, request: &UploadRequest, outcome: &DualOutcome) -> AppResult<PipelineReport> {
        let conn = get_connection(&self.db_pool)?;
        let status = reconcile::status_for(outcome);

        uploads::set_file_codes(
            &conn,
            upload_id,
            outcome.regular.file_code.as_deref(),
            outcome.premium.file_code.as_deref(),
        )?;

        let video_id = if outcome.any_succeeded() {
            let id = videos::insert_or_get(
                &conn,
                &NewVideo {
                    title: &request.original_filename,
                    regular_file_code: outcome.regular.file_code.as_deref(),
                    premium_file_code: outcome.premium.file_code.as_deref(),
                    file_size: Some(request.file_size),
                    duration: Some(request.duration),
                },
            )?;
            uploads::set_video_id(&conn, upload_id, id)?;
            Some(id)
        } else {
            None
        };

        let failure_id = match reconcile::category_for(outcome) {
            Some(category) => Some(failures::insert_failure(
                &conn,
                &NewFailure {
                    upload_id,
                    category,
                    regular_error: outcome.regular.error.as_deref(),
                    premium_error: outcome.premium.error.as_deref(),
                },
            )?),
            None => None,
        };

        uploads::finish_task(&conn, upload_id, status, None)?;

        Ok(PipelineReport {
            upload_id,
            status,
            video_id,
            failure_id,
        })
    }
}

fn note_retry_attempt(pool: &Arc<DbPool>, upload_id: i64, attempt: u32, max_attempts: u32) {
    match get_connection(pool) {
        Ok(conn) => {
            let note = format!("retry attempt {}/{}", attempt, max_attempts);
            if let Err(e) = uploads::set_status(&conn, upload_id, UploadStatus::Processing, Some(&note)) {
                log::warn!("Failed to record retry note for upload {}: {}", upload_id, e);
            }
        }
        Err(e) => log::warn!("Failed to get DB connection for retry note: {}", e),
    }
}

// End-to-end behavior is covered by tests/pipeline_test.rs with a
// scripted gateway over a scratch database.
