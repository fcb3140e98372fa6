//! Group video intake
//!
//! Watches registered groups for admin-posted videos and feeds accepted
//! candidates into the upload pipeline. Every rejection on this path is
//! silent toward the group; progress is signaled with reactions only.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::Message;

use super::types::{is_admin_user, HandlerDeps};
use crate::core::error::AppResult;
use crate::storage::db::{get_connection, DbPool};
use crate::storage::uploads::{self, NewUploadTask, UploadStatus};
use crate::storage::{failures, groups};
use crate::telegram::notifications::{notify_failure, notify_success};
use crate::telegram::reactions::{
    try_set_reaction, REACTION_DONE, REACTION_FAILED, REACTION_IN_PROGRESS,
};
use crate::telegram::Bot;
use crate::upload::classifier::{random_remote_name, FileInfo, RejectReason};

/// Why a candidate was dropped without feedback toward the group
#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    SenderNotAdmin,
    GroupNotWatched,
    NotAVideo,
    Rejected(RejectReason),
    /// Holds the id of the upload already recorded for this file
    Duplicate(i64),
}

/// Outcome of the admission gates for one group message
#[derive(Debug, PartialEq, Eq)]
pub enum UploadDecision {
    Accept(FileInfo),
    Skip(SkipReason),
}

/// Runs the silent admission gates for a group message.
///
/// Gate order: sender must be an admin, then the chat must be a watched
/// group with auto-upload enabled, then the candidate must pass the
/// acceptance rules and not duplicate a recorded upload.
pub fn admit_upload(
    db_pool: &Arc<DbPool>,
    user_id: Option<i64>,
    chat_id: i64,
    candidate: Option<FileInfo>,
) -> AppResult<UploadDecision> {
    match user_id {
        Some(id) if is_admin_user(db_pool, id) => {}
        _ => return Ok(UploadDecision::Skip(SkipReason::SenderNotAdmin)),
    }

    let conn = get_connection(db_pool)?;
    if !groups::is_premium_group_with_autoupload(&conn, chat_id)? {
        return Ok(UploadDecision::Skip(SkipReason::GroupNotWatched));
    }

    let info = match candidate {
        Some(info) => info,
        // A document that is not a video; nothing to do
        None => return Ok(UploadDecision::Skip(SkipReason::NotAVideo)),
    };

    if let Err(reason) = info.validate() {
        return Ok(UploadDecision::Skip(SkipReason::Rejected(reason)));
    }

    if let Some(existing) = uploads::find_by_unique_id(&conn, &info.file_unique_id)? {
        return Ok(UploadDecision::Skip(SkipReason::Duplicate(existing.id)));
    }

    Ok(UploadDecision::Accept(info))
}

/// Handles a video or document message posted in a group.
///
/// Every rejection on this path stays silent toward the group; accepted
/// candidates go through the pipeline with reaction feedback.
pub async fn handle_group_upload(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let user_id = match msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()) {
        Some(id) => id,
        None => return Ok(()),
    };
    let chat_id = msg.chat.id;

    let info = match admit_upload(&deps.db_pool, Some(user_id), chat_id.0, FileInfo::from_message(msg))? {
        UploadDecision::Accept(info) => info,
        UploadDecision::Skip(reason) => {
            match reason {
                SkipReason::Rejected(reject) => {
                    log::info!("Skipping candidate in chat {}: {}", chat_id.0, reject)
                }
                SkipReason::Duplicate(existing_id) => {
                    log::info!("Duplicate of upload {} in chat {}, skipping", existing_id, chat_id.0)
                }
                _ => {}
            }
            return Ok(());
        }
    };

    let remote_filename = random_remote_name(&info.original_filename);
    log::info!(
        "Accepted '{}' from admin {} in chat {} as '{}'",
        info.original_filename,
        user_id,
        chat_id.0,
        remote_filename
    );

    try_set_reaction(bot, chat_id, msg.id, REACTION_IN_PROGRESS).await;

    let report = deps
        .pipeline
        .process(&NewUploadTask {
            chat_id: chat_id.0,
            message_id: msg.id.0,
            user_id,
            file_id: &info.file_id,
            file_unique_id: &info.file_unique_id,
            original_filename: &info.original_filename,
            remote_filename: &remote_filename,
            file_size: info.file_size,
            mime_type: &info.mime_type,
            duration: info.duration,
        })
        .await?;

    let emoji = match report.status {
        UploadStatus::Completed | UploadStatus::PartialSuccess => REACTION_DONE,
        UploadStatus::Failed => REACTION_FAILED,
        UploadStatus::Pending | UploadStatus::Processing => REACTION_IN_PROGRESS,
    };
    try_set_reaction(bot, chat_id, msg.id, emoji).await;

    if let Some(failure_id) = report.failure_id {
        let (failure, upload) = {
            let conn = get_connection(&deps.db_pool)?;
            (
                failures::get_failure(&conn, failure_id)?,
                uploads::get_task(&conn, report.upload_id)?,
            )
        };
        if let (Some(failure), Some(upload)) = (failure, upload) {
            notify_failure(bot, &deps.db_pool, &deps.callback_cache, &failure, &upload).await;
        }
    } else if report.status == UploadStatus::Completed {
        let upload = {
            let conn = get_connection(&deps.db_pool)?;
            uploads::get_task(&conn, report.upload_id)?
        };
        if let Some(upload) = upload {
            notify_success(bot, &deps.db_pool, &upload, msg.chat.title()).await;
        }
    }

    Ok(())
}
