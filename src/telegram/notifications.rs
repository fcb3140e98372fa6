//! Admin notification fan-out
//!
//! Failure notifications carry category-specific retry keyboards;
//! success notifications are plain text. Delivery is best-effort per
//! admin and counts as successful when at least one admin was reached.
//! Every dispatch writes a notification_log audit row.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::core::config;
use crate::storage::db::{get_connection, DbPool};
use crate::storage::failures::{ErrorCategory, FailureRecord};
use crate::storage::groups;
use crate::storage::notifications::{log_notification, NewNotification};
use crate::storage::uploads::UploadTask;
use crate::telegram::cache::CallbackCache;

const PREVIEW_LEN: usize = 200;

/// All admins to fan out to: table rows plus the env bootstrap list.
fn admin_recipients(db_pool: &Arc<DbPool>) -> Vec<i64> {
    let mut recipients = match get_connection(db_pool) {
        Ok(conn) => groups::active_admins(&conn).unwrap_or_else(|e| {
            log::warn!("Failed to read admin roster: {}", e);
            Vec::new()
        }),
        Err(e) => {
            log::warn!("Failed to get DB connection for admin roster: {}", e);
            Vec::new()
        }
    };
    for id in config::admin::ADMIN_IDS.iter() {
        if !recipients.contains(id) {
            recipients.push(*id);
        }
    }
    recipients
}

/// Builds the retry keyboard for a failure category.
///
/// Callback data format: `retry:<failure_id>:<category>:<action>`.
pub fn failure_keyboard(category: ErrorCategory, attempt_count: i64, failure_id: i64) -> InlineKeyboardMarkup {
    let data = |action: &str| format!("retry:{}:{}:{}", failure_id, category.as_str(), action);

    let mut rows: Vec<Vec<InlineKeyboardButton>> = match category {
        ErrorCategory::BothFailed => vec![
            vec![
                InlineKeyboardButton::callback("🔄 Retry Regular", data("regular")),
                InlineKeyboardButton::callback("🔄 Retry Premium", data("premium")),
            ],
            vec![
                InlineKeyboardButton::callback("🔄 Retry Both", data("both")),
                InlineKeyboardButton::callback("❌ Cancel", data("cancel")),
            ],
        ],
        ErrorCategory::RegularFailed => vec![vec![
            InlineKeyboardButton::callback("🔄 Retry Regular", data("regular")),
            InlineKeyboardButton::callback("❌ Cancel", data("cancel")),
        ]],
        ErrorCategory::PremiumFailed => vec![vec![
            InlineKeyboardButton::callback("🔄 Retry Premium", data("premium")),
            InlineKeyboardButton::callback("❌ Cancel", data("cancel")),
        ]],
        ErrorCategory::Unknown => vec![vec![
            InlineKeyboardButton::callback("🔄 Retry Upload", data("both")),
            InlineKeyboardButton::callback("❌ Cancel", data("cancel")),
        ]],
    };

    if attempt_count >= i64::from(config::retry::MAX_ATTEMPTS) {
        rows.push(vec![InlineKeyboardButton::callback(
            "⚠️ Mark Manual Required",
            data("manual"),
        )]);
    }

    InlineKeyboardMarkup::new(rows)
}

/// Renders the failure summary shown to admins.
pub fn format_failure_text(failure: &FailureRecord, upload: &UploadTask) -> String {
    let side = |error: &Option<String>| match error {
        None => "✅ ok".to_string(),
        Some(e) => format!("❌ {}", e),
    };
    let category_label = match failure.category {
        ErrorCategory::RegularFailed => "regular account failed",
        ErrorCategory::PremiumFailed => "premium account failed",
        ErrorCategory::BothFailed => "both accounts failed",
        ErrorCategory::Unknown => "upload call failed",
    };

    format!(
        "🚨 Upload failure #{}\n\n\
         File: {}\n\
         Size: {}\n\
         Duration: {}s\n\
         Category: {}\n\
         Regular: {}\n\
         Premium: {}\n\
         Attempts: {}/{}",
        failure.id,
        upload.original_filename,
        format_size(upload.file_size),
        upload.duration,
        category_label,
        side(&failure.regular_error),
        side(&failure.premium_error),
        failure.attempt_count,
        config::retry::MAX_ATTEMPTS,
    )
}

/// Human-readable size in MB.
pub fn format_size(bytes: i64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Sends a failure notification with a retry keyboard to every admin.
///
/// Returns true when at least one admin was reached.
pub async fn notify_failure(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    cache: &Arc<CallbackCache>,
    failure: &FailureRecord,
    upload: &UploadTask,
) -> bool {
    let text = format_failure_text(failure, upload);
    let keyboard = failure_keyboard(failure.category, failure.attempt_count, failure.id);
    let recipients = admin_recipients(db_pool);

    let mut sent = 0i64;
    for admin_id in &recipients {
        match bot
            .send_message(ChatId(*admin_id), text.clone())
            .reply_markup(keyboard.clone())
            .await
        {
            Ok(_) => sent += 1,
            Err(e) => log::warn!("Failed to notify admin {} about failure {}: {}", admin_id, failure.id, e),
        }
    }

    cache.insert(failure.id, failure.category, upload.id).await;

    audit(
        db_pool,
        Some(failure.id),
        "upload_failure",
        sent,
        Some(failure.category.as_str()),
        &text,
    );

    if sent == 0 {
        log::error!("Failure {} could not be delivered to any admin", failure.id);
    }
    sent > 0
}

/// Sends a plain-text success notification to every admin.
pub async fn notify_success(bot: &Bot, db_pool: &Arc<DbPool>, upload: &UploadTask, chat_title: Option<&str>) -> bool {
    let text = format!(
        "✅ Upload completed\n\n\
         File: {}\n\
         Size: {}\n\
         Group: {}\n\
         Regular code: {}\n\
         Premium code: {}",
        upload.original_filename,
        format_size(upload.file_size),
        chat_title.unwrap_or("unknown"),
        upload.regular_file_code.as_deref().unwrap_or("-"),
        upload.premium_file_code.as_deref().unwrap_or("-"),
    );

    let recipients = admin_recipients(db_pool);
    let mut sent = 0i64;
    for admin_id in &recipients {
        match bot.send_message(ChatId(*admin_id), text.clone()).await {
            Ok(_) => sent += 1,
            Err(e) => log::warn!("Failed to notify admin {} about upload {}: {}", admin_id, upload.id, e),
        }
    }

    audit(db_pool, None, "upload_success", sent, None, &text);
    sent > 0
}

fn audit(
    db_pool: &Arc<DbPool>,
    failure_id: Option<i64>,
    kind: &str,
    sent_to_count: i64,
    category: Option<&str>,
    text: &str,
) {
    let preview: String = text.chars().take(PREVIEW_LEN).collect();
    match get_connection(db_pool) {
        Ok(conn) => {
            if let Err(e) = log_notification(
                &conn,
                &NewNotification {
                    failure_id,
                    kind,
                    sent_to_count,
                    category,
                    message_preview: &preview,
                },
            ) {
                log::warn!("Failed to write notification audit row: {}", e);
            }
        }
        Err(e) => log::warn!("Failed to get DB connection for notification audit: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn button_data(keyboard: &InlineKeyboardMarkup) -> Vec<Vec<String>> {
        keyboard
            .inline_keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| match &button.kind {
                        teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
                        other => panic!("unexpected button kind: {:?}", other),
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_both_failed_keyboard_layout() {
        let keyboard = failure_keyboard(ErrorCategory::BothFailed, 1, 9);
        assert_eq!(
            button_data(&keyboard),
            vec![
                vec![
                    "retry:9:both_failed:regular".to_string(),
                    "retry:9:both_failed:premium".to_string()
                ],
                vec![
                    "retry:9:both_failed:both".to_string(),
                    "retry:9:both_failed:cancel".to_string()
                ],
            ]
        );
    }

    #[test]
    fn test_single_side_keyboard_layout() {
        let keyboard = failure_keyboard(ErrorCategory::PremiumFailed, 1, 5);
        assert_eq!(
            button_data(&keyboard),
            vec![vec![
                "retry:5:premium_failed:premium".to_string(),
                "retry:5:premium_failed:cancel".to_string()
            ]]
        );
    }

    #[test]
    fn test_unknown_keyboard_retries_both() {
        let keyboard = failure_keyboard(ErrorCategory::Unknown, 1, 3);
        assert_eq!(
            button_data(&keyboard),
            vec![vec!["retry:3:unknown:both".to_string(), "retry:3:unknown:cancel".to_string()]]
        );
    }

    #[test]
    fn test_attempt_cap_adds_manual_row() {
        let keyboard = failure_keyboard(ErrorCategory::RegularFailed, 3, 8);
        let data = button_data(&keyboard);
        assert_eq!(data.len(), 2);
        assert_eq!(data[1], vec!["retry:8:regular_failed:manual".to_string()]);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1536 * 1024), "1.5 MB");
    }
}
