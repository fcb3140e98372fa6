//! Admin command handlers
//!
//! The dispatcher already gated everything except /start behind the
//! admin check, so these handlers only parse arguments and reply.

use teloxide::prelude::*;
use teloxide::types::Message;

use super::types::HandlerDeps;
use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::storage::db::get_connection;
use crate::storage::failures::{self, ErrorCategory, FailureRecord};
use crate::storage::uploads::{self, UploadStatus};
use crate::storage::groups;
use crate::telegram::notifications::format_size;
use crate::telegram::Bot;
use crate::upload::ledger::{dispatch_retry, RetryOutcome, RetryTarget};

const STATUS_RECENT_LIMIT: i64 = 5;
const FAILURES_LIMIT: i64 = 10;

pub async fn handle_start_command(bot: &Bot, msg: &Message) -> AppResult<()> {
    let text = "👋 I mirror videos posted in registered premium groups to the \
                hosting gateway (regular and premium accounts).\n\n\
                Admin commands:\n\
                /status - bot status and recent uploads\n\
                /groups - watched groups\n\
                /addgroup <chat_id> - watch a group\n\
                /failures - unresolved upload failures\n\
                /retry <failure_id> [regular|premium|both] - retry a failure\n\
                /stats - 7-day statistics\n\
                /sync - re-sync the hosting catalog";
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

fn status_icon(status: UploadStatus) -> &'static str {
    match status {
        UploadStatus::Completed => "✅",
        UploadStatus::PartialSuccess => "🟡",
        UploadStatus::Failed => "❌",
        UploadStatus::Pending | UploadStatus::Processing => "⏳",
    }
}

pub async fn handle_status_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let (recent, group_count, open_failures) = {
        let conn = get_connection(&deps.db_pool)?;
        (
            uploads::recent_tasks(&conn, STATUS_RECENT_LIMIT)?,
            groups::group_count(&conn)?,
            failures::open_failure_count(&conn)?,
        )
    };

    let mut text = format!(
        "🤖 Bot status\n\nWatched groups: {}\nOpen failures: {}\n\nRecent uploads:",
        group_count, open_failures
    );
    if recent.is_empty() {
        text.push_str("\n(none yet)");
    }
    for task in &recent {
        text.push_str(&format!(
            "\n{} #{} {} ({})",
            status_icon(task.status),
            task.id,
            task.original_filename,
            format_size(task.file_size)
        ));
    }

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub async fn handle_groups_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let groups = {
        let conn = get_connection(&deps.db_pool)?;
        groups::list_groups(&conn)?
    };

    if groups.is_empty() {
        bot.send_message(msg.chat.id, "No groups are being watched. Use /addgroup <chat_id>.")
            .await?;
        return Ok(());
    }

    let mut text = String::from("👥 Watched groups:\n");
    for group in &groups {
        let auto = if group.auto_upload_enabled { "auto" } else { "paused" };
        text.push_str(&format!("\n{} ({}) [{}]", group.chat_title, group.chat_id, auto));
    }
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub async fn handle_addgroup_command(bot: &Bot, msg: &Message, deps: &HandlerDeps, args: &str) -> AppResult<()> {
    let chat_id: i64 = match args.trim().parse() {
        Ok(id) => id,
        Err(_) => {
            bot.send_message(msg.chat.id, "Usage: /addgroup <chat_id>").await?;
            return Ok(());
        }
    };

    // Resolve the title if the bot can see the chat
    let title = match bot.get_chat(ChatId(chat_id)).await {
        Ok(chat) => chat.title().map(|t| t.to_string()),
        Err(e) => {
            log::warn!("Could not resolve chat {} while adding it: {}", chat_id, e);
            None
        }
    }
    .unwrap_or_else(|| format!("group {}", chat_id));

    let inserted = {
        let conn = get_connection(&deps.db_pool)?;
        groups::add_group(&conn, chat_id, &title)?
    };

    let reply = if inserted {
        format!("✅ Now watching '{}' ({})", title, chat_id)
    } else {
        format!("'{}' ({}) is already on the watch list", title, chat_id)
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Handles both retry forms:
/// `/retry <failure_id> [regular|premium|both]` and the legacy
/// `/retry <chat_id> <message_id>` which re-checks the stored metadata
/// and re-runs the pipeline for the recorded task.
pub async fn handle_retry_command(bot: &Bot, msg: &Message, deps: &HandlerDeps, args: &str) -> AppResult<()> {
    let parts: Vec<&str> = args.split_whitespace().collect();

    match parts.as_slice() {
        [failure_id] => match failure_id.parse::<i64>() {
            Ok(id) => retry_failure(bot, msg, deps, id, RetryTarget::Both).await,
            Err(_) => usage(bot, msg).await,
        },
        [first, second] => {
            if let (Ok(chat_id), Ok(message_id)) = (first.parse::<i64>(), second.parse::<i32>()) {
                return retry_by_message(bot, msg, deps, chat_id, message_id).await;
            }
            match (first.parse::<i64>(), RetryTarget::parse(second)) {
                (Ok(id), Some(target)) => retry_failure(bot, msg, deps, id, target).await,
                _ => usage(bot, msg).await,
            }
        }
        _ => usage(bot, msg).await,
    }
}

async fn usage(bot: &Bot, msg: &Message) -> AppResult<()> {
    bot.send_message(
        msg.chat.id,
        "Usage: /retry <failure_id> [regular|premium|both]\n\
         or: /retry <chat_id> <message_id>",
    )
    .await?;
    Ok(())
}

async fn retry_failure(bot: &Bot, msg: &Message, deps: &HandlerDeps, failure_id: i64, target: RetryTarget) -> AppResult<()> {
    bot.send_message(
        msg.chat.id,
        format!("🔄 Retrying failure #{} ({})...", failure_id, target.as_str()),
    )
    .await?;

    let retry_config = deps.pipeline.retry_config().clone();
    let outcome = dispatch_retry(&deps.db_pool, &deps.host, &retry_config, failure_id, target).await?;

    let reply = match outcome {
        RetryOutcome::Resolved => {
            deps.callback_cache.remove(failure_id).await;
            format!("✅ Failure #{} resolved, both file codes present", failure_id)
        }
        RetryOutcome::StillFailing => format!(
            "❌ Failure #{} is still failing. Check /failures for details.",
            failure_id
        ),
        RetryOutcome::ManualRequired => {
            deps.callback_cache.remove(failure_id).await;
            format!(
                "⚠️ Failure #{} reached the attempt limit and needs a manual upload",
                failure_id
            )
        }
        RetryOutcome::AlreadyResolved => format!("Failure #{} was already resolved", failure_id),
        RetryOutcome::NotFound => format!("Failure #{} was not found", failure_id),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn retry_by_message(bot: &Bot, msg: &Message, deps: &HandlerDeps, chat_id: i64, message_id: i32) -> AppResult<()> {
    let task = {
        let conn = get_connection(&deps.db_pool)?;
        uploads::find_by_message(&conn, chat_id, message_id)?
    };
    let task = match task {
        Some(task) => task,
        None => {
            bot.send_message(
                msg.chat.id,
                format!("No upload recorded for chat {} message {}", chat_id, message_id),
            )
            .await?;
            return Ok(());
        }
    };

    bot.send_message(msg.chat.id, format!("🔄 Re-running upload #{}...", task.id))
        .await?;

    let report = match deps.pipeline.process_existing(&task).await {
        Ok(report) => report,
        Err(AppError::Validation(reason)) => {
            bot.send_message(msg.chat.id, format!("❌ Upload #{} cannot be retried: {}", task.id, reason))
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let reply = format!(
        "{} Upload #{} finished as {}",
        status_icon(report.status),
        report.upload_id,
        report.status.as_str()
    );
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

fn category_icon(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::RegularFailed => "🟠",
        ErrorCategory::PremiumFailed => "🟣",
        ErrorCategory::BothFailed => "🔴",
        ErrorCategory::Unknown => "⚪",
    }
}

fn format_failure_line(failure: &FailureRecord) -> String {
    let mut line = format!(
        "\n{} #{} upload {} [{}] attempts {}/{}",
        category_icon(failure.category),
        failure.id,
        failure.upload_id,
        failure.category.as_str(),
        failure.attempt_count,
        config::retry::MAX_ATTEMPTS
    );
    if failure.requires_manual_upload {
        line.push_str(" (manual upload required)");
    }
    if let Some(error) = &failure.regular_error {
        line.push_str(&format!("\n   regular: {}", error));
    }
    if let Some(error) = &failure.premium_error {
        line.push_str(&format!("\n   premium: {}", error));
    }
    line
}

pub async fn handle_failures_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let failures = {
        let conn = get_connection(&deps.db_pool)?;
        failures::open_failures(&conn, FAILURES_LIMIT)?
    };

    if failures.is_empty() {
        bot.send_message(msg.chat.id, "✅ No unresolved upload failures.").await?;
        return Ok(());
    }

    let mut text = format!("🚨 Unresolved failures (latest {}):\n", FAILURES_LIMIT);
    for failure in &failures {
        text.push_str(&format_failure_line(failure));
    }
    text.push_str("\n\nRetry with /retry <failure_id> [regular|premium|both]");

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub async fn handle_stats_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let (stats, open) = {
        let conn = get_connection(&deps.db_pool)?;
        (
            uploads::stats_since(&conn, config::stats::WINDOW_DAYS)?,
            failures::open_failure_count(&conn)?,
        )
    };

    let success_rate = if stats.total > 0 {
        (stats.completed as f64 / stats.total as f64) * 100.0
    } else {
        0.0
    };

    let text = format!(
        "📊 Last {} days\n\n\
         Uploads: {}\n\
         Completed: {}\n\
         Partial: {}\n\
         Failed: {}\n\
         In flight: {}\n\
         Volume: {}\n\
         Success rate: {:.1}%\n\
         Open failures: {}",
        config::stats::WINDOW_DAYS,
        stats.total,
        stats.completed,
        stats.partial,
        stats.failed,
        stats.in_flight,
        format_size(stats.total_bytes),
        success_rate,
        open
    );
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub async fn handle_sync_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    bot.send_message(msg.chat.id, "🔄 Syncing the hosting catalog...").await?;
    let synced = deps.host.sync_catalog().await?;
    bot.send_message(msg.chat.id, format!("✅ Catalog sync finished, {} item(s) reported", synced))
        .await?;
    Ok(())
}
