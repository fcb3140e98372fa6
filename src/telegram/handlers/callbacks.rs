//! Retry keyboard callback handling
//!
//! Callback data format: `retry:<failure_id>:<category>:<action>`.
//! Actions: regular, premium, both, cancel, manual. Retries run in a
//! spawned task so the dispatcher stays responsive; the originating
//! notification message collects appended status lines as the retry
//! progresses.

use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, MessageId};

use super::types::{is_admin_user, HandlerDeps};
use crate::core::error::AppResult;
use crate::storage::db::get_connection;
use crate::storage::failures;
use crate::telegram::Bot;
use crate::upload::ledger::{dispatch_retry, RetryOutcome, RetryTarget};

/// Parses callback data of the form `retry:<failure_id>:<category>:<action>`
/// into the failure id and the action token.
pub fn parse_retry_data(data: &str) -> Option<(i64, &str)> {
    let parts: Vec<&str> = data.splitn(4, ':').collect();
    match parts.as_slice() {
        ["retry", id, _category, action] => id.parse::<i64>().ok().map(|id| (id, *action)),
        _ => None,
    }
}

/// Location and accumulated text of the notification message, for edits
struct PromptContext {
    chat_id: ChatId,
    message_id: MessageId,
    text: String,
}

impl PromptContext {
    /// Adds a status line below everything shown so far.
    fn push_line(&mut self, line: &str) {
        self.text.push_str("\n\n");
        self.text.push_str(line);
    }
}

fn prompt_context(q: &CallbackQuery) -> Option<PromptContext> {
    let message = q.message.as_ref()?;
    let text = message
        .regular_message()
        .and_then(|m| m.text())
        .unwrap_or_default()
        .to_string();
    Some(PromptContext {
        chat_id: message.chat().id,
        message_id: message.id(),
        text,
    })
}

/// Appends a status line and edits the message to the accumulated text,
/// so later edits keep earlier lines in place.
async fn edit_prompt(bot: &Bot, ctx: &mut PromptContext, line: &str) {
    ctx.push_line(line);
    if let Err(e) = bot.edit_message_text(ctx.chat_id, ctx.message_id, ctx.text.clone()).await {
        // "message is not modified" is harmless on double-press
        log::debug!("Failed to edit notification {} in chat {}: {}", ctx.message_id.0, ctx.chat_id.0, e);
    }
}

async fn answer(bot: &Bot, query_id: &CallbackQueryId, text: Option<&str>, alert: bool) {
    let mut request = bot.answer_callback_query(query_id.clone());
    if let Some(text) = text {
        request = request.text(text.to_string());
    }
    if alert {
        request = request.show_alert(true);
    }
    if let Err(e) = request.await {
        log::warn!("Failed to answer callback query {}: {}", query_id, e);
    }
}

/// Handles one press on a retry keyboard button.
pub async fn handle_retry_callback(bot: &Bot, q: &CallbackQuery, deps: &HandlerDeps) -> AppResult<()> {
    let data = match q.data.as_deref() {
        Some(data) => data,
        None => {
            answer(bot, &q.id, None, false).await;
            return Ok(());
        }
    };

    let (failure_id, action) = match parse_retry_data(data) {
        Some(parsed) => parsed,
        None => {
            answer(bot, &q.id, None, false).await;
            return Ok(());
        }
    };

    let user_id = i64::try_from(q.from.id.0).unwrap_or(0);
    if !is_admin_user(&deps.db_pool, user_id) {
        answer(bot, &q.id, Some("Not authorized."), true).await;
        return Ok(());
    }

    if deps.callback_cache.get(failure_id).await.is_none() {
        answer(
            bot,
            &q.id,
            Some("This retry prompt has expired. Use /failures for the current list."),
            true,
        )
        .await;
        return Ok(());
    }

    let mut context = prompt_context(q);

    match action {
        "cancel" => {
            answer(bot, &q.id, Some("Cancelled."), false).await;
            deps.callback_cache.remove(failure_id).await;
            if let Some(ctx) = context.as_mut() {
                edit_prompt(bot, ctx, "❌ CANCELLED BY ADMIN").await;
            }
            log::info!("Retry prompt for failure {} cancelled by admin {}", failure_id, user_id);
        }
        "manual" => {
            {
                let conn = get_connection(&deps.db_pool)?;
                failures::mark_manual(&conn, failure_id)?;
            }
            answer(bot, &q.id, Some("Marked for manual upload."), false).await;
            deps.callback_cache.remove(failure_id).await;
            if let Some(ctx) = context.as_mut() {
                edit_prompt(bot, ctx, "⚠️ MARKED FOR MANUAL UPLOAD").await;
            }
            log::info!("Failure {} marked manual by admin {}", failure_id, user_id);
        }
        other => match RetryTarget::parse(other) {
            Some(target) => {
                answer(bot, &q.id, Some("Retry dispatched."), false).await;
                if let Some(ctx) = context.as_mut() {
                    edit_prompt(bot, ctx, "🔄 RETRY IN PROGRESS").await;
                }
                // The context now carries the in-progress line, so the
                // outcome edit appends below it instead of replacing it
                spawn_retry(bot.clone(), deps.clone(), failure_id, target, context);
            }
            None => {
                log::warn!("Unknown retry action '{}' for failure {}", other, failure_id);
                answer(bot, &q.id, None, false).await;
            }
        },
    }

    Ok(())
}

/// Runs the retry off the dispatcher and appends the outcome line.
fn spawn_retry(bot: Bot, deps: HandlerDeps, failure_id: i64, target: RetryTarget, context: Option<PromptContext>) {
    tokio::spawn(async move {
        let retry_config = deps.pipeline.retry_config().clone();
        let outcome = dispatch_retry(&deps.db_pool, &deps.host, &retry_config, failure_id, target).await;

        let line = match outcome {
            Ok(RetryOutcome::Resolved) => {
                deps.callback_cache.remove(failure_id).await;
                "✅ RETRY SUCCESSFUL"
            }
            Ok(RetryOutcome::StillFailing) => "❌ RETRY FAILED",
            Ok(RetryOutcome::ManualRequired) => {
                deps.callback_cache.remove(failure_id).await;
                "⚠️ ATTEMPT LIMIT REACHED, MANUAL UPLOAD REQUIRED"
            }
            Ok(RetryOutcome::AlreadyResolved) => "✅ ALREADY RESOLVED",
            Ok(RetryOutcome::NotFound) => "❌ FAILURE RECORD NOT FOUND",
            Err(e) => {
                log::error!("Retry dispatch for failure {} errored: {}", failure_id, e);
                "❌ RETRY FAILED"
            }
        };

        if let Some(mut ctx) = context {
            edit_prompt(&bot, &mut ctx, line).await;
        }
    });
}
