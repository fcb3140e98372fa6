//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::callbacks::handle_retry_callback;
use super::commands::{
    handle_addgroup_command, handle_failures_command, handle_groups_command, handle_retry_command,
    handle_start_command, handle_stats_command, handle_status_command, handle_sync_command,
};
use super::types::{is_admin_user, HandlerDeps, HandlerError};
use super::uploads::handle_group_upload;
use crate::telegram::bot::Command;
use crate::telegram::Bot;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// The same schema is used in production and can be used in integration
/// tests with an injected `HandlerDeps`.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_uploads = deps.clone();
    let deps_callbacks = deps;

    dptree::entry()
        // Commands first so "/retry" in a group never reads as media
        .branch(command_handler(deps_commands))
        // Video and video-document messages in watched groups
        .branch(group_upload_handler(deps_uploads))
        // Retry keyboard buttons
        .branch(callback_handler(deps_callbacks))
}

/// Handler for bot commands (/start, /status, /retry, etc.)
///
/// Everything except /start is admin-only; non-admin commands are
/// dropped without a reply.
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command: {:?} from chat {}", cmd, msg.chat.id);

                let user_id = msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()).unwrap_or(0);
                if !matches!(cmd, Command::Start) && !is_admin_user(&deps.db_pool, user_id) {
                    log::debug!("Dropping {:?} from non-admin user {}", cmd, user_id);
                    return Ok(());
                }

                let cmd_label = format!("{:?}", cmd);
                let result = match cmd {
                    Command::Start => handle_start_command(&bot, &msg).await,
                    Command::Status => handle_status_command(&bot, &msg, &deps).await,
                    Command::Groups => handle_groups_command(&bot, &msg, &deps).await,
                    Command::AddGroup(args) => handle_addgroup_command(&bot, &msg, &deps, &args).await,
                    Command::Retry(args) => handle_retry_command(&bot, &msg, &deps, &args).await,
                    Command::Failures => handle_failures_command(&bot, &msg, &deps).await,
                    Command::Stats => handle_stats_command(&bot, &msg, &deps).await,
                    Command::Sync => handle_sync_command(&bot, &msg, &deps).await,
                };

                if let Err(e) = result {
                    log::error!("Command {} failed for user {}: {}", cmd_label, user_id, e);
                    let _ = bot.send_message(msg.chat.id, format!("❌ Command failed: {}", e)).await;
                }
                Ok(())
            }
        },
    ))
}

/// Handler for video uploads posted in groups
fn group_upload_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.video().is_some() || msg.document().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                if let Err(e) = handle_group_upload(&bot, &msg, &deps).await {
                    log::error!("Group upload handler failed for chat {}: {}", msg.chat.id, e);
                }
                Ok(())
            }
        })
}

/// Handler for callback queries (retry keyboard buttons)
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            if let Err(e) = handle_retry_callback(&bot, &q, &deps).await {
                log::error!("Callback handler failed for user {}: {}", q.from.id, e);
            }
            Ok(())
        }
    })
}
