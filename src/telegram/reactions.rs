//! Best-effort emoji reactions on source messages
//!
//! Reactions are progress feedback only; any failure here is logged
//! and swallowed so it never disturbs the upload flow.

use teloxide::prelude::*;
use teloxide::types::{MessageId, ReactionType};

/// Upload accepted and in flight
pub const REACTION_IN_PROGRESS: &str = "⏳";
/// At least one hosting account accepted the file
pub const REACTION_DONE: &str = "✅";
/// Nothing was stored
pub const REACTION_FAILED: &str = "❌";

/// Try to set a reaction, skipping invalid/unavailable reactions for the chat.
pub async fn try_set_reaction(bot: &Bot, chat_id: ChatId, message_id: MessageId, emoji: &str) {
    let chosen = match pick_allowed_emoji(bot, chat_id, emoji).await {
        Some(emoji) => emoji,
        None => {
            log::debug!("No emoji reactions available in chat {}, skipping", chat_id.0);
            return;
        }
    };

    let reaction = vec![ReactionType::Emoji { emoji: chosen.clone() }];
    if let Err(e) = bot.set_message_reaction(chat_id, message_id).reaction(reaction).await {
        let error_text = e.to_string();
        if error_text.contains("REACTION_INVALID") {
            log::debug!(
                "Reaction '{}' rejected by Telegram for chat {}: {}",
                chosen,
                chat_id.0,
                error_text
            );
        } else {
            log::warn!("Failed to set reaction '{}' for chat {}: {}", chosen, chat_id.0, error_text);
        }
    }
}

/// Returns the requested emoji if the chat allows it, otherwise the
/// first allowed emoji, or None when the chat allows no emoji reactions.
async fn pick_allowed_emoji(bot: &Bot, chat_id: ChatId, emoji: &str) -> Option<String> {
    let chat = match bot.get_chat(chat_id).await {
        Ok(chat) => chat,
        // If the chat cannot be inspected, optimistically try the emoji
        Err(_) => return Some(emoji.to_string()),
    };

    let available = match chat.available_reactions() {
        Some(available) => available,
        // No restriction list means the default set is allowed
        None => return Some(emoji.to_string()),
    };

    let allowed = available
        .iter()
        .any(|reaction| matches!(reaction, ReactionType::Emoji { emoji: allowed } if allowed == emoji));
    if allowed {
        return Some(emoji.to_string());
    }

    available.iter().find_map(|reaction| match reaction {
        ReactionType::Emoji { emoji } => Some(emoji.clone()),
        _ => None,
    })
}
