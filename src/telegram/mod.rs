//! Telegram integration: bot setup, handlers, notifications, reactions.

pub mod bot;
pub mod cache;
pub mod handlers;
pub mod notifications;
pub mod reactions;

pub use bot::{create_bot, setup_bot_commands, Command};
pub use teloxide::Bot;
