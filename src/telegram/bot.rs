//! Bot initialization and the command surface
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Telegram UI command registration

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::core::config;

/// Bot commands enum with descriptions
///
/// Everything except /start is admin-gated at dispatch time.
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Mirror bot commands:")]
pub enum Command {
    #[command(description = "show what this bot does")]
    Start,
    #[command(description = "bot status and recent uploads")]
    Status,
    #[command(description = "list watched premium groups")]
    Groups,
    #[command(description = "add a group to the watch list: /addgroup <chat_id>")]
    AddGroup(String),
    #[command(description = "retry a failed upload: /retry <failure_id> [regular|premium|both]")]
    Retry(String),
    #[command(description = "list unresolved upload failures")]
    Failures,
    #[command(description = "7-day upload statistics")]
    Stats,
    #[command(description = "re-sync the hosting catalog")]
    Sync,
}

/// Creates a Bot instance with custom or default API URL
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to create bot (invalid URL, network issues, etc.)
pub fn create_bot() -> anyhow::Result<Bot> {
    // Check if local Bot API server is configured
    let bot = if let Ok(bot_api_url) = std::env::var("BOT_API_URL") {
        log::info!("Using custom Bot API URL: {}", bot_api_url);
        let url = url::Url::parse(&bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
        Bot::from_env_with_client(ClientBuilder::new().timeout(config::network::timeout()).build()?).set_api_url(url)
    } else {
        Bot::from_env_with_client(ClientBuilder::new().timeout(config::network::timeout()).build()?)
    };

    Ok(bot)
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "show what this bot does"),
        BotCommand::new("status", "bot status and recent uploads"),
        BotCommand::new("groups", "list watched premium groups"),
        BotCommand::new("addgroup", "add a group to the watch list"),
        BotCommand::new("retry", "retry a failed upload"),
        BotCommand::new("failures", "list unresolved upload failures"),
        BotCommand::new("stats", "7-day upload statistics"),
        BotCommand::new("sync", "re-sync the hosting catalog"),
    ])
    .await?;

    Ok(())
}
