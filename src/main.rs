use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::time::{interval, sleep, Duration};

use duomirror::core::{config, init_logger};
use duomirror::storage::db::get_connection;
use duomirror::storage::groups::seed_admins;
use duomirror::storage::create_pool;
use duomirror::telegram::cache::CallbackCache;
use duomirror::telegram::handlers::{schema, HandlerDeps};
use duomirror::telegram::{create_bot, setup_bot_commands};
use duomirror::upload::pipeline::UploadPipeline;
use duomirror::upload::provider::{HostClient, VideoHost};

/// Main entry point for the Telegram bot
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Catch panics in the dispatcher so they can be logged and the
    // connection retried instead of terminating the process
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    // Load environment variables from .env if present
    let _ = dotenv();

    run_bot().await
}

async fn run_bot() -> Result<()> {
    let db_pool = Arc::new(
        create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );

    // Seed the admin roster from the environment bootstrap list
    {
        let conn = get_connection(&db_pool)?;
        let seeded = seed_admins(&conn, &config::admin::ADMIN_IDS)?;
        if seeded > 0 {
            log::info!("Seeded {} admin(s) from ADMIN_IDS", seeded);
        }
    }

    let bot = create_bot()?;
    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to register bot commands: {}", e);
    }

    let host: Arc<dyn VideoHost> = Arc::new(HostClient::from_env()?);
    let pipeline = Arc::new(UploadPipeline::new(Arc::clone(&db_pool), Arc::clone(&host)));

    let callback_cache = Arc::new(CallbackCache::new(config::callback_cache::ttl()));
    {
        let cache = Arc::clone(&callback_cache);
        tokio::spawn(async move {
            let mut ticker = interval(config::callback_cache::sweep_interval());
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        });
    }

    let handler_deps = HandlerDeps::new(
        Arc::clone(&db_pool),
        pipeline,
        Arc::clone(&host),
        Arc::clone(&callback_cache),
    );
    let handler = schema(handler_deps);

    log::info!("Starting bot in long polling mode");

    let mut retry_count: u32 = 0;
    let max_retries = config::retry::MAX_DISPATCHER_RETRIES;

    // Run the dispatcher with retry logic
    loop {
        let bot_clone = bot.clone();
        let handler_clone = handler.clone();

        // Run each dispatcher in its own task to isolate panics;
        // "TX is dead" panics surface through the JoinHandle
        let handle = tokio::spawn(async move {
            use teloxide::update_listeners::Polling;

            // Polling listener that drops pending updates on start
            let listener = Polling::builder(bot_clone.clone()).drop_pending_updates().build();

            Dispatcher::builder(bot_clone, handler_clone)
                .dependencies(DependencyMap::new())
                .enable_ctrlc_handler()
                .build()
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await
        });

        match handle.await {
            Ok(()) => {
                log::info!("Dispatcher shutdown gracefully");
                break;
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    let panic_msg = join_err.to_string();
                    log::error!("Dispatcher panicked: {}", panic_msg);

                    if panic_msg.contains("TX is dead") || panic_msg.contains("SendError") {
                        log::warn!("Detected TX is dead panic - will reconnect...");
                    }

                    if retry_count < max_retries {
                        retry_count += 1;
                        log::info!(
                            "Retrying dispatcher connection after panic (attempt {}/{})...",
                            retry_count,
                            max_retries
                        );
                        exponential_backoff(retry_count).await;
                    } else {
                        log::error!("Max retries reached after panic. Exiting...");
                        break;
                    }
                } else {
                    log::warn!("Dispatcher task was cancelled: {}", join_err);
                    break;
                }
            }
        }

        // Space out reconnects to avoid hammering the API
        if retry_count > 0 {
            sleep(config::retry::dispatcher_delay()).await;
        }
    }

    Ok(())
}

/// Sleeps 2^retry_count seconds between dispatcher reconnects
async fn exponential_backoff(retry_count: u32) {
    let delay = Duration::from_secs(config::retry::EXPONENTIAL_BACKOFF_BASE.pow(retry_count));
    log::info!("Backing off for {:?} before reconnecting", delay);
    sleep(delay).await;
}
