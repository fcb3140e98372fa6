use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: duomirror.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "duomirror.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: duomirror.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "duomirror.log".to_string()));

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Hosting gateway base URL (handles both the regular and premium accounts)
/// Read from HOST_GATEWAY_URL environment variable
pub static HOST_GATEWAY_URL: Lazy<String> =
    Lazy::new(|| env::var("HOST_GATEWAY_URL").unwrap_or_else(|_| "http://localhost:8787/upload".to_string()));

/// API key for the regular hosting account
/// Read from HOST_API_KEY environment variable
pub static HOST_API_KEY: Lazy<String> = Lazy::new(|| env::var("HOST_API_KEY").unwrap_or_else(|_| String::new()));

/// API key for the premium hosting account
/// Read from HOST_PREMIUM_API_KEY environment variable
pub static HOST_PREMIUM_API_KEY: Lazy<String> =
    Lazy::new(|| env::var("HOST_PREMIUM_API_KEY").unwrap_or_else(|_| String::new()));

/// Upload acceptance limits
pub mod upload {
    /// Minimum accepted file size (1 MB)
    pub const MIN_FILE_SIZE_BYTES: i64 = 1024 * 1024;

    /// Maximum accepted file size (2048 MB, hosting account limit)
    pub const MAX_FILE_SIZE_BYTES: i64 = 2048 * 1024 * 1024;

    /// Files at or below this duration are skipped (clips, previews)
    pub const MIN_DURATION_SECS: i64 = 60;

    /// Minimum width/height in pixels when the resolution is known
    pub const MIN_DIMENSION_PX: u32 = 240;

    /// Length of the random prefix in generated remote filenames
    pub const RANDOM_PREFIX_LEN: usize = 12;
}

/// Retry configuration
pub mod retry {
    use super::Duration;

    /// Total upload attempts per dispatch (1 initial + 2 retries)
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Delay before the first retry (doubles each retry: 5s, 10s, 20s)
    pub const BASE_DELAY_SECS: u64 = 5;

    /// Hard cap on a single backoff delay
    pub const MAX_DELAY_SECS: u64 = 60;

    /// Multiplier for exponential backoff
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Base retry delay duration
    pub fn base_delay() -> Duration {
        Duration::from_secs(BASE_DELAY_SECS)
    }

    /// Maximum number of retries for dispatcher reconnection
    pub const MAX_DISPATCHER_RETRIES: u32 = 5;

    /// Delay between dispatcher retry attempts (in seconds)
    pub const DISPATCHER_RETRY_DELAY_SECS: u64 = 5;

    /// Dispatcher retry delay duration
    pub fn dispatcher_delay() -> Duration {
        Duration::from_secs(DISPATCHER_RETRY_DELAY_SECS)
    }

    /// Base for exponential backoff calculation
    pub const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for HTTP requests (in seconds)
    /// Generous because the gateway streams multi-GB files to the hosting accounts
    pub const REQUEST_TIMEOUT_SECS: u64 = 900; // 15 minutes

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Retry-prompt callback cache configuration
pub mod callback_cache {
    use super::Duration;

    /// How long a retry keyboard stays actionable (in seconds)
    pub const TTL_SECS: u64 = 3600; // 1 hour

    /// Interval between expired-entry sweeps (in seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 600; // 10 minutes

    /// Cache TTL duration
    pub fn ttl() -> Duration {
        Duration::from_secs(TTL_SECS)
    }

    /// Sweep interval duration
    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }
}

/// Statistics configuration
pub mod stats {
    /// Rolling window for /stats aggregates (in days)
    pub const WINDOW_DAYS: i64 = 7;
}

/// Admin configuration
pub mod admin {
    use once_cell::sync::Lazy;
    use std::env;

    fn parse_admin_ids(raw: &str) -> Vec<i64> {
        raw.split([',', ' ', '\n', '\t'])
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .collect()
    }

    /// Admin user IDs (comma-separated)
    /// Read from ADMIN_IDS environment variable
    /// Seeded into the admins table at startup and used as a fallback gate
    pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
        env::var("ADMIN_IDS")
            .ok()
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default()
    });
}
