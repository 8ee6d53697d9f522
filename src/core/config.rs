use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: safeguard.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "safeguard.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Deployment environment: "local", "staging" or "production"
/// Read from APP_ENV environment variable, defaults to "local"
pub static APP_ENV: Lazy<String> = Lazy::new(|| env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()));

/// True when running against a local development environment.
/// Access-control checks are bypassed entirely in this mode.
pub fn is_development() -> bool {
    APP_ENV.as_str() == "local"
}

/// The single Telegram group this bot serves.
/// Read from ALLOWED_GROUP_ID environment variable; 0 disables publishing.
pub static ALLOWED_GROUP_ID: Lazy<i64> = Lazy::new(|| {
    env::var("ALLOWED_GROUP_ID")
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0)
});

/// Forum thread for published vouches (optional)
/// Read from VOUCH_THREAD_ID environment variable
pub static VOUCH_THREAD_ID: Lazy<Option<i32>> =
    Lazy::new(|| env::var("VOUCH_THREAD_ID").ok().and_then(|raw| raw.trim().parse().ok()));

/// Forum thread for published vetoes (optional)
/// Read from VETO_THREAD_ID environment variable
pub static VETO_THREAD_ID: Lazy<Option<i32>> =
    Lazy::new(|| env::var("VETO_THREAD_ID").ok().and_then(|raw| raw.trim().parse().ok()));

/// The bot's own reserved handle; vouching for or vetoing the bot is refused.
/// Read from BOT_HANDLE environment variable
pub static BOT_HANDLE: Lazy<String> =
    Lazy::new(|| env::var("BOT_HANDLE").unwrap_or_else(|_| "safeguard_bot".to_string()));

/// Optional salt mixed into the one-way submitter identity hash.
/// Read from IDENTITY_SALT environment variable
pub static IDENTITY_SALT: Lazy<String> = Lazy::new(|| env::var("IDENTITY_SALT").unwrap_or_else(|_| String::new()));

/// Wizard session configuration
pub mod session {
    use super::Duration;

    /// Idle sessions older than this are swept away
    pub const IDLE_TIMEOUT_SECS: u64 = 30 * 60;

    /// Interval between expiry sweeps
    pub const SWEEP_INTERVAL_SECS: u64 = 10 * 60;

    /// Maximum images attachable to a veto report
    pub const MAX_VETO_IMAGES: usize = 5;

    /// Maximum vouch description length (characters)
    pub const MAX_DESCRIPTION_LEN: usize = 500;

    /// Maximum veto feedback length (characters)
    pub const MAX_FEEDBACK_LEN: usize = 2000;

    pub fn idle_timeout() -> Duration {
        Duration::from_secs(IDLE_TIMEOUT_SECS)
    }

    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }
}

/// Vote thresholds used when no settings record exists yet
pub mod thresholds {
    /// Upvotes required before a record is approved
    pub const DEFAULT_REQUIRED_UPVOTES: i64 = 15;

    /// Downvotes required before a record is rejected
    pub const DEFAULT_REQUIRED_DOWNVOTES: i64 = 3;
}

/// Ephemeral notice configuration
pub mod notice {
    use super::Duration;

    /// Delay before a wizard success notice deletes itself
    pub const SUCCESS_DELETE_SECS: u64 = 5;

    /// Delay before a cancellation notice deletes itself
    pub const CANCEL_DELETE_SECS: u64 = 2;

    /// Delay before command usage/error notices delete themselves
    pub const USAGE_DELETE_SECS: u64 = 5;

    /// Delay before admin batch status messages are cleaned up
    pub const BATCH_CLEANUP_SECS: u64 = 10;

    pub fn success_delete() -> Duration {
        Duration::from_secs(SUCCESS_DELETE_SECS)
    }

    pub fn cancel_delete() -> Duration {
        Duration::from_secs(CANCEL_DELETE_SECS)
    }

    pub fn usage_delete() -> Duration {
        Duration::from_secs(USAGE_DELETE_SECS)
    }

    pub fn batch_cleanup() -> Duration {
        Duration::from_secs(BATCH_CLEANUP_SECS)
    }
}

/// Admin batch updater configuration
pub mod batch {
    use super::Duration;

    /// Fixed delay between caption edits, to respect outbound rate limits
    pub const INTER_EDIT_DELAY_SECS: u64 = 3;

    /// Progress message is refreshed after this many record updates
    pub const PROGRESS_EVERY: usize = 3;

    pub fn inter_edit_delay() -> Duration {
        Duration::from_secs(INTER_EDIT_DELAY_SECS)
    }
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
    pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
        env::var("ADMIN_IDS")
            .ok()
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default()
    });

    #[cfg(test)]
    mod tests {
        use super::parse_admin_ids;

        #[test]
        fn parses_comma_and_space_separated_ids() {
            assert_eq!(parse_admin_ids("1, 2,3"), vec![1, 2, 3]);
            assert_eq!(parse_admin_ids("748045538 6179266599"), vec![748045538, 6179266599]);
            assert!(parse_admin_ids("").is_empty());
        }
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for outbound HTTP requests (profile image lookups)
    pub const REQUEST_TIMEOUT_SECS: u64 = 10;

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}
