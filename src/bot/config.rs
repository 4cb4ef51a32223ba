use super::cache::CacheOptions;
use crate::config::{parse_bool, parse_u64};
use std::env;
use std::time::Duration;

/// Bot driver settings, e.g. from `RC_INTEGRATION_ID` and `RC_JOIN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Applied as the `bot.i` attribute on sent messages.
    pub integration_id: String,
    /// Room names or IDs to join on login.
    pub join: Vec<String>,
    /// Stream subscribed to for messages.
    pub stream_name: String,
    /// Stream room or collection used as the subscription parameter.
    pub stream_room: String,
    pub room_cache: CacheOptions,
    pub dm_cache: CacheOptions,
    pub ignore_direct: bool,
    pub ignore_livechat: bool,
    pub ignore_edited: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig::from_lookup(|_| None)
    }
}

impl DriverConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        DriverConfig::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let cache = |size: &str, age: &str, default_age_ms: u64| CacheOptions {
            max: parse_u64(lookup(size)).unwrap_or(99) as usize,
            max_age: Some(Duration::from_millis(
                parse_u64(lookup(age)).unwrap_or(default_age_ms),
            )),
        };
        DriverConfig {
            integration_id: lookup("RC_INTEGRATION_ID").unwrap_or_else(|| "rc-bot".to_string()),
            join: split_csv(&lookup("RC_JOIN").unwrap_or_else(|| "GENERAL".to_string())),
            stream_name: lookup("RC_STREAM_NAME")
                .unwrap_or_else(|| "stream-room-messages".to_string()),
            stream_room: lookup("RC_STREAM_ROOM").unwrap_or_else(|| "__my_messages__".to_string()),
            room_cache: cache("RC_ROOM_CACHE_SIZE", "RC_ROOM_CACHE_AGE", 60 * 60 * 1000),
            dm_cache: cache("RC_DM_CACHE_SIZE", "RC_DM_CACHE_AGE", 24 * 60 * 60 * 1000),
            ignore_direct: parse_bool(lookup("RC_IGNORE_DIRECT")).unwrap_or(false),
            ignore_livechat: parse_bool(lookup("RC_IGNORE_LIVECHAT")).unwrap_or(false),
            ignore_edited: parse_bool(lookup("RC_IGNORE_EDITED")).unwrap_or(false),
        }
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
