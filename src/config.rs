//! Settings sourced from `RC_*` environment variables.
//!
//! A `.env` file in the working directory is loaded first when present, so
//! local setups can keep credentials out of the shell environment.

use std::env;
use std::time::Duration;

const DEFAULT_URL: &str = "localhost:3000";
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "pass";
const DEFAULT_REOPEN_MS: u64 = 20_000; // 20 second connection attempts
const DEFAULT_PING_MS: u64 = 2_000; // 2 second keep-alive ping
const DEFAULT_CLOSE_MS: u64 = 5_000;
const DEFAULT_INTEGRATION: &str = "rc-sdk";

/// Server instance to connect to, e.g. from `RC_URL` and `RC_SSL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSettings {
    pub url: String,
    pub ssl: bool,
}

/// Account used when no credentials are given to a login call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSettings {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub instance: InstanceSettings,
    pub user: UserSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Settings::default().user
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_lookup(|_| None)
    }
}

impl Settings {
    /// Loads settings from the process environment (after `.env`).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Settings::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Settings {
            instance: InstanceSettings {
                url: lookup("RC_URL").unwrap_or_else(|| DEFAULT_URL.to_string()),
                ssl: parse_bool(lookup("RC_SSL")).unwrap_or(false),
            },
            user: UserSettings {
                username: lookup("RC_USERNAME").unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
                password: lookup("RC_PASSWORD").unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            },
        }
    }
}

/// Connection options for a realtime socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// Host URL:PORT, converted to the websocket protocol.
    pub host: String,
    /// Use SSL (wss) to connect.
    pub ssl: bool,
    /// Interval of the liveness check and delay before a reopen.
    pub reopen: Duration,
    /// Interval between keep-alive pings.
    pub ping: Duration,
    /// How long to wait for a requested close to be acknowledged.
    pub close: Duration,
    /// Integration name, prefixed to the socket's lifecycle log lines.
    pub integration: String,
    /// Default credentials for `login(None)`.
    pub username: String,
    pub password: String,
}

impl Default for SocketOptions {
    fn default() -> Self {
        SocketOptions::from_settings(&Settings::default())
    }
}

impl SocketOptions {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        SocketOptions::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let settings = Settings::from_lookup(&lookup);
        let mut options = SocketOptions::from_settings(&settings);
        if let Some(ms) = parse_u64(lookup("RC_REOPEN")) {
            options.reopen = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(lookup("RC_PING")) {
            options.ping = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(lookup("RC_CLOSE")) {
            options.close = Duration::from_millis(ms);
        }
        if let Some(name) = lookup("RC_INTEGRATION") {
            options.integration = name;
        }
        options
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let host = settings.instance.url.clone();
        let ssl = host.to_lowercase().starts_with("https") || settings.instance.ssl;
        SocketOptions {
            host,
            ssl,
            reopen: Duration::from_millis(DEFAULT_REOPEN_MS),
            ping: Duration::from_millis(DEFAULT_PING_MS),
            close: Duration::from_millis(DEFAULT_CLOSE_MS),
            integration: DEFAULT_INTEGRATION.to_string(),
            username: settings.user.username.clone(),
            password: settings.user.password.clone(),
        }
    }

    /// Options for a given host with all other values at their defaults.
    pub fn with_host(host: impl Into<String>) -> Self {
        let mut settings = Settings::default();
        settings.instance.url = host.into();
        SocketOptions::from_settings(&settings)
    }

    /// Websocket endpoint, e.g. `ws://localhost:3000/websocket`.
    pub fn ws_url(&self) -> String {
        format!("{}/websocket", host_to_ws(&self.host, self.ssl))
    }
}

/// Converts an http(s) address to a websocket URL.
pub fn host_to_ws(host: &str, ssl: bool) -> String {
    let bare = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    format!("ws{}://{}", if ssl { "s" } else { "" }, bare)
}

pub(crate) fn parse_bool(value: Option<String>) -> Option<bool> {
    match value?.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_u64(value: Option<String>) -> Option<u64> {
    value?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let options = SocketOptions::default();
        assert_eq!(options.ws_url(), "ws://localhost:3000/websocket");
        assert_eq!(options.reopen, Duration::from_secs(20));
        assert_eq!(options.ping, Duration::from_secs(2));
        assert_eq!(options.username, "admin");
        assert_eq!(options.password, "pass");
    }

    #[test]
    fn test_host_to_ws() {
        assert_eq!(host_to_ws("localhost:3000", false), "ws://localhost:3000");
        assert_eq!(host_to_ws("http://localhost:3000", false), "ws://localhost:3000");
        assert_eq!(host_to_ws("https://open.rocket.chat", true), "wss://open.rocket.chat");
        assert_eq!(host_to_ws("chat.example.com", true), "wss://chat.example.com");
    }

    #[test]
    fn test_https_host_forces_ssl() {
        let options = SocketOptions::with_host("https://open.rocket.chat");
        assert!(options.ssl);
        assert_eq!(options.ws_url(), "wss://open.rocket.chat/websocket");
    }

    #[test]
    fn test_options_from_lookup() {
        let options = SocketOptions::from_lookup(lookup(&[
            ("RC_URL", "chat.local:4000"),
            ("RC_SSL", "true"),
            ("RC_USERNAME", "bot"),
            ("RC_PASSWORD", "secret"),
            ("RC_REOPEN", "500"),
            ("RC_PING", "100"),
            ("RC_INTEGRATION", "my-bot"),
        ]));
        assert_eq!(options.ws_url(), "wss://chat.local:4000/websocket");
        assert_eq!(options.reopen, Duration::from_millis(500));
        assert_eq!(options.ping, Duration::from_millis(100));
        assert_eq!(options.close, Duration::from_secs(5));
        assert_eq!(options.integration, "my-bot");
        assert_eq!(options.username, "bot");
        assert_eq!(options.password, "secret");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let options =
            SocketOptions::from_lookup(lookup(&[("RC_SSL", "maybe"), ("RC_PING", "soon")]));
        assert!(!options.ssl);
        assert_eq!(options.ping, Duration::from_secs(2));
    }
}
