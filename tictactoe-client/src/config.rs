//! Client configuration.

use std::time::Duration;
use tracing::warn;

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub server_url: String,
    /// Limit for establishing the connection.
    pub connect_timeout: Duration,
    /// Limit for one request/response round-trip. Must exceed the server's
    /// move wait or every idle REQUEST_MOVE times out.
    pub request_timeout: Duration,
    /// Period of UPDATE_PAIRING pulls.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080".to_string(),
            connect_timeout: Duration::from_millis(5000),
            request_timeout: Duration::from_millis(15000),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl ClientConfig {
    /// Load from `TICTACTOE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_url: std::env::var("TICTACTOE_SERVER_URL").unwrap_or(defaults.server_url),
            connect_timeout: env_millis("TICTACTOE_CONNECT_TIMEOUT_MS").unwrap_or(defaults.connect_timeout),
            request_timeout: env_millis("TICTACTOE_REQUEST_TIMEOUT_MS").unwrap_or(defaults.request_timeout),
            poll_interval: env_millis("TICTACTOE_POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval),
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}
