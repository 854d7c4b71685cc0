//! Endpoint configuration.

use std::time::{SystemTime, UNIX_EPOCH};

/// Relay host used when none is given.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Where to connect and what to call ourselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Relay host name or address
    pub host: String,
    /// Relay port
    pub port: u16,
    /// Name sent as the introduction
    pub display_name: String,
}

impl EndpointConfig {
    /// Config for `port` on [`DEFAULT_HOST`] with a generated display name.
    pub fn new(port: u16) -> Self {
        Self { host: DEFAULT_HOST.to_string(), port, display_name: default_display_name() }
    }
}

/// `"Anon - <unix-millis>"`
pub fn default_display_name() -> String {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis());
    format!("Anon - {millis}")
}
