//! Gateway and API endpoint configuration

use crate::errors::{Error, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_HOST: &str = "localhost:8080";
const DEFAULT_API_BASE_PATH: &str = "/api/v1";
/// Fixed delay between a lost connection and the next attempt
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Connection settings shared by the gateway client and the REST client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// `host[:port]` serving both `/ws` and the REST API
    pub host: String,
    /// Use `wss`/`https` instead of `ws`/`http`
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Upper bound of random extra delay added per attempt (0 = none)
    #[serde(default)]
    pub reconnect_jitter_ms: u64,
    /// Re-send SUBSCRIBE for the active channel whenever the gateway reconnects
    #[serde(default = "default_resubscribe")]
    pub resubscribe_on_reconnect: bool,
    #[serde(default = "default_api_base_path")]
    pub api_base_path: String,
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_resubscribe() -> bool {
    true
}

fn default_api_base_path() -> String {
    DEFAULT_API_BASE_PATH.to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            secure: false,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            reconnect_jitter_ms: 0,
            resubscribe_on_reconnect: true,
            api_base_path: DEFAULT_API_BASE_PATH.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Build a config for the given host with default settings
    pub fn for_host(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
            ..Self::default()
        }
    }

    /// Load from `POTATO_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup. Missing or unparsable values
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("POTATO_HOST") {
            config.host = host.trim().to_string();
        }
        if let Some(secure) = get("POTATO_SECURE").and_then(|v| parse_bool(&v)) {
            config.secure = secure;
        }
        if let Some(delay) = get("POTATO_RECONNECT_DELAY_MS").and_then(|v| v.trim().parse().ok()) {
            config.reconnect_delay_ms = delay;
        }
        if let Some(jitter) =
            get("POTATO_RECONNECT_JITTER_MS").and_then(|v| v.trim().parse().ok())
        {
            config.reconnect_jitter_ms = jitter;
        }
        if let Some(resubscribe) = get("POTATO_RESUBSCRIBE").and_then(|v| parse_bool(&v)) {
            config.resubscribe_on_reconnect = resubscribe;
        }
        config
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn reconnect_jitter(&self) -> Duration {
        Duration::from_millis(self.reconnect_jitter_ms)
    }

    /// Gateway endpoint carrying the credential as a query parameter
    pub fn gateway_url(&self, token: &str) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = parse_url(&format!("{}://{}/ws", scheme, self.host))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    /// REST endpoint for a path relative to the API base, e.g. `channels/1/messages`
    pub fn api_url(&self, path: &str) -> Result<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        parse_url(&format!(
            "{}://{}/{}/{}",
            scheme,
            self.host,
            self.api_base_path.trim_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Config(format!("{}: {}", raw, e)))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_gateway_url_scheme_follows_secure_flag() {
        let plain = GatewayConfig::for_host("chat.local:8080", false);
        assert_eq!(
            plain.gateway_url("T1").unwrap().as_str(),
            "ws://chat.local:8080/ws?token=T1"
        );

        let secure = GatewayConfig::for_host("chat.example.com", true);
        assert_eq!(
            secure.gateway_url("a b+c").unwrap().as_str(),
            "wss://chat.example.com/ws?token=a+b%2Bc"
        );
    }

    #[test]
    fn test_api_url() {
        let config = GatewayConfig::for_host("chat.example.com", true);
        assert_eq!(
            config.api_url("/channels/9/messages").unwrap().as_str(),
            "https://chat.example.com/api/v1/channels/9/messages"
        );
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("POTATO_HOST", "chat.example.com"),
            ("POTATO_SECURE", "true"),
            ("POTATO_RECONNECT_DELAY_MS", "500"),
            ("POTATO_RECONNECT_JITTER_MS", "not-a-number"),
            ("POTATO_RESUBSCRIBE", "off"),
        ]);
        let config = GatewayConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.host, "chat.example.com");
        assert!(config.secure);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(500));
        assert_eq!(config.reconnect_jitter_ms, 0);
        assert!(!config.resubscribe_on_reconnect);
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(|_| None);
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
    }
}
