//! Client configuration loaded from environment variables.
//!
//! All settings have defaults pointing at the public service so the client
//! starts with zero configuration.

use std::path::PathBuf;

use textchat_shared::constants::{DEFAULT_API_BASE_URL, DEFAULT_PAGE_SIZE, DEFAULT_WS_URL};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base including the `/api` prefix.
    /// Env: `TEXTCHAT_API_URL`
    /// Default: `https://api.pokee.in/api`
    pub api_base_url: String,

    /// Realtime endpoint.
    /// Env: `TEXTCHAT_WS_URL`
    /// Default: `wss://api.pokee.in/ws`
    pub ws_url: String,

    /// Session database file.
    /// Env: `TEXTCHAT_DB_PATH`
    /// Default: `None` (platform data directory)
    pub database_path: Option<PathBuf>,

    /// Messages fetched per history page.
    /// Env: `TEXTCHAT_PAGE_SIZE`
    /// Default: `50`
    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            database_path: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("TEXTCHAT_API_URL") {
            match validate_url(&url, &["http", "https"]) {
                Ok(()) => config.api_base_url = url.trim_end_matches('/').to_string(),
                Err(e) => tracing::warn!(
                    value = %url,
                    error = %e,
                    "Invalid TEXTCHAT_API_URL, using default"
                ),
            }
        }

        if let Some(url) = lookup("TEXTCHAT_WS_URL") {
            match validate_url(&url, &["ws", "wss"]) {
                Ok(()) => config.ws_url = url,
                Err(e) => tracing::warn!(
                    value = %url,
                    error = %e,
                    "Invalid TEXTCHAT_WS_URL, using default"
                ),
            }
        }

        if let Some(path) = lookup("TEXTCHAT_DB_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("TEXTCHAT_PAGE_SIZE") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => tracing::warn!(value = %val, "Invalid TEXTCHAT_PAGE_SIZE, using default"),
            }
        }

        config
    }
}

fn validate_url(raw: &str, schemes: &[&str]) -> Result<(), String> {
    let url = reqwest::Url::parse(raw).map_err(|e| e.to_string())?;
    if !schemes.contains(&url.scheme()) {
        return Err(format!("unsupported scheme `{}`", url.scheme()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base_url, "https://api.pokee.in/api");
        assert_eq!(config.ws_url, "wss://api.pokee.in/ws");
        assert_eq!(config.page_size, 50);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("TEXTCHAT_API_URL", "http://localhost:8000/api/"),
            ("TEXTCHAT_WS_URL", "ws://localhost:8000/ws"),
            ("TEXTCHAT_DB_PATH", "/tmp/textchat.db"),
            ("TEXTCHAT_PAGE_SIZE", "20"),
        ]);
        assert_eq!(config.api_base_url, "http://localhost:8000/api");
        assert_eq!(config.ws_url, "ws://localhost:8000/ws");
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/textchat.db")));
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("TEXTCHAT_API_URL", "not a url"),
            ("TEXTCHAT_WS_URL", "https://example.com/ws"),
            ("TEXTCHAT_PAGE_SIZE", "0"),
        ]);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }
}
