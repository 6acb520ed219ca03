//! Server configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::ratelimit::RateLimitConfig;
use crate::session::ReconnectPolicy;
use crate::webhook::WebhookConfig;

/// Keys rejected outright during startup validation.
const PLACEHOLDER_API_KEYS: [&str; 2] = ["default-api-key", "api-key-123"];
const MIN_API_KEY_LEN: usize = 8;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address and port the HTTP server binds to.
    pub bind_address: String,
    /// Base URL of the messaging gateway daemon.
    pub gateway_url: String,
    /// Accepted API keys for operator endpoints.
    pub api_keys: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub reconnect: ReconnectPolicy,
    pub github_webhook_secret: String,
    pub github_recipient: String,
    pub gitea_webhook_secret: String,
    pub gitea_recipient: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BIND_ADDRESS`: HTTP bind address (default: 0.0.0.0:8080)
    /// - `GATEWAY_URL`: messaging gateway base URL (default: http://127.0.0.1:3000)
    /// - `API_KEYS`: comma-separated API keys (required)
    /// - `RATE_LIMIT_CAPACITY` / `RATE_LIMIT_WINDOW_SECS`: bucket size and window
    /// - `RECONNECT_MAX_ATTEMPTS` / `RECONNECT_INITIAL_SECS` /
    ///   `RECONNECT_MAX_SECS` / `RECONNECT_MULTIPLIER`: backoff policy
    /// - `GITHUB_WEBHOOK_SECRET` / `GITHUB_RECIPIENT`: GitHub intake
    /// - `GITEA_WEBHOOK_SECRET` / `GITEA_RECIPIENT`: Gitea intake
    pub fn from_env() -> Result<Self> {
        let config = Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            gateway_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".into()),
            api_keys: env::var("API_KEYS")
                .map(|v| {
                    v.split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            rate_limit: RateLimitConfig {
                capacity: env_parse("RATE_LIMIT_CAPACITY", 60),
                window: Duration::from_secs(env_parse("RATE_LIMIT_WINDOW_SECS", 60)),
            },
            reconnect: ReconnectPolicy {
                max_attempts: env_parse("RECONNECT_MAX_ATTEMPTS", 10),
                initial_interval: Duration::from_secs(env_parse("RECONNECT_INITIAL_SECS", 5)),
                max_interval: Duration::from_secs(env_parse("RECONNECT_MAX_SECS", 300)),
                multiplier: env_parse("RECONNECT_MULTIPLIER", 1.5),
            },
            github_webhook_secret: env::var("GITHUB_WEBHOOK_SECRET").unwrap_or_default(),
            github_recipient: env::var("GITHUB_RECIPIENT").unwrap_or_default(),
            gitea_webhook_secret: env::var("GITEA_WEBHOOK_SECRET").unwrap_or_default(),
            gitea_recipient: env::var("GITEA_RECIPIENT").unwrap_or_default(),
        };
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api_keys.is_empty() {
            bail!("at least one API key is required (API_KEYS)");
        }
        for key in &self.api_keys {
            if PLACEHOLDER_API_KEYS.contains(&key.as_str()) {
                bail!("placeholder API key detected, set real keys in API_KEYS");
            }
            if key.len() < MIN_API_KEY_LEN {
                bail!("API keys must be at least {MIN_API_KEY_LEN} characters");
            }
        }
        if self.rate_limit.capacity == 0 {
            bail!("rate limit capacity must be positive");
        }
        if self.rate_limit.window.is_zero() {
            bail!("rate limit window must be positive");
        }
        if self.reconnect.multiplier < 1.0 {
            bail!("reconnect multiplier must be at least 1.0");
        }
        Ok(())
    }

    pub fn github_webhook(&self) -> WebhookConfig {
        WebhookConfig::github(
            self.github_webhook_secret.clone(),
            self.github_recipient.clone(),
        )
    }

    pub fn gitea_webhook(&self) -> WebhookConfig {
        WebhookConfig::gitea(
            self.gitea_webhook_secret.clone(),
            self.gitea_recipient.clone(),
        )
    }

    /// Default configuration for tests.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".into(),
            gateway_url: "http://127.0.0.1:3000".into(),
            api_keys: vec!["test-api-key-123456".into()],
            rate_limit: RateLimitConfig::default(),
            reconnect: ReconnectPolicy::default(),
            github_webhook_secret: "github-test-secret".into(),
            github_recipient: "120363041234567890@g.us".into(),
            gitea_webhook_secret: "gitea-test-secret".into(),
            gitea_recipient: "120363049876543210@g.us".into(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid() {
        assert!(Config::default_for_test().validate().is_ok());
    }

    #[test]
    fn rejects_empty_key_set() {
        let mut config = Config::default_for_test();
        config.api_keys.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_placeholder_keys() {
        for placeholder in ["default-api-key", "api-key-123"] {
            let mut config = Config::default_for_test();
            config.api_keys = vec![placeholder.to_string()];
            assert!(config.validate().is_err(), "{placeholder} should be rejected");
        }
    }

    #[test]
    fn rejects_short_keys() {
        let mut config = Config::default_for_test();
        config.api_keys = vec!["short".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_limits() {
        let mut config = Config::default_for_test();
        config.rate_limit.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default_for_test();
        config.reconnect.multiplier = 0.5;
        assert!(config.validate().is_err());
    }
}
