//! Application Configuration
//!
//! Loaded from built-in defaults overlaid with `TRACKER__*` environment
//! variables (a `.env` file is honoured by the binary via dotenvy).
//! Nested keys use a double underscore, e.g. `TRACKER__RATE_LIMIT__MODE=warn+block`.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::admission::{RateLimitPolicy, RateLimitTier};

/// How the per-IP limiter reacts to a tripped tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum RateLimitMode {
    #[default]
    Off,
    Warn,
    Block,
    WarnAndBlock,
}

impl RateLimitMode {
    /// Whether tripped tiers are reported
    pub fn warns(self) -> bool {
        matches!(self, Self::Warn | Self::WarnAndBlock)
    }

    /// Whether tripped tiers reject the request
    pub fn blocks(self) -> bool {
        matches!(self, Self::Block | Self::WarnAndBlock)
    }
}

impl FromStr for RateLimitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "" => Ok(Self::Off),
            "warn" => Ok(Self::Warn),
            "block" => Ok(Self::Block),
            "warn+block" | "warn_and_block" => Ok(Self::WarnAndBlock),
            other => Err(format!("unknown rate limit mode: {other}")),
        }
    }
}

impl TryFrom<String> for RateLimitMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RateLimitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "none",
            Self::Warn => "warn",
            Self::Block => "block",
            Self::WarnAndBlock => "warn+block",
        };
        f.write_str(s)
    }
}

/// Rate limit section
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub mode: RateLimitMode,
    pub max_reqs_per_10_seconds: u64,
    pub max_reqs_per_minute: u64,
    /// When false, private/loopback/link-local callers bypass the limiter
    pub limit_private_addresses: bool,
    /// Use X-Forwarded-For / X-Real-IP for the client identity
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// Build the runtime policy: fast 10 second tier first, then the minute tier
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            enabled: self.enabled,
            mode: self.mode,
            exempt_private: !self.limit_private_addresses,
            tiers: vec![
                RateLimitTier::per_ip("ip_10_secs_limit", self.max_reqs_per_10_seconds, 10),
                RateLimitTier::per_ip("ip_60_secs_limit", self.max_reqs_per_minute, 60),
            ],
        }
    }
}

/// Deferred bookkeeping worker pool
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub environment: String,
    pub redis_url: Option<String>,
    pub auth_cookie_name: String,
    /// Log requests slower than this (enables profiling hooks)
    pub slow_request_ms: Option<u64>,
    pub dispatcher: DispatcherConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(
                Environment::with_prefix("TRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only, no environment
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("port", 3000)?
            .set_default("environment", "development")?
            .set_default("auth_cookie_name", "_t")?
            .set_default("dispatcher.workers", 4)?
            .set_default("dispatcher.queue_capacity", 1024)?
            .set_default("rate_limit.enabled", true)?
            .set_default("rate_limit.mode", "block")?
            .set_default("rate_limit.max_reqs_per_10_seconds", 50)?
            .set_default("rate_limit.max_reqs_per_minute", 200)?
            .set_default("rate_limit.limit_private_addresses", false)?
            .set_default("rate_limit.trust_forwarded_for", false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("none".parse::<RateLimitMode>().unwrap(), RateLimitMode::Off);
        assert_eq!("warn".parse::<RateLimitMode>().unwrap(), RateLimitMode::Warn);
        assert_eq!("Block".parse::<RateLimitMode>().unwrap(), RateLimitMode::Block);
        assert_eq!(
            "warn+block".parse::<RateLimitMode>().unwrap(),
            RateLimitMode::WarnAndBlock
        );
        assert!("sometimes".parse::<RateLimitMode>().is_err());
    }

    #[test]
    fn test_mode_flags() {
        assert!(!RateLimitMode::Off.warns() && !RateLimitMode::Off.blocks());
        assert!(RateLimitMode::Warn.warns() && !RateLimitMode::Warn.blocks());
        assert!(!RateLimitMode::Block.warns() && RateLimitMode::Block.blocks());
        assert!(RateLimitMode::WarnAndBlock.warns() && RateLimitMode::WarnAndBlock.blocks());
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::defaults().unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.auth_cookie_name, "_t");
        assert!(config.redis_url.is_none());
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.rate_limit.mode, RateLimitMode::Block);

        let policy = config.rate_limit.policy();
        assert!(policy.exempt_private);
        assert_eq!(policy.tiers.len(), 2);
        assert_eq!(policy.tiers[0].name, "ip_10_secs_limit");
        assert_eq!(policy.tiers[0].max_count, 50);
        assert_eq!(policy.tiers[0].window_secs, 10);
        assert_eq!(policy.tiers[1].max_count, 200);
        assert_eq!(policy.tiers[1].window_secs, 60);
    }
}
