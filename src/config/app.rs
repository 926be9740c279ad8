//! Main application configuration
//!
//! This module defines the configuration structures for the hall service,
//! including environment variable and file loading and validation.

use crate::matchmaker::MatchmakerConfig;
use crate::types::TierBoundaries;
use crate::utils::SESSION_COOKIE;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaking: MatchmakingSettings,
    pub session: SessionSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Lowest score of the middle tier
    pub middle_tier_floor: u32,
    /// Lowest score of the top tier
    pub top_tier_floor: u32,
    /// How often a blocked worker re-checks for shutdown, in milliseconds
    pub worker_idle_poll_ms: u64,
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Lifetime of a session with no open connection, in milliseconds
    pub timeout_ms: u64,
    /// Cookie carrying the session id
    pub cookie_name: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "gobang-hall".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        let boundaries = TierBoundaries::default();
        Self {
            middle_tier_floor: boundaries.high_floor,
            top_tier_floor: boundaries.super_floor,
            worker_idle_poll_ms: 500,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            cookie_name: SESSION_COOKIE.to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", key, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still win
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = parse_env("HEALTH_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_env("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Matchmaking settings
        if let Ok(floor) = env::var("MIDDLE_TIER_FLOOR") {
            self.matchmaking.middle_tier_floor = parse_env("MIDDLE_TIER_FLOOR", &floor)?;
        }
        if let Ok(floor) = env::var("TOP_TIER_FLOOR") {
            self.matchmaking.top_tier_floor = parse_env("TOP_TIER_FLOOR", &floor)?;
        }
        if let Ok(poll) = env::var("WORKER_IDLE_POLL_MS") {
            self.matchmaking.worker_idle_poll_ms = parse_env("WORKER_IDLE_POLL_MS", &poll)?;
        }

        // Session settings
        if let Ok(timeout) = env::var("SESSION_TIMEOUT_MS") {
            self.session.timeout_ms = parse_env("SESSION_TIMEOUT_MS", &timeout)?;
        }
        if let Ok(cookie) = env::var("SESSION_COOKIE_NAME") {
            self.session.cookie_name = cookie;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session.timeout_ms)
    }

    pub fn tier_boundaries(&self) -> TierBoundaries {
        TierBoundaries {
            high_floor: self.matchmaking.middle_tier_floor,
            super_floor: self.matchmaking.top_tier_floor,
        }
    }

    pub fn matchmaker_config(&self) -> MatchmakerConfig {
        MatchmakerConfig {
            boundaries: self.tier_boundaries(),
            idle_poll: Duration::from_millis(self.matchmaking.worker_idle_poll_ms),
        }
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate tiers
    if config.matchmaking.middle_tier_floor == 0 {
        return Err(anyhow!("Middle tier floor must be greater than 0"));
    }
    if config.matchmaking.top_tier_floor <= config.matchmaking.middle_tier_floor {
        return Err(anyhow!(
            "Top tier floor ({}) must be above the middle tier floor ({})",
            config.matchmaking.top_tier_floor,
            config.matchmaking.middle_tier_floor
        ));
    }
    if config.matchmaking.worker_idle_poll_ms == 0 {
        return Err(anyhow!("Worker idle poll must be greater than 0"));
    }

    // Validate sessions
    if config.session.timeout_ms == 0 {
        return Err(anyhow!("Session timeout must be greater than 0"));
    }
    if config.session.cookie_name.is_empty()
        || config.session.cookie_name.contains(['=', ';', ' '])
    {
        return Err(anyhow!(
            "Invalid session cookie name: {:?}",
            config.session.cookie_name
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        validate_config(&config).unwrap();

        assert_eq!(config.session_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.session.cookie_name, "SSID");
        assert_eq!(config.tier_boundaries(), TierBoundaries::default());
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [service]
            health_port = 9100

            [matchmaking]
            top_tier_floor = 3500
            "#,
        )
        .unwrap();

        assert_eq!(config.service.health_port, 9100);
        assert_eq!(config.service.name, "gobang-hall");
        assert_eq!(config.matchmaking.middle_tier_floor, 2000);
        assert_eq!(config.matchmaker_config().boundaries.super_floor, 3500);
        assert_eq!(config.session.timeout_ms, 30_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.matchmaking.top_tier_floor = 1500;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.session.timeout_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.session.cookie_name = "SS ID".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_malformed_toml() {
        assert!(AppConfig::from_toml("[service\nname = 1").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(AppConfig::from_file("/nonexistent/gobang-hall.toml").is_err());
    }
}
