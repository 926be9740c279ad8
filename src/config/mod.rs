//! Configuration management for the gobang-hall service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values.

pub mod app;

pub use app::{validate_config, AppConfig, MatchmakingSettings, ServiceSettings, SessionSettings};
