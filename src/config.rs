//! Runtime configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honoured (via dotenvy) before
//! the process environment is read. Every variable is optional:
//!
//! - `SUBS_DB_PATH` - SQLite file (default: `subscriptions.db`)
//! - `LISTEN` - server bind address (default: `0.0.0.0:3000`)
//! - `RUST_LOG` - log filter (default: `info`)
//! - `LOG_FORMAT` - `text` or `json` (default: `text`)
//! - `REMINDER_DAYS_BEFORE` - reminder lead time, one of 1, 3, 7 (default: 3)
//! - `RENEWS_SOON_DAYS` - renews-soon window (default: 7)
//! - `FORECAST_DAYS` - payment forecast horizon (default: 30)

use crate::reminders::{normalize_days_before, DEFAULT_DAYS_BEFORE};
use anyhow::{Context, Result};
use std::env;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: String,
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: String,
    pub reminder_days_before: u32,
    pub renews_soon_days: u32,
    pub forecast_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: "subscriptions.db".to_string(),
            listen_addr: "0.0.0.0:3000".to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            reminder_days_before: DEFAULT_DAYS_BEFORE,
            renews_soon_days: 7,
            forecast_days: 30,
        }
    }
}

impl Config {
    /// Load `.env` (if present), then read the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e).context("Failed to load .env file");
            }
        }

        let config = Self::from_lookup(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Build from an arbitrary key lookup; unparseable numbers fall back to
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let number = |key: &str, default: u32| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(default)
        };

        Config {
            db_path: lookup("SUBS_DB_PATH").unwrap_or(defaults.db_path),
            listen_addr: lookup("LISTEN").unwrap_or(defaults.listen_addr),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| v.trim().to_ascii_lowercase())
                .unwrap_or(defaults.log_format),
            reminder_days_before: normalize_days_before(number("REMINDER_DAYS_BEFORE", defaults.reminder_days_before)),
            renews_soon_days: number("RENEWS_SOON_DAYS", defaults.renews_soon_days),
            forecast_days: number("FORECAST_DAYS", defaults.forecast_days),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_format != "text" && self.log_format != "json" {
            anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", self.log_format);
        }

        if !self.listen_addr.contains(':') {
            anyhow::bail!("LISTEN must be in format 'host:port', got '{}'", self.listen_addr);
        }

        if self.db_path.trim().is_empty() {
            anyhow::bail!("SUBS_DB_PATH must not be empty");
        }

        if self.forecast_days == 0 || self.forecast_days > 366 {
            anyhow::bail!("FORECAST_DAYS must be between 1 and 366, got {}", self.forecast_days);
        }

        Ok(())
    }
}

/// Install the global tracing subscriber. Call once per binary.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("Invalid RUST_LOG filter '{}'", config.log_level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.log_format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
