//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config. Feed connection settings
//! live with the feed clients (`pharmydash_feed::FeedConfig`).

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Log filter used when `RUST_LOG` is not set
pub const DEFAULT_RUST_LOG: &str = "pharmydash=debug";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Runtime configuration
    pub rust_log: String,
    pub port: u16,

    /// How often the adapter re-queries the store when push is unavailable
    pub poll_interval_secs: u64,
    /// How often the view is recomputed without any feed activity
    pub refresh_interval_secs: u64,

    /// Classification and staleness thresholds
    pub unresponded_after_secs: i64,
    pub reset_after_hours: i64,
    /// `None` keeps the classifier's built-in sign-off keywords
    pub closing_keywords: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let closing_keywords = lookup("CLOSING_KEYWORDS").map(|raw| {
            raw.split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        });

        let config = Self {
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_RUST_LOG.to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            poll_interval_secs: parse_or(&lookup, "POLL_INTERVAL_SECS", 30)?,
            refresh_interval_secs: parse_or(&lookup, "REFRESH_INTERVAL_SECS", 30)?,
            unresponded_after_secs: parse_or(&lookup, "UNRESPONDED_AFTER_SECS", 300)?,
            reset_after_hours: parse_or(&lookup, "RESET_AFTER_HOURS", 36)?,
            closing_keywords,
        };

        if config.poll_interval_secs == 0 || config.refresh_interval_secs == 0 {
            return Err(Error::Configuration(
                "POLL_INTERVAL_SECS and REFRESH_INTERVAL_SECS must be greater than zero"
                    .to_string(),
            ));
        }
        if config.unresponded_after_secs < 0 || config.reset_after_hours < 0 {
            return Err(Error::Configuration(
                "UNRESPONDED_AFTER_SECS and RESET_AFTER_HOURS cannot be negative".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Configuration(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
