//! # Runtime Settings
//!
//! Process-wide settings read from the environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::errors::{Error, Result};
use crate::observability::LogFormat;
use crate::rate_limit::RateLimiter;

pub const RATE_LIMIT_PER_SECOND_ENV: &str = "KEYWARD_RATE_LIMIT_PER_SECOND";
pub const RATE_LIMIT_BURST_ENV: &str = "KEYWARD_RATE_LIMIT_BURST";
pub const WARNING_WINDOW_ENV: &str = "KEYWARD_WARNING_WINDOW";
pub const LOG_FORMAT_ENV: &str = "KEYWARD_LOG_FORMAT";

const DEFAULT_WARNING_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Settings shared by every command
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RuntimeConfig {
    /// Requests per second allowed against each backend
    #[validate(range(
        min = 1,
        max = 100,
        message = "Rate limit must be between 1 and 100 requests per second"
    ))]
    pub rate_limit_per_second: u32,

    /// Requests a backend may receive back to back
    #[validate(range(min = 1, max = 100, message = "Burst must be between 1 and 100"))]
    pub rate_limit_burst: u32,

    /// Warning window for plans that do not set their own
    #[serde(with = "humantime_serde")]
    pub warning_window: Duration,

    /// Log format; `None` leaves the choice to the command line
    pub log_format: Option<LogFormat>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_second: 1,
            rate_limit_burst: 1,
            warning_window: DEFAULT_WARNING_WINDOW,
            log_format: None,
        }
    }
}

impl RuntimeConfig {
    /// Read settings from the environment and validate them.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            rate_limit_per_second: parse_env(RATE_LIMIT_PER_SECOND_ENV, |s| s.parse::<u32>())?
                .unwrap_or(defaults.rate_limit_per_second),
            rate_limit_burst: parse_env(RATE_LIMIT_BURST_ENV, |s| s.parse::<u32>())?
                .unwrap_or(defaults.rate_limit_burst),
            warning_window: parse_env(WARNING_WINDOW_ENV, humantime::parse_duration)?
                .unwrap_or(defaults.warning_window),
            log_format: parse_env(LOG_FORMAT_ENV, |s| s.parse::<LogFormat>())?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate field ranges
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if self.warning_window.is_zero() {
            return Err(Error::config(format!("{} must be greater than zero", WARNING_WINDOW_ENV)));
        }

        Ok(())
    }

    /// Limiter shared by every backend call of one run
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::per_second(self.rate_limit_per_second, self.rate_limit_burst)
    }
}

fn parse_env<T, E, F>(name: &str, parse: F) -> Result<Option<T>>
where
    F: FnOnce(&str) -> std::result::Result<T, E>,
    E: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => parse(raw.trim())
            .map(Some)
            .map_err(|e| Error::config(format!("Invalid {}='{}': {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}
