//! Daemon configuration from environment variables.
//!
//! Fail-fast: required variables must be present and valid or the daemon
//! exits with a clear message before touching the network.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Tracker API root.
    pub tracker_base_url: String,
    /// Tracker organization id.
    pub tracker_org_id: String,
    /// Incident queue key.
    pub tracker_queue: String,
    /// Initial bearer token.
    pub tracker_token: String,
    /// OAuth token endpoint for refresh-on-401.
    pub tracker_refresh_url: Option<String>,
    pub tracker_refresh_token: Option<String>,
    /// How far back each sweep looks, in days.
    pub lookback_days: i64,
    /// Minimum duration of one reconciliation cycle.
    pub min_cycle: Duration,
    /// Log filter directive, e.g. `info,towerops=debug`.
    pub log_filter: String,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn positive_i64(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    let Some(raw) = optional(name) else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid { name, value: raw }),
    }
}

impl Config {
    /// Load from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            tracker_base_url: required("TRACKER_BASE_URL")?,
            tracker_org_id: required("TRACKER_ORG_ID")?,
            tracker_queue: required("TRACKER_QUEUE")?,
            tracker_token: required("TRACKER_TOKEN")?,
            tracker_refresh_url: optional("TRACKER_REFRESH_URL"),
            tracker_refresh_token: optional("TRACKER_REFRESH_TOKEN"),
            lookback_days: positive_i64("TOWEROPS_LOOKBACK_DAYS", 30)?,
            min_cycle: Duration::from_secs(
                positive_i64("TOWEROPS_MIN_CYCLE_SECS", 10)? as u64
            ),
            log_filter: optional("TOWEROPS_LOG").unwrap_or_else(|| "info".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_i64_rejects_zero_and_garbage() {
        std::env::set_var("TOWEROPS_TEST_ZERO", "0");
        assert!(positive_i64("TOWEROPS_TEST_ZERO", 10).is_err());
        std::env::set_var("TOWEROPS_TEST_ZERO", "abc");
        assert!(positive_i64("TOWEROPS_TEST_ZERO", 10).is_err());
        std::env::remove_var("TOWEROPS_TEST_ZERO");
        assert_eq!(positive_i64("TOWEROPS_TEST_ZERO", 10).unwrap(), 10);
    }
}
