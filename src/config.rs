use std::net::SocketAddr;

use serde::Deserialize;
use thiserror::Error;
use time::Duration;

use crate::assignment_service::AssignmentPolicy;

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_NOTIFICATION_MAX_ATTEMPTS: u32 = 5;
const MAX_REVIEW_WINDOW_HOURS: i64 = 24 * 365 * 100;

/// Read from the environment, e.g. `MAX_ACTIVE_ASSIGNMENTS=2` fills `max_active_assignments`.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_address: Option<String>,
    pub max_active_assignments: Option<u32>,
    pub review_window_hours: Option<i64>,
    pub max_claim_attempts: Option<u32>,
    pub notification_webhook_url: Option<String>,
    pub notification_max_attempts: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must not be empty")]
    Empty { name: &'static str },
    #[error("{name} must be at least 1, got {value}")]
    NotPositive { name: &'static str, value: i64 },
    #[error("{name} must be at most {max}, got {value}")]
    TooLarge {
        name: &'static str,
        value: i64,
        max: i64,
    },
    #[error("Invalid LISTEN_ADDRESS `{value}`: {source}")]
    ListenAddress {
        value: String,
        source: std::net::AddrParseError,
    },
}

fn positive(name: &'static str, value: Option<i64>, default: i64) -> Result<i64, ConfigError> {
    match value {
        Some(value) if value < 1 => Err(ConfigError::NotPositive { name, value }),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig, envy::Error> {
        envy::from_env::<AppConfig>()
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        match self.database_url.trim() {
            "" => Err(ConfigError::Empty {
                name: "DATABASE_URL",
            }),
            url => Ok(url),
        }
    }

    pub fn listen_address(&self) -> Result<SocketAddr, ConfigError> {
        let value = self
            .listen_address
            .as_deref()
            .unwrap_or(DEFAULT_LISTEN_ADDRESS);

        value
            .trim()
            .parse()
            .map_err(|source| ConfigError::ListenAddress {
                value: value.to_owned(),
                source,
            })
    }

    pub fn assignment_policy(&self) -> Result<AssignmentPolicy, ConfigError> {
        let defaults = AssignmentPolicy::default();

        let max_active_assignments = positive(
            "MAX_ACTIVE_ASSIGNMENTS",
            self.max_active_assignments.map(i64::from),
            defaults.max_active_assignments.into(),
        )?;
        let review_window_hours = positive(
            "REVIEW_WINDOW_HOURS",
            self.review_window_hours,
            defaults.review_window.whole_hours(),
        )?;
        if review_window_hours > MAX_REVIEW_WINDOW_HOURS {
            return Err(ConfigError::TooLarge {
                name: "REVIEW_WINDOW_HOURS",
                value: review_window_hours,
                max: MAX_REVIEW_WINDOW_HOURS,
            });
        }
        let max_claim_attempts = positive(
            "MAX_CLAIM_ATTEMPTS",
            self.max_claim_attempts.map(i64::from),
            defaults.max_claim_attempts.into(),
        )?;

        Ok(AssignmentPolicy {
            max_active_assignments: max_active_assignments as _,
            review_window: Duration::hours(review_window_hours),
            max_claim_attempts: max_claim_attempts as _,
        })
    }

    /// `None` when no webhook is configured and notifications should only be logged.
    pub fn notification_webhook_url(&self) -> Option<&str> {
        self.notification_webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn notification_max_attempts(&self) -> Result<u32, ConfigError> {
        let attempts = positive(
            "NOTIFICATION_MAX_ATTEMPTS",
            self.notification_max_attempts.map(i64::from),
            DEFAULT_NOTIFICATION_MAX_ATTEMPTS.into(),
        )?;
        Ok(attempts as _)
    }
}
