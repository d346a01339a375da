use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use log::info;

use crate::error::ConfigError;
use crate::models::ElectionId;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_REFRESH_SECONDS: u64 = 15;
const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    pub election_id: ElectionId,
    pub refresh_interval: Duration,
    pub observer_feed: bool,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = var("API_URL").unwrap_or_else(|| {
            info!("API_URL not set, using default: {}", DEFAULT_API_URL);
            DEFAULT_API_URL.to_string()
        });
        let election_id = var("ELECTION_ID").ok_or(ConfigError::Missing("ELECTION_ID"))?;
        let election_id = parse("ELECTION_ID", election_id)?;
        let refresh_secs = try_load(
            "REFRESH_INTERVAL_SECONDS",
            var("REFRESH_INTERVAL_SECONDS"),
            DEFAULT_REFRESH_SECONDS,
        )?;
        let timeout_secs = try_load(
            "REQUEST_TIMEOUT_SECONDS",
            var("REQUEST_TIMEOUT_SECONDS"),
            DEFAULT_TIMEOUT_SECONDS,
        )?;
        let observer_feed = match var("OBSERVER_FEED") {
            Some(value) => parse_flag("OBSERVER_FEED", &value)?,
            None => false,
        };

        if refresh_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REFRESH_INTERVAL_SECONDS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            api_url,
            api_token: var("API_TOKEN"),
            election_id,
            refresh_interval: Duration::from_secs(refresh_secs),
            observer_feed,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{:?}: {}", value, e),
    })
}

fn try_load<T: FromStr>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: Display,
    T: Display,
{
    match value {
        Some(value) => parse(key, value),
        None => {
            info!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("{:?} is not a boolean", value),
        }),
    }
}
