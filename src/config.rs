use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::study::completion::RetryPolicy;

pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(750);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_url: Url,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("GROQ_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("GROQ_API_KEY"))?;

        let api_url = match lookup("NOTEGENIE_API_URL") {
            Some(value) => Url::parse(&value).map_err(|err| ConfigError::Invalid {
                name: "NOTEGENIE_API_URL",
                reason: err.to_string(),
                value,
            })?,
            None => Url::parse(DEFAULT_API_URL).map_err(|err| ConfigError::Invalid {
                name: "NOTEGENIE_API_URL",
                value: DEFAULT_API_URL.to_string(),
                reason: err.to_string(),
            })?,
        };

        let timeout_secs = parse_number(&lookup, "NOTEGENIE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let max_attempts = parse_number(&lookup, "NOTEGENIE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "NOTEGENIE_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is needed".to_string(),
            });
        }

        Ok(Self {
            api_key: api_key.trim().to_string(),
            api_url,
            timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy::new(max_attempts, RETRY_BASE_DELAY),
        })
    }
}

fn parse_number<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            reason: err.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
