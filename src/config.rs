use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Passing threshold applied to quizzes that don't carry their own.
pub const DEFAULT_PASSING_SCORE: u8 = 70;

/// Average quiz score a learner needs for a certificate.
pub const CERTIFICATION_THRESHOLD: u8 = 70;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_url = env::var("COURSEPATH_API_URL")
            .map_err(|_| ConfigError::Missing("COURSEPATH_API_URL"))?;
        let api_url = api_url.trim_end_matches('/').to_string();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "COURSEPATH_API_URL",
                value: api_url,
            });
        }

        let api_token = env::var("COURSEPATH_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let timeout = match env::var("COURSEPATH_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: "COURSEPATH_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let rust_log =
            env::var("RUST_LOG").unwrap_or_else(|_| "coursepath_runtime=info".to_string());

        Ok(Self {
            api_url,
            api_token,
            timeout,
            rust_log,
        })
    }

    /// Config pointing at `api_url` with defaults everywhere else.
    pub fn for_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            rust_log: "coursepath_runtime=info".to_string(),
        }
    }
}
