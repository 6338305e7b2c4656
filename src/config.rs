use std::time::Duration;

use crate::errors::AppError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SESSION_DATABASE_URL: &str = "sqlite://hr-console.db";

/// Runtime settings read from the environment (`.env` is loaded first by the binary).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub timeout: Duration,
    pub session_database_url: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let api_base_url = std::env::var("API_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::configuration("API_BASE_URL not set"))?;

        let timeout_secs = std::env::var("API_TIMEOUT_SECS")
            .map(|val| val.trim().parse::<u64>())
            .unwrap_or(Ok(DEFAULT_TIMEOUT_SECS))
            .map_err(|_| AppError::configuration("API_TIMEOUT_SECS must be a whole number of seconds"))?;
        if timeout_secs == 0 {
            return Err(AppError::configuration("API_TIMEOUT_SECS must be greater than zero"));
        }

        let session_database_url = std::env::var("SESSION_DATABASE_URL")
            .unwrap_or_else(|_| DEFAULT_SESSION_DATABASE_URL.to_string());

        Ok(Self {
            api_base_url,
            timeout: Duration::from_secs(timeout_secs),
            session_database_url,
        })
    }
}
