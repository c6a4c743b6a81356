use std::time::Duration;

use crate::error::ConfigError;
use crate::gill::client::DEFAULT_BASE_URL;
use crate::retry::RetryPolicy;
use crate::util::env as env_util;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Runtime settings for the fetch jobs, resolved from the environment once
/// at startup. A missing API key or a nonsensical cap is fatal here, before
/// any work is scheduled.
#[derive(Debug, Clone)]
pub struct GillConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub country_filter: Option<String>,
}

impl GillConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        env_util::init_env();
        let api_key =
            env_util::env_opt("GILL_API_KEY").ok_or(ConfigError::Missing("GILL_API_KEY"))?;
        let base_url =
            env_util::env_opt("GILL_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout =
            Duration::from_secs(env_util::env_parse("GILL_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS));
        let concurrency: usize = env_util::env_parse("GILL_MAX_CONCURRENCY", DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "GILL_MAX_CONCURRENCY",
                value: "0".into(),
            });
        }
        let retry = RetryPolicy {
            max_attempts: env_util::env_parse("GILL_MAX_RETRIES", 3u32).max(1),
            base_delay: Duration::from_millis(env_util::env_parse("GILL_RETRY_BASE_MS", 200u64)),
            ..RetryPolicy::default()
        };
        Ok(Self {
            base_url,
            api_key,
            timeout,
            concurrency,
            retry,
            country_filter: env_util::env_opt("GILL_COUNTRY_FILTER"),
        })
    }
}

/// Database settings; the DSN comes from DATABASE_URL or the
/// DB_HOST/DB_USER/DB_PASSWORD/DB_NAME quartet.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env_util::db_url()
            .map_err(|_| ConfigError::Missing("DATABASE_URL or DB_HOST/DB_USER/DB_PASSWORD/DB_NAME"))?;
        Ok(Self {
            url,
            max_connections: env_util::env_parse("DB_MAX_CONNS", 5u32),
        })
    }
}
