//! Runtime configuration loaded from `READINESS_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use readiness_core::TenantId;
use readiness_inspection::ExecutionMode;
use readiness_observability::LogFormat;

use crate::jobs::{JobExecutorConfig, RetryPolicy};

pub const ENV_EXECUTION_MODE: &str = "READINESS_EXECUTION_MODE";
pub const ENV_JOB_MAX_ATTEMPTS: &str = "READINESS_JOB_MAX_ATTEMPTS";
pub const ENV_JOB_BASE_DELAY_MS: &str = "READINESS_JOB_BASE_DELAY_MS";
pub const ENV_JOB_MAX_DELAY_MS: &str = "READINESS_JOB_MAX_DELAY_MS";
pub const ENV_JOB_POLL_MS: &str = "READINESS_JOB_POLL_MS";
pub const ENV_LOG_LEVEL: &str = "READINESS_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "READINESS_LOG_FORMAT";
pub const ENV_TENANT: &str = "READINESS_TENANT";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: `{value}` ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Mode the bus workers pass to the service.
    pub execution_mode: ExecutionMode,
    pub job_max_attempts: u32,
    pub job_base_delay_ms: u64,
    pub job_max_delay_ms: u64,
    pub job_poll_ms: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Pins workers and the executor to one tenant.
    pub tenant: Option<TenantId>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Inline,
            job_max_attempts: 5,
            job_base_delay_ms: 500,
            job_max_delay_ms: 60_000,
            job_poll_ms: 100,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            tenant: None,
        }
    }
}

impl ReadinessConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get(ENV_EXECUTION_MODE) {
            config.execution_mode = parse(ENV_EXECUTION_MODE, &v)?;
        }
        if let Some(v) = get(ENV_JOB_MAX_ATTEMPTS) {
            config.job_max_attempts = parse(ENV_JOB_MAX_ATTEMPTS, &v)?;
            if config.job_max_attempts == 0 {
                return Err(invalid(ENV_JOB_MAX_ATTEMPTS, &v, "must be at least 1"));
            }
        }
        if let Some(v) = get(ENV_JOB_BASE_DELAY_MS) {
            config.job_base_delay_ms = parse(ENV_JOB_BASE_DELAY_MS, &v)?;
        }
        if let Some(v) = get(ENV_JOB_MAX_DELAY_MS) {
            config.job_max_delay_ms = parse(ENV_JOB_MAX_DELAY_MS, &v)?;
        }
        if let Some(v) = get(ENV_JOB_POLL_MS) {
            config.job_poll_ms = parse(ENV_JOB_POLL_MS, &v)?;
        }
        if let Some(v) = get(ENV_LOG_LEVEL) {
            config.log_level = v.trim().to_string();
        }
        if let Some(v) = get(ENV_LOG_FORMAT) {
            config.log_format = parse(ENV_LOG_FORMAT, &v)?;
        }
        if let Some(v) = get(ENV_TENANT) {
            config.tenant = Some(parse(ENV_TENANT, &v)?);
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.job_max_attempts,
            Duration::from_millis(self.job_base_delay_ms),
            Duration::from_millis(self.job_max_delay_ms),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_ms)
    }

    pub fn executor_config(&self) -> JobExecutorConfig {
        JobExecutorConfig::default()
            .with_poll_interval(self.poll_interval())
            .with_tenant(self.tenant)
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(var, value, &e.to_string()))
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
