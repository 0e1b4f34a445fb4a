//! Runtime configuration read from the environment (a `.env` file is honored).

use chrono::NaiveDate;
use std::env;
use std::time::Duration;
use thiserror::Error;

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_TUSHARE_TOKEN: &str = "TUSHARE_TOKEN";
const ENV_TUSHARE_BASE_URL: &str = "TUSHARE_BASE_URL";
const ENV_RATE_LIMIT: &str = "PROVIDER_RATE_LIMIT";
const ENV_RATE_WINDOW_SECS: &str = "PROVIDER_RATE_WINDOW_SECS";
const ENV_HISTORY_START_DATE: &str = "HISTORY_START_DATE";
const ENV_BATCH_SIZE: &str = "UPDATE_BATCH_SIZE";
const ENV_BATCH_PAUSE_MS: &str = "UPDATE_BATCH_PAUSE_MS";
const ENV_CONCURRENCY: &str = "UPDATE_CONCURRENCY";
const ENV_FUNDAMENTALS_COMMIT_EVERY: &str = "FUNDAMENTALS_COMMIT_EVERY";
const ENV_ENABLE_JOBS: &str = "ENABLE_SCHEDULED_JOBS";
const ENV_BIND_ADDR: &str = "BIND_ADDR";

pub const DEFAULT_TUSHARE_BASE_URL: &str = "http://api.tushare.pro";
const DEFAULT_RATE_LIMIT: u32 = 200;
const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
const DEFAULT_HISTORY_START: &str = "20240920";
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_BATCH_PAUSE_MS: u64 = 1000;
const DEFAULT_CONCURRENCY: usize = 1;
const DEFAULT_FUNDAMENTALS_COMMIT_EVERY: usize = 100;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub tushare_token: String,
    pub tushare_base_url: String,
    pub rate_limit: u32,
    pub rate_window: Duration,
    /// Epoch for first fetches and the analytics window-start cutoff
    pub history_start: NaiveDate,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub concurrency: usize,
    pub fundamentals_commit_every: usize,
    pub enable_jobs: bool,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            tushare_token: String::new(),
            tushare_base_url: DEFAULT_TUSHARE_BASE_URL.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
            history_start: parse_yyyymmdd(DEFAULT_HISTORY_START)
                .unwrap_or(NaiveDate::MIN),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: Duration::from_millis(DEFAULT_BATCH_PAUSE_MS),
            concurrency: DEFAULT_CONCURRENCY,
            fundamentals_commit_every: DEFAULT_FUNDAMENTALS_COMMIT_EVERY,
            enable_jobs: false,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url =
            env::var(ENV_DATABASE_URL).map_err(|_| ConfigError::Missing(ENV_DATABASE_URL))?;
        let tushare_token =
            env::var(ENV_TUSHARE_TOKEN).map_err(|_| ConfigError::Missing(ENV_TUSHARE_TOKEN))?;

        let history_start = match env::var(ENV_HISTORY_START_DATE) {
            Ok(raw) => parse_yyyymmdd(&raw).ok_or(ConfigError::Invalid {
                var: ENV_HISTORY_START_DATE,
                value: raw,
            })?,
            Err(_) => defaults.history_start,
        };

        Ok(Self {
            database_url,
            tushare_token,
            tushare_base_url: env::var(ENV_TUSHARE_BASE_URL)
                .unwrap_or(defaults.tushare_base_url),
            rate_limit: parse_var(ENV_RATE_LIMIT).unwrap_or(defaults.rate_limit),
            rate_window: parse_var(ENV_RATE_WINDOW_SECS)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_window),
            history_start,
            batch_size: parse_var(ENV_BATCH_SIZE)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            batch_pause: parse_var(ENV_BATCH_PAUSE_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_pause),
            concurrency: parse_var(ENV_CONCURRENCY)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            fundamentals_commit_every: parse_var(ENV_FUNDAMENTALS_COMMIT_EVERY)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.fundamentals_commit_every),
            enable_jobs: env::var(ENV_ENABLE_JOBS)
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
            bind_addr: env::var(ENV_BIND_ADDR).unwrap_or(defaults.bind_addr),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse the provider's compact `YYYYMMDD` date form
pub fn parse_yyyymmdd(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok()
}

pub fn format_yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
