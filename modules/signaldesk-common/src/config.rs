use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::error::ConfigError;

/// Timing and sizing of the staged reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealConfig {
    /// Signals shown before the first scan.
    pub preview_size: usize,
    /// Delay before the "new signals available" prompt is armed.
    pub prompt_delay: Duration,
    /// Cadence of the scan script in the log trace.
    pub pacing_interval: Duration,
    /// Lifetime of the transient "nothing new" notice.
    pub notice_ttl: Duration,
    /// How long revealed signals stay marked as new.
    pub fresh_ttl: Duration,
    /// Log trace length.
    pub trace_capacity: usize,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            preview_size: 5,
            prompt_delay: Duration::from_secs(15),
            pacing_interval: Duration::from_millis(300),
            notice_ttl: Duration::from_secs(3),
            fresh_ttl: Duration::from_secs(120),
            trace_capacity: 8,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL, without trailing slash.
    pub api_url: String,
    /// File backing the session store.
    pub session_path: PathBuf,
    pub reveal: RevealConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            session_path: data_dir().join("session.json"),
            reveal: RevealConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    /// Unset variables fall back to the defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = RevealConfig::default();
        let api_url = env::var("SIGNALDESK_API_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();
        if api_url.is_empty() {
            return Err(ConfigError::Empty {
                key: "SIGNALDESK_API_URL",
            }
            .into());
        }

        let config = Self {
            api_url,
            session_path: env::var("SIGNALDESK_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir().join("session.json")),
            reveal: RevealConfig {
                preview_size: env_number("SIGNALDESK_PREVIEW_SIZE", defaults.preview_size as u64)?
                    as usize,
                prompt_delay: Duration::from_secs(env_number(
                    "SIGNALDESK_PROMPT_DELAY_SECS",
                    defaults.prompt_delay.as_secs(),
                )?),
                pacing_interval: Duration::from_millis(env_number(
                    "SIGNALDESK_PACING_MS",
                    defaults.pacing_interval.as_millis() as u64,
                )?),
                notice_ttl: Duration::from_secs(env_number(
                    "SIGNALDESK_NOTICE_SECS",
                    defaults.notice_ttl.as_secs(),
                )?),
                fresh_ttl: Duration::from_secs(env_number(
                    "SIGNALDESK_FRESH_TTL_SECS",
                    defaults.fresh_ttl.as_secs(),
                )?),
                trace_capacity: env_number(
                    "SIGNALDESK_TRACE_CAPACITY",
                    defaults.trace_capacity as u64,
                )? as usize,
            },
        };

        config.log_values();
        Ok(config)
    }

    fn log_values(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  SIGNALDESK_API_URL: {}", self.api_url);
        tracing::info!("  SIGNALDESK_SESSION_FILE: {}", self.session_path.display());
        tracing::info!(
            preview_size = self.reveal.preview_size,
            prompt_delay_secs = self.reveal.prompt_delay.as_secs(),
            pacing_ms = self.reveal.pacing_interval.as_millis() as u64,
            fresh_ttl_secs = self.reveal.fresh_ttl.as_secs(),
            "  Reveal timing"
        );
    }
}

/// Root data directory, controlled by `DATA_DIR` env var (default: `"data"`).
pub fn data_dir() -> PathBuf {
    PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

fn env_number(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(value) => parse_positive(key, &value),
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_timings() {
        let reveal = RevealConfig::default();
        assert_eq!(reveal.preview_size, 5);
        assert_eq!(reveal.pacing_interval, Duration::from_millis(300));
        assert_eq!(reveal.notice_ttl, Duration::from_secs(3));
        assert_eq!(reveal.fresh_ttl, Duration::from_secs(120));
        assert_eq!(reveal.trace_capacity, 8);
    }

    #[test]
    fn parse_positive_rejects_zero_and_garbage() {
        assert_eq!(parse_positive("K", " 60 ").unwrap(), 60);
        assert!(matches!(
            parse_positive("K", "0"),
            Err(ConfigError::InvalidNumber { key: "K", .. })
        ));
        assert!(parse_positive("K", "sixty").is_err());
        assert!(parse_positive("K", "-3").is_err());
    }
}
