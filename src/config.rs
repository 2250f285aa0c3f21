use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    /// Base URL of the assessment backend (assignments, tests).
    pub backend_url: Url,
    /// Base URL of the submission service (drafts, answers).
    pub submission_service_url: Url,
    pub candidate_id: Option<String>,
    pub timer_tick: Duration,
    pub autosave_interval: Duration,
    pub http_timeout: Duration,
    pub log_format: Option<String>,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            backend_url: parse_base_url("BACKEND_URL", &get_env("BACKEND_URL")?)?,
            submission_service_url: parse_base_url(
                "SUBMISSION_SERVICE_URL",
                &get_env("SUBMISSION_SERVICE_URL")?,
            )?,
            candidate_id: env::var("CANDIDATE_ID")
                .ok()
                .filter(|id| !id.trim().is_empty()),
            timer_tick: get_env_millis("TIMER_TICK_MS", 1000)?,
            autosave_interval: get_env_millis("AUTOSAVE_INTERVAL_MS", 5000)?,
            http_timeout: Duration::from_secs(get_env_parse_or("HTTP_TIMEOUT_SECS", 10)?),
            log_format: env::var("LOG_FORMAT").ok(),
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// A driver period in milliseconds. Zero is rejected.
fn get_env_millis(name: &str, default: u64) -> Result<Duration> {
    match get_env_parse_or(name, default)? {
        0 => Err(Error::Config(format!(
            "Invalid value for {}: must be greater than zero",
            name
        ))),
        ms => Ok(Duration::from_millis(ms)),
    }
}

/// Parses a base URL and makes sure it ends with `/` so that `Url::join`
/// appends paths instead of replacing the last segment.
pub fn parse_base_url(name: &str, raw: &str) -> Result<Url> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized)
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::Config(format!(
            "Invalid value for {}: only http and https are supported",
            name
        )));
    }
    Ok(url)
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let url = parse_base_url("BACKEND_URL", "http://localhost:8000/api").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/");
        assert_eq!(
            url.join("assignments/a1").unwrap().as_str(),
            "http://localhost:8000/api/assignments/a1"
        );
    }

    #[test]
    fn zero_driver_period_is_rejected() {
        env::set_var("CONFIG_TEST_ZERO_TICK_MS", "0");
        let err = get_env_millis("CONFIG_TEST_ZERO_TICK_MS", 1000).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("CONFIG_TEST_ZERO_TICK_MS")));

        env::set_var("CONFIG_TEST_AUTOSAVE_MS", "250");
        assert_eq!(
            get_env_millis("CONFIG_TEST_AUTOSAVE_MS", 5000).unwrap(),
            Duration::from_millis(250)
        );
        assert_eq!(
            get_env_millis("CONFIG_TEST_UNSET_MS", 5000).unwrap(),
            Duration::from_millis(5000)
        );
    }

    #[test]
    fn base_url_rejects_other_schemes() {
        let err = parse_base_url("BACKEND_URL", "ftp://example.com").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
