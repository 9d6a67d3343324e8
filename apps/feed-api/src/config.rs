use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::feed::FeedSettings;
use crate::feed::coordinator::RefreshSettings;
use crate::feed::ranker::RankingWeights;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub port: u16,
    pub rust_log: String,
    pub feed: FeedSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = RefreshSettings::default();
        let refresh = RefreshSettings {
            cooldown: Duration::from_millis(optional_env(
                "FEED_COOLDOWN_MS",
                defaults.cooldown.as_millis() as u64,
            )?),
            safety_timeout: Duration::from_millis(optional_env(
                "FEED_SAFETY_TIMEOUT_MS",
                defaults.safety_timeout.as_millis() as u64,
            )?),
            manual_rotation_step: optional_env(
                "FEED_MANUAL_ROTATION_STEP",
                defaults.manual_rotation_step,
            )?,
            reset_rotation_on_foreground: optional_env(
                "FEED_RESET_ROTATION_ON_FOREGROUND",
                defaults.reset_rotation_on_foreground,
            )?,
        };

        Ok(Config {
            supabase_url: require_env("SUPABASE_URL")?,
            supabase_anon_key: require_env("SUPABASE_ANON_KEY")?,
            port: optional_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            feed: FeedSettings {
                page_size: optional_env("FEED_PAGE_SIZE", 10)?,
                refresh,
                ranking: RankingWeights::default(),
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has invalid value '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_accepts_trimmed_numbers() {
        let port: u16 = parse_value("PORT", " 9090 ").unwrap();
        assert_eq!(port, 9090);
    }

    #[test]
    fn test_parse_value_bool() {
        let flag: bool = parse_value("FEED_RESET_ROTATION_ON_FOREGROUND", "true").unwrap();
        assert!(flag);
    }

    #[test]
    fn test_parse_value_error_names_key() {
        let err = parse_value::<u64>("FEED_COOLDOWN_MS", "soon").unwrap_err();
        assert!(err.to_string().contains("FEED_COOLDOWN_MS"));
    }

    #[test]
    fn test_optional_env_falls_back_to_default() {
        let step: i64 = optional_env("FEED_TEST_UNSET_VARIABLE_FOR_DEFAULT", 5).unwrap();
        assert_eq!(step, 5);
    }
}
