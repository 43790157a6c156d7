use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::FixedOffset;
use photofeed_client::{
    DEFAULT_LOOKAHEAD, DEFAULT_PAGE_SIZE, DEFAULT_TIME_FORMAT, FeedConfig, ParseConfig,
};

const DEFAULT_PARSE_SERVER_URL: &str = "https://parseapi.back4app.com";
const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Clone)]
pub struct Settings {
    pub parse_server_url: String,
    pub parse_application_id: String,
    pub parse_client_key: Option<String>,
    pub parse_session_token: Option<String>,
    pub geocoder_url: String,
    pub feed_page_size: u32,
    pub feed_lookahead: usize,
    pub feed_row_pool: usize,
    pub http_timeout_secs: u64,
    pub time_format: String,
    pub utc_offset_minutes: i32,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let parse_application_id = get_required("PARSE_APPLICATION_ID")
            .context("PARSE_APPLICATION_ID is required")?;
        let parse_server_url = normalize_url(
            env("PARSE_SERVER_URL").unwrap_or_else(|| DEFAULT_PARSE_SERVER_URL.to_string()),
        );
        let parse_client_key = env("PARSE_CLIENT_KEY");
        let parse_session_token = env("PARSE_SESSION_TOKEN");
        let geocoder_url = normalize_url(
            env("GEOCODER_URL").unwrap_or_else(|| DEFAULT_GEOCODER_URL.to_string()),
        );

        let feed_page_size =
            parse_positive("FEED_PAGE_SIZE", env("FEED_PAGE_SIZE"), DEFAULT_PAGE_SIZE)?;
        let feed_lookahead =
            parse_positive("FEED_LOOKAHEAD", env("FEED_LOOKAHEAD"), DEFAULT_LOOKAHEAD)?;
        let feed_row_pool = parse_positive("FEED_ROW_POOL", env("FEED_ROW_POOL"), 4usize)?;
        let http_timeout_secs =
            parse_positive("HTTP_TIMEOUT_SECS", env("HTTP_TIMEOUT_SECS"), 15u64)?;

        let time_format = env("TIME_FORMAT").unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string());
        let utc_offset_minutes = parse_utc_offset(env("UTC_OFFSET_MINUTES"))?;
        let log_level = env("LOG_LEVEL")
            .or_else(|| env("RUST_LOG"))
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            parse_server_url,
            parse_application_id,
            parse_client_key,
            parse_session_token,
            geocoder_url,
            feed_page_size,
            feed_lookahead,
            feed_row_pool,
            http_timeout_secs,
            time_format,
            utc_offset_minutes,
            log_level,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn parse_config(&self) -> ParseConfig {
        ParseConfig {
            server_url: self.parse_server_url.clone(),
            application_id: self.parse_application_id.clone(),
            client_key: self.parse_client_key.clone(),
            session_token: self.parse_session_token.clone(),
            timeout: self.http_timeout(),
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            page_size: self.feed_page_size,
            lookahead: self.feed_lookahead,
        }
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES is out of range"))
    }
}

/// Значение переменной окружения без пробелов; пустое считается отсутствующим.
fn env(key: &str) -> Option<String> {
    non_blank(std::env::var(key).ok())
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn get_required(key: &str) -> Result<String> {
    env(key).ok_or_else(|| anyhow!("{key} must be set and not empty"))
}

fn normalize_url(raw: String) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw;
    }
    format!("https://{raw}")
}

fn parse_positive<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = match raw {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?,
        None => default,
    };

    if value <= T::default() {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}

// 14 часов в обе стороны покрывают все реальные часовые пояса.
fn parse_utc_offset(raw: Option<String>) -> Result<i32> {
    let minutes = match raw {
        Some(raw) => raw
            .parse::<i32>()
            .context("Failed to parse UTC_OFFSET_MINUTES, expecting integer")?,
        None => 0,
    };

    if minutes.abs() > 14 * 60 {
        return Err(anyhow!("UTC_OFFSET_MINUTES must be within ±840"));
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_blank_trims_and_rejects_empty() {
        assert_eq!(non_blank(Some("  key  ".to_string())).as_deref(), Some("key"));
        assert!(non_blank(Some("   ".to_string())).is_none());
        assert!(non_blank(None).is_none());
    }

    #[test]
    fn normalize_url_adds_https_scheme() {
        assert_eq!(
            normalize_url("parseapi.back4app.com".to_string()),
            "https://parseapi.back4app.com"
        );
        assert_eq!(
            normalize_url("http://127.0.0.1:1337/parse".to_string()),
            "http://127.0.0.1:1337/parse"
        );
    }

    #[test]
    fn parse_positive_uses_default_and_rejects_zero() {
        assert_eq!(parse_positive("FEED_PAGE_SIZE", None, 10u32).expect("default"), 10);
        assert_eq!(
            parse_positive("FEED_PAGE_SIZE", Some("25".to_string()), 10u32).expect("parsed"),
            25
        );
        assert!(parse_positive("FEED_PAGE_SIZE", Some("0".to_string()), 10u32).is_err());
        assert!(parse_positive("FEED_PAGE_SIZE", Some("ten".to_string()), 10u32).is_err());
    }

    #[test]
    fn parse_utc_offset_bounds() {
        assert_eq!(parse_utc_offset(None).expect("default"), 0);
        assert_eq!(parse_utc_offset(Some("-360".to_string())).expect("parsed"), -360);
        assert!(parse_utc_offset(Some("2000".to_string())).is_err());
    }
}
