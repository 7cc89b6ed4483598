use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::services::aggregator::FormatPrecedence;
use crate::services::upstream::UpstreamClient;
use crate::utils::parse_format_list;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// One year.
pub const MAX_UPCOMING_WINDOW_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub interval: Duration,
    /// Maximum number of matches shown.
    pub cap: usize,
    pub upcoming_window: Option<chrono::Duration>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub live: FeedSettings,
    pub hero: FeedSettings,
    pub commentary_interval: Duration,
    pub header_interval: Duration,
    pub format_precedence: FormatPrecedence,
    pub include_local_matches: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            live: FeedSettings {
                interval: Duration::from_secs(15),
                cap: 6,
                upcoming_window: Some(chrono::Duration::hours(6)),
            },
            hero: FeedSettings {
                interval: Duration::from_secs(30),
                cap: 4,
                upcoming_window: None,
            },
            commentary_interval: Duration::from_secs(15),
            header_interval: Duration::from_secs(30),
            format_precedence: FormatPrecedence::default(),
            include_local_matches: false,
        }
    }
}

impl Config {
    /// Read settings from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let api_base_url = get("SCORECAST_API_URL")
            .or_else(|| get("NEXT_PUBLIC_API_URL"))
            .unwrap_or(defaults.api_base_url);
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            bail!("API base URL must start with http:// or https://, got '{}'", api_base_url);
        }

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            let value: u64 = parse_or(get(key), key, default.as_secs())?;
            if value == 0 {
                bail!("{} must be at least 1 second", key);
            }
            Ok(Duration::from_secs(value))
        };
        let cap = |key: &str, default: usize| -> Result<usize> {
            let value: usize = parse_or(get(key), key, default)?;
            if value == 0 {
                bail!("{} must be at least 1", key);
            }
            Ok(value)
        };

        let window_hours: i64 = parse_or(get("SCORECAST_UPCOMING_WINDOW_HOURS"), "SCORECAST_UPCOMING_WINDOW_HOURS", 6)?;
        let upcoming_window = match window_hours {
            0 => None,
            h if h < 0 => bail!("SCORECAST_UPCOMING_WINDOW_HOURS must not be negative"),
            h if h > MAX_UPCOMING_WINDOW_HOURS => bail!(
                "SCORECAST_UPCOMING_WINDOW_HOURS must be at most {}, got {}",
                MAX_UPCOMING_WINDOW_HOURS,
                h
            ),
            h => Some(chrono::Duration::hours(h)),
        };

        let format_precedence = match get("SCORECAST_FORMAT_PRECEDENCE") {
            Some(raw) => FormatPrecedence::new(parse_format_list(&raw)),
            None => defaults.format_precedence,
        };

        Ok(Self {
            api_base_url,
            request_timeout: secs("SCORECAST_HTTP_TIMEOUT_SECS", defaults.request_timeout)?,
            live: FeedSettings {
                interval: secs("SCORECAST_LIVE_POLL_SECS", defaults.live.interval)?,
                cap: cap("SCORECAST_LIVE_CAP", defaults.live.cap)?,
                upcoming_window,
            },
            hero: FeedSettings {
                interval: secs("SCORECAST_HERO_POLL_SECS", defaults.hero.interval)?,
                cap: cap("SCORECAST_HERO_CAP", defaults.hero.cap)?,
                upcoming_window: None,
            },
            commentary_interval: secs("SCORECAST_COMMENTARY_POLL_SECS", defaults.commentary_interval)?,
            header_interval: secs("SCORECAST_HEADER_POLL_SECS", defaults.header_interval)?,
            format_precedence,
            include_local_matches: parse_or(
                get("SCORECAST_INCLUDE_LOCAL_MATCHES"),
                "SCORECAST_INCLUDE_LOCAL_MATCHES",
                defaults.include_local_matches,
            )?,
        })
    }

    pub fn client(&self) -> Result<UpstreamClient> {
        UpstreamClient::new(&self.api_base_url, self.request_timeout)
            .context("failed to build the upstream HTTP client")
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
