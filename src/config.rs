//! Runtime configuration.
//!
//! Defaults are safe for unattended runs; the environment overrides them
//! and the CLI overrides the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;

/// Base URL bare channel handles are resolved against.
pub const PLATFORM_BASE_URL: &str = "https://www.youtube.com";

const DEFAULT_CAPTCHA_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_PROFILE_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Solving-service API key. Without one, gated emails stay gated but
    /// everything else still scrapes.
    pub captcha_api_key: Option<String>,
    pub captcha_timeout: Duration,
    /// Pause between profiles in a batch, jittered at runtime.
    pub delay_between_profiles: Duration,
    pub navigation_timeout: Duration,
    pub headless: bool,
    pub session_file: Option<PathBuf>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            captcha_api_key: None,
            captcha_timeout: DEFAULT_CAPTCHA_TIMEOUT,
            delay_between_profiles: DEFAULT_PROFILE_DELAY,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            headless: true,
            session_file: None,
        }
    }
}

impl ScraperConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(key) = env::var("CAPTCHA_API_KEY") {
            if !key.trim().is_empty() {
                config.captcha_api_key = Some(key.trim().to_string());
            }
        }
        if let Some(secs) = env_seconds("CAPTCHA_TIMEOUT") {
            config.captcha_timeout = secs;
        }
        if let Some(secs) = env_seconds("DELAY_BETWEEN_PROFILES") {
            config.delay_between_profiles = secs;
        }
        if let Ok(raw) = env::var("HEADLESS") {
            config.headless = !matches!(raw.trim().to_lowercase().as_str(), "false" | "0" | "no");
        }
        if let Ok(path) = env::var("SESSION_FILE") {
            if !path.trim().is_empty() {
                config.session_file = Some(PathBuf::from(path.trim()));
            }
        }

        config
    }
}

fn env_seconds(name: &str) -> Option<Duration> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            warn!("ignoring non-numeric {name}={raw}");
            None
        }
    }
}

/// Expand a bare handle or path into a full channel URL.
pub fn expand_channel_url(entry: &str) -> String {
    let entry = entry.trim();
    if entry.starts_with("http://") || entry.starts_with("https://") {
        return entry.to_string();
    }
    if entry.starts_with('@') {
        return format!("{PLATFORM_BASE_URL}/{entry}");
    }
    if entry.starts_with('/') {
        return format!("{PLATFORM_BASE_URL}{entry}");
    }
    format!("{PLATFORM_BASE_URL}/@{entry}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_headless_with_standard_timings() {
        let config = ScraperConfig::default();
        assert!(config.headless);
        assert_eq!(config.captcha_timeout, Duration::from_secs(120));
        assert_eq!(config.delay_between_profiles, Duration::from_secs(10));
        assert!(config.captcha_api_key.is_none());
    }

    #[test]
    fn channel_entries_expand_to_full_urls() {
        assert_eq!(
            expand_channel_url("https://www.youtube.com/@chan"),
            "https://www.youtube.com/@chan"
        );
        assert_eq!(
            expand_channel_url("@chan"),
            "https://www.youtube.com/@chan"
        );
        assert_eq!(
            expand_channel_url("chan"),
            "https://www.youtube.com/@chan"
        );
        assert_eq!(
            expand_channel_url("/channel/UC123"),
            "https://www.youtube.com/channel/UC123"
        );
    }
}
