//! Process settings loaded from the environment.
//!
//! `.env` files are honoured by the binaries (via `dotenvy`) before
//! [`AppConfig::from_env`] runs; everything has a default.

use std::str::FromStr;
use std::time::Duration;

use crate::api::server::ApiServerConfig;
use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:streamwatch.db?mode=rwc";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RESCAN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RULES_REFRESH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_VISUAL_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_AUDIO_WINDOW_SECS: u64 = 10;
pub const DEFAULT_CHAT_MESSAGE_WINDOW: usize = 20;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Monitor loop and supervisor timing.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Fixed sleep between detection cycles.
    pub poll_interval: Duration,
    /// How often the supervisor re-reads assignments. `None` disables rescans.
    pub rescan_interval: Option<Duration>,
    /// How often the rule store reloads keyword/object lists.
    pub rules_refresh_interval: Duration,
}

/// Detector backend parameters.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Minimum classifier confidence for a visual match.
    pub visual_confidence_threshold: f32,
    /// Length of the audio window handed to the transcriber.
    pub audio_window: Duration,
    /// Number of recent chat messages scanned per cycle.
    pub chat_message_window: usize,
}

/// Outbound notification settings.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
    pub webhook_timeout: Duration,
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: String,
    pub api: ApiServerConfig,
    pub monitor: MonitorSettings,
    pub detectors: DetectorSettings,
    pub notify: NotifySettings,
    /// Password for the admin account seeded on first start.
    pub admin_password: String,
    /// True when `admin_password` is the built-in default.
    pub admin_password_is_default: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
            api: ApiServerConfig::default(),
            monitor: MonitorSettings {
                poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
                rescan_interval: Some(Duration::from_secs(DEFAULT_RESCAN_INTERVAL_SECS)),
                rules_refresh_interval: Duration::from_secs(DEFAULT_RULES_REFRESH_INTERVAL_SECS),
            },
            detectors: DetectorSettings {
                visual_confidence_threshold: DEFAULT_VISUAL_CONFIDENCE_THRESHOLD,
                audio_window: Duration::from_secs(DEFAULT_AUDIO_WINDOW_SECS),
                chat_message_window: DEFAULT_CHAT_MESSAGE_WINDOW,
            },
            notify: NotifySettings {
                webhook_url: None,
                webhook_token: None,
                webhook_timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            },
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            admin_password_is_default: true,
        }
    }
}

impl AppConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = dir;
        }

        if let Some(addr) = get("API_BIND_ADDRESS") {
            config.api.bind_address = addr;
        }
        if let Some(port) = get("API_PORT") {
            config.api.port = parse_value("API_PORT", &port)?;
        }

        let poll: u64 = parse_or("MONITOR_POLL_INTERVAL_SECS", get, DEFAULT_POLL_INTERVAL_SECS)?;
        if poll == 0 {
            return Err(Error::config("MONITOR_POLL_INTERVAL_SECS must be at least 1"));
        }
        config.monitor.poll_interval = Duration::from_secs(poll);

        let rescan: u64 = parse_or(
            "MONITOR_RESCAN_INTERVAL_SECS",
            get,
            DEFAULT_RESCAN_INTERVAL_SECS,
        )?;
        config.monitor.rescan_interval = (rescan > 0).then(|| Duration::from_secs(rescan));

        let refresh: u64 = parse_or(
            "RULES_REFRESH_INTERVAL_SECS",
            get,
            DEFAULT_RULES_REFRESH_INTERVAL_SECS,
        )?;
        if refresh == 0 {
            return Err(Error::config("RULES_REFRESH_INTERVAL_SECS must be at least 1"));
        }
        config.monitor.rules_refresh_interval = Duration::from_secs(refresh);

        let threshold: f32 = parse_or(
            "VISUAL_CONFIDENCE_THRESHOLD",
            get,
            DEFAULT_VISUAL_CONFIDENCE_THRESHOLD,
        )?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::config(
                "VISUAL_CONFIDENCE_THRESHOLD must be between 0.0 and 1.0",
            ));
        }
        config.detectors.visual_confidence_threshold = threshold;
        config.detectors.audio_window = Duration::from_secs(parse_or(
            "AUDIO_WINDOW_SECS",
            get,
            DEFAULT_AUDIO_WINDOW_SECS,
        )?);
        config.detectors.chat_message_window =
            parse_or("CHAT_MESSAGE_WINDOW", get, DEFAULT_CHAT_MESSAGE_WINDOW)?;

        config.notify.webhook_url = get("NOTIFY_WEBHOOK_URL");
        config.notify.webhook_token = get("NOTIFY_WEBHOOK_TOKEN");
        config.notify.webhook_timeout = Duration::from_secs(parse_or(
            "NOTIFY_WEBHOOK_TIMEOUT_SECS",
            get,
            DEFAULT_WEBHOOK_TIMEOUT_SECS,
        )?);

        if let Some(password) = get("STREAMWATCH_ADMIN_PASSWORD") {
            config.admin_password = password;
            config.admin_password_is_default = false;
        }

        Ok(config)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| Error::config(format!("Invalid value for {}: '{}'", key, raw)))
}

fn parse_or<T, G>(key: &str, get: G, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(10));
        assert_eq!(config.monitor.rescan_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.detectors.chat_message_window, 20);
        assert!(config.notify.webhook_url.is_none());
        assert!(config.admin_password_is_default);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("API_PORT", "8080"),
            ("MONITOR_POLL_INTERVAL_SECS", "3"),
            ("MONITOR_RESCAN_INTERVAL_SECS", "0"),
            ("VISUAL_CONFIDENCE_THRESHOLD", "0.8"),
            ("NOTIFY_WEBHOOK_URL", "https://hooks.example.com/x"),
            ("STREAMWATCH_ADMIN_PASSWORD", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(3));
        assert!(config.monitor.rescan_interval.is_none());
        assert!((config.detectors.visual_confidence_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(
            config.notify.webhook_url.as_deref(),
            Some("https://hooks.example.com/x")
        );
        assert_eq!(config.admin_password, "s3cret");
        assert!(!config.admin_password_is_default);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = load(&[("DATABASE_URL", "   "), ("NOTIFY_WEBHOOK_URL", "")]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.notify.webhook_url.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            load(&[("API_PORT", "http")]).unwrap_err(),
            Error::Configuration(_)
        ));
        assert!(load(&[("MONITOR_POLL_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[("VISUAL_CONFIDENCE_THRESHOLD", "1.5")]).is_err());
        assert!(load(&[("CHAT_MESSAGE_WINDOW", "-1")]).is_err());
    }
}
