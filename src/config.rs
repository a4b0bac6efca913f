use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "REELFEED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub mock: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            mock: false,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}

fn default_user_agent() -> String {
    format!("reelfeed/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_visible_percent_threshold")]
    pub visible_percent_threshold: u8,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_mount_radius")]
    pub mount_radius: usize,
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            visible_percent_threshold: default_visible_percent_threshold(),
            page_size: default_page_size(),
            mount_radius: default_mount_radius(),
            settle_delay: default_settle_delay(),
        }
    }
}

impl FeedConfig {
    /// Threshold as a fraction in `(0.0, 1.0]`.
    pub fn visible_fraction(&self) -> f32 {
        f32::from(self.visible_percent_threshold.clamp(1, 100)) / 100.0
    }
}

fn default_visible_percent_threshold() -> u8 {
    50
}

fn default_page_size() -> usize {
    10
}

fn default_mount_radius() -> usize {
    1
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(150)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_mpv_path")]
    pub mpv_path: String,
    #[serde(default = "default_extra_args")]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub muted: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            mpv_path: default_mpv_path(),
            extra_args: default_extra_args(),
            muted: false,
        }
    }
}

fn default_mpv_path() -> String {
    "mpv".into()
}

fn default_extra_args() -> Vec<String> {
    vec!["--force-window=yes".into()]
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.trim().is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.trim().is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if !other.api.timeout.is_zero() {
        base.api.timeout = other.api.timeout;
    }
    base.api.mock = other.api.mock;

    if other.feed.visible_percent_threshold != 0 {
        base.feed.visible_percent_threshold = other.feed.visible_percent_threshold.min(100);
    }
    if other.feed.page_size != 0 {
        base.feed.page_size = other.feed.page_size;
    }
    base.feed.mount_radius = other.feed.mount_radius;
    base.feed.settle_delay = other.feed.settle_delay;

    if !other.player.mpv_path.trim().is_empty() {
        base.player.mpv_path = other.player.mpv_path;
    }
    base.player.extra_args = other.player.extra_args;
    base.player.muted = other.player.muted;

    base
}

// Env values are applied straight onto the merged config: unlike a file, an
// environment only names the keys it wants to override.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "api.mock" => cfg.api.mock = parse_bool(&value),
        "feed.visible_percent_threshold" => {
            if let Ok(parsed) = value.trim().parse::<u8>() {
                if parsed > 0 {
                    cfg.feed.visible_percent_threshold = parsed.min(100);
                }
            }
        }
        "feed.page_size" => {
            if let Ok(parsed) = value.trim().parse::<usize>() {
                cfg.feed.page_size = parsed;
            }
        }
        "feed.mount_radius" => {
            if let Ok(parsed) = value.trim().parse::<usize>() {
                cfg.feed.mount_radius = parsed;
            }
        }
        "feed.settle_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.settle_delay = duration;
            }
        }
        "player.mpv_path" => cfg.player.mpv_path = value,
        "player.extra_args" => {
            cfg.player.extra_args = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "player.muted" => cfg.player.muted = parse_bool(&value),
        _ => {}
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reelfeed").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("REELFEED_TEST_DEFAULTS".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "http://localhost:8000");
        assert_eq!(cfg.feed.visible_percent_threshold, 50);
        assert_eq!(cfg.feed.page_size, 10);
        assert_eq!(cfg.feed.settle_delay, Duration::from_millis(150));
        assert!(!cfg.api.mock);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  base_url: https://feed.example\n  timeout: 5s\nfeed:\n  visible_percent_threshold: 80\n  mount_radius: 2\n",
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("REELFEED_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "https://feed.example");
        assert_eq!(cfg.api.timeout, Duration::from_secs(5));
        assert_eq!(cfg.feed.visible_percent_threshold, 80);
        assert_eq!(cfg.feed.mount_radius, 2);
        assert_eq!(cfg.feed.page_size, 10);
        assert_eq!(cfg.player.mpv_path, "mpv");
    }

    #[test]
    fn env_overrides() {
        env::set_var("REELFEED_TEST_ENV_FEED__VISIBLE_PERCENT_THRESHOLD", "75");
        env::set_var("REELFEED_TEST_ENV_API__MOCK", "true");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/reelfeed.yaml")),
            env_prefix: Some("REELFEED_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.visible_percent_threshold, 75);
        assert!(cfg.api.mock);
        env::remove_var("REELFEED_TEST_ENV_FEED__VISIBLE_PERCENT_THRESHOLD");
        env::remove_var("REELFEED_TEST_ENV_API__MOCK");
    }

    #[test]
    fn threshold_fraction_is_clamped() {
        let mut feed = FeedConfig::default();
        assert!((feed.visible_fraction() - 0.5).abs() < f32::EPSILON);
        feed.visible_percent_threshold = 0;
        assert!((feed.visible_fraction() - 0.01).abs() < f32::EPSILON);
        feed.visible_percent_threshold = 200;
        assert!((feed.visible_fraction() - 1.0).abs() < f32::EPSILON);
    }
}
