use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// When a watch task notifies its owner.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Report the result of every probe.
    EveryCheck,
    /// Report only when the status differs from the previous observation.
    #[default]
    OnChange,
}

/// What happens to an owner's record once it holds no watches.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyOwnerPolicy {
    /// Keep the record so the owner's default interval survives.
    #[default]
    Keep,
    /// Delete the record as soon as its last watch goes away.
    Prune,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WatcherConfig {
    pub tg_bot_token: String,

    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    #[serde(default = "default_min_interval")]
    pub min_interval_seconds: u64,

    #[serde(default = "default_interval")]
    pub default_interval_seconds: u64,

    #[serde(default)]
    pub notify_policy: NotifyPolicy,

    #[serde(default)]
    pub empty_owner_policy: EmptyOwnerPolicy,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,

    #[serde(default = "default_probe_base_url")]
    pub probe_base_url: String,

    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialWatcherConfig {
    tg_bot_token: Option<String>,
    data_file: Option<PathBuf>,
    min_interval_seconds: Option<u64>,
    default_interval_seconds: Option<u64>,
    notify_policy: Option<NotifyPolicy>,
    empty_owner_policy: Option<EmptyOwnerPolicy>,
    probe_timeout_seconds: Option<u64>,
    probe_base_url: Option<String>,
    telegram_api_url: Option<String>,
    poll_timeout_seconds: Option<u64>,
    log_dir: Option<String>,
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data.json")
}

fn default_min_interval() -> u64 {
    10
}

fn default_interval() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    15
}

fn default_probe_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    60
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl WatcherConfig {
    /// Loads the configuration. Environment variables override the TOML file,
    /// which overrides built-in defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path_str) => read_partial(Path::new(path_str))?,
            None => PartialWatcherConfig::default(),
        };
        let env_config: PartialWatcherConfig = envy::from_env::<PartialWatcherConfig>()?;

        Self::merge(env_config, file_config)
    }

    fn merge(
        env_config: PartialWatcherConfig,
        file_config: PartialWatcherConfig,
    ) -> Result<Self, ConfigError> {
        let min_interval_seconds = env_config
            .min_interval_seconds
            .or(file_config.min_interval_seconds)
            .unwrap_or_else(default_min_interval);
        if min_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "min_interval_seconds",
                reason: "must be at least 1".to_string(),
            });
        }

        let config = WatcherConfig {
            tg_bot_token: env_config
                .tg_bot_token
                .or(file_config.tg_bot_token)
                .filter(|t| !t.trim().is_empty())
                .ok_or(ConfigError::Missing("TG_BOT_TOKEN"))?,
            data_file: env_config
                .data_file
                .or(file_config.data_file)
                .unwrap_or_else(default_data_file),
            min_interval_seconds,
            default_interval_seconds: env_config
                .default_interval_seconds
                .or(file_config.default_interval_seconds)
                .unwrap_or_else(default_interval)
                .max(min_interval_seconds),
            notify_policy: env_config
                .notify_policy
                .or(file_config.notify_policy)
                .unwrap_or_default(),
            empty_owner_policy: env_config
                .empty_owner_policy
                .or(file_config.empty_owner_policy)
                .unwrap_or_default(),
            probe_timeout_seconds: env_config
                .probe_timeout_seconds
                .or(file_config.probe_timeout_seconds)
                .unwrap_or_else(default_probe_timeout)
                .max(1),
            probe_base_url: env_config
                .probe_base_url
                .or(file_config.probe_base_url)
                .unwrap_or_else(default_probe_base_url),
            telegram_api_url: env_config
                .telegram_api_url
                .or(file_config.telegram_api_url)
                .unwrap_or_else(default_telegram_api_url),
            poll_timeout_seconds: env_config
                .poll_timeout_seconds
                .or(file_config.poll_timeout_seconds)
                .unwrap_or_else(default_poll_timeout),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
        };

        Ok(config)
    }
}

fn read_partial(path: &Path) -> Result<PartialWatcherConfig, ConfigError> {
    if !path.exists() {
        return Ok(PartialWatcherConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
