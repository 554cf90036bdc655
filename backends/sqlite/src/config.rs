use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use habitat_core::{AccessControlConfig, StoreOptions};
use serde::Deserialize;

use crate::cli::Cli;

/// Runtime configuration resolved from defaults, file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database file.
    pub db_path: PathBuf,
    pub page_limit: usize,
    pub auto_refresh: bool,
    pub refresh_interval_ms: u64,
    pub max_message_len: usize,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    database: FileDatabase,
    #[serde(default)]
    messages: FileMessages,
    #[serde(default)]
    access: FileAccess,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Deserialize)]
struct FileDatabase {
    #[serde(default = "default_db_path")]
    path: PathBuf,
}

#[derive(Deserialize)]
struct FileMessages {
    #[serde(default = "default_page_limit")]
    page_limit: usize,
    #[serde(default)]
    auto_refresh: bool,
    #[serde(default = "default_refresh_interval_ms")]
    refresh_interval_ms: u64,
    #[serde(default = "default_max_message_len")]
    max_length: usize,
}

#[derive(Deserialize)]
struct FileAccess {
    #[serde(default = "default_true")]
    cache_enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    cache_ttl_secs: u64,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("habitat.db")
}

fn default_page_limit() -> usize {
    50
}

fn default_refresh_interval_ms() -> u64 {
    30_000
}

fn default_max_message_len() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for FileDatabase {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for FileMessages {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            auto_refresh: false,
            refresh_interval_ms: default_refresh_interval_ms(),
            max_length: default_max_message_len(),
        }
    }
}

impl Default for FileAccess {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("HABITAT_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/habitat.toml"));

        let file_cfg: FileConfig = match fs::read(&config_path) {
            Ok(bytes) => {
                let contents = String::from_utf8_lossy(&bytes);
                toml::from_str(&contents).context("invalid config file")?
            }
            Err(_) => FileConfig::default(),
        };

        let mut cfg = Self {
            db_path: file_cfg.database.path,
            page_limit: file_cfg.messages.page_limit,
            auto_refresh: file_cfg.messages.auto_refresh,
            refresh_interval_ms: file_cfg.messages.refresh_interval_ms,
            max_message_len: file_cfg.messages.max_length,
            cache_enabled: file_cfg.access.cache_enabled,
            cache_ttl_secs: file_cfg.access.cache_ttl_secs,
            logging_enabled: file_cfg.logging.enabled,
        };

        // environment overrides
        if let Ok(p) = std::env::var("HABITAT_DB") {
            cfg.db_path = PathBuf::from(p);
        }
        if let Some(l) = env_parse("HABITAT_PAGE_LIMIT") {
            cfg.page_limit = l;
        }
        if let Some(t) = env_parse("HABITAT_CACHE_TTL_SECS") {
            cfg.cache_ttl_secs = t;
        }
        if let Some(l) = env_parse("HABITAT_LOGGING") {
            cfg.logging_enabled = l;
        }

        // CLI overrides
        if let Some(p) = &cli.db {
            cfg.db_path = p.clone();
        }
        if let Some(l) = cli.page_limit {
            cfg.page_limit = l;
        }
        if let Some(l) = cli.logging {
            cfg.logging_enabled = l;
        }
        if cli.no_cache {
            cfg.cache_enabled = false;
        }

        if !(1..=200).contains(&cfg.page_limit) {
            anyhow::bail!("invalid_page_limit");
        }
        if cfg.refresh_interval_ms < 1000 {
            anyhow::bail!("invalid_refresh_interval");
        }
        if cfg.max_message_len == 0 {
            anyhow::bail!("invalid_max_length");
        }
        Ok(cfg)
    }

    pub fn store_options(&self) -> StoreOptions {
        let mut options = StoreOptions::default()
            .with_limit(self.page_limit)
            .with_max_content_len(self.max_message_len);
        options.refresh_interval = Duration::from_millis(self.refresh_interval_ms);
        options.auto_refresh = self.auto_refresh;
        options
    }

    pub fn access_config(&self) -> AccessControlConfig {
        AccessControlConfig::default()
            .with_cache_enabled(self.cache_enabled)
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs))
    }
}
