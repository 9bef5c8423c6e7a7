use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Library configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub fetch: FetchConfig,
    pub storage: StorageConfig,
}

/// Catalog server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the catalog server, without the `/v1` prefix
    pub base_url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
        }
    }
}

/// Sync manager retry and notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// First retry delay after a failed sync
    pub min_retry_delay_secs: u64,
    /// Upper bound for the retry delay
    pub max_retry_delay_secs: u64,
    /// Growth factor applied after every failure
    pub retry_multiplier: f64,
    /// Schedule retries automatically after a failed sync
    pub auto_retry: bool,
    /// Quiet period before grouped "download completed" notifications are shown
    pub download_notification_debounce_ms: u64,
    /// Unread download notifications younger than this are surfaced after a full sync
    pub recent_download_window_hours: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_retry_delay_secs: 5,
            max_retry_delay_secs: 300,
            retry_multiplier: 2.0,
            auto_retry: true,
            download_notification_debounce_ms: 2000,
            recent_download_window_hours: 24,
        }
    }
}

impl SyncConfig {
    pub fn download_notification_debounce(&self) -> Duration {
        Duration::from_millis(self.download_notification_debounce_ms)
    }

    pub fn recent_download_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recent_download_window_hours as i64)
    }
}

/// Content-fetch scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Shortest idle sleep between empty cycles
    pub min_idle_ms: u64,
    /// Longest idle sleep between empty cycles
    pub max_idle_ms: u64,
    /// Most items picked up in one cycle
    pub max_batch_size: usize,
    pub network_retry_secs: u64,
    pub not_found_retry_secs: u64,
    pub unauthorized_retry_secs: u64,
    pub unknown_retry_secs: u64,
    pub client_retry_secs: u64,
    /// Albums requested per discography page
    pub discography_page_size: usize,
    /// Hard cap on albums fetched for one artist
    pub max_discography_albums: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_idle_ms: 5,
            max_idle_ms: 10_000,
            max_batch_size: 100,
            network_retry_secs: 60,
            not_found_retry_secs: 3600,
            unauthorized_retry_secs: 1800,
            unknown_retry_secs: 300,
            client_retry_secs: 300,
            discography_page_size: 50,
            max_discography_albums: 500,
        }
    }
}

/// Local storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory (empty = platform data dir)
    pub data_dir: Option<String>,
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("catalog-sync");

        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default path, creating it if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}
