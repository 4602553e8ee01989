//! Application configuration.
//!
//! Loaded from a TOML file with `COINBOARD__SECTION__KEY` environment
//! overrides layered on top (e.g. `COINBOARD__FEED__DEPTH_LIMIT=10`).

use crate::error::{AppError, AppResult};
use coinboard_offload::OffloadConfig;
use coinboard_rest::RestConfig;
use coinboard_signal::ClassifierConfig;
use coinboard_ws::FeedConfig;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the config path.
pub const CONFIG_ENV: &str = "COINBOARD_CONFIG";

/// Config path used when neither the CLI nor [`CONFIG_ENV`] names one.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const ENV_PREFIX: &str = "COINBOARD";

/// Depth stream section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSection {
    /// Stream endpoint; each symbol gets its own connection below it.
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// Stream name suffix appended to the lower-cased symbol.
    #[serde(default = "default_stream_suffix")]
    pub stream_suffix: String,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Levels kept per side after aggregation.
    #[serde(default = "default_depth_limit")]
    pub depth_limit: usize,
    /// Reconnect, coalescing and idle settings shared by every symbol.
    #[serde(default)]
    pub connection: FeedConfig,
}

fn default_stream_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_stream_suffix() -> String {
    "@depth20@100ms".to_string()
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_depth_limit() -> usize {
    20
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            stream_suffix: default_stream_suffix(),
            symbols: default_symbols(),
            depth_limit: default_depth_limit(),
            connection: FeedConfig::default(),
        }
    }
}

impl FeedSection {
    /// Stream URL for one symbol, e.g. `.../ws/btcusdt@depth20@100ms`.
    pub fn stream_url_for(&self, symbol: &str) -> String {
        format!(
            "{}/{}{}",
            self.stream_url.trim_end_matches('/'),
            symbol.to_ascii_lowercase(),
            self.stream_suffix
        )
    }

    /// Feed client config for one symbol.
    pub fn client_config(&self, symbol: &str) -> FeedConfig {
        self.connection.clone().with_url(self.stream_url_for(symbol))
    }
}

/// Status reporting section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Interval between status lines (ms).
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// Books older than this are reported stale (ms).
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,
    /// Number of movers listed in each market report.
    #[serde(default = "default_top_movers")]
    pub top_movers: usize,
    /// When set, each status tick writes the Prometheus text exposition here.
    #[serde(default)]
    pub metrics_path: Option<String>,
}

fn default_status_interval_ms() -> u64 {
    5_000
}

fn default_stale_threshold_ms() -> u64 {
    10_000
}

fn default_top_movers() -> usize {
    5
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
            stale_threshold_ms: default_stale_threshold_ms(),
            top_movers: default_top_movers(),
            metrics_path: None,
        }
    }
}

impl DashboardConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub offload: OffloadConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    /// Load from `cli_path`, else [`CONFIG_ENV`], else the default path.
    ///
    /// A missing file at the resolved path falls back to defaults.
    pub fn load(cli_path: Option<&str>) -> AppResult<Self> {
        let config_path = cli_path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&config_path).exists() {
            tracing::info!(path = %config_path, "Loading configuration");
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load a TOML file with environment overrides applied.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let settings = Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse inline TOML. No environment overrides are applied.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.feed.symbols.is_empty() {
            return Err(AppError::Config("feed.symbols is empty".to_string()));
        }
        if self.feed.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(AppError::Config(
                "feed.symbols contains an empty symbol".to_string(),
            ));
        }
        if self.feed.depth_limit == 0 {
            return Err(AppError::Config(
                "feed.depth_limit must be positive".to_string(),
            ));
        }
        self.feed.client_config(&self.feed.symbols[0]).validate()?;
        self.classifier.validate()?;

        if self.rest.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "rest.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.offload.timeout_ms == 0 {
            return Err(AppError::Config(
                "offload.timeout_ms must be positive".to_string(),
            ));
        }
        if self.dashboard.status_interval_ms == 0 {
            return Err(AppError::Config(
                "dashboard.status_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace the configured symbols (CLI override) and re-validate.
    /// Symbols are upper-cased; an empty list keeps the configured ones.
    pub fn with_symbols(mut self, symbols: Vec<String>) -> AppResult<Self> {
        if !symbols.is_empty() {
            self.feed.symbols = symbols.iter().map(|s| s.to_ascii_uppercase()).collect();
        }
        self.validate()?;
        Ok(self)
    }
}
