use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::Page;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds between SSE keep-alive comments (default: 10)
    #[serde(default = "default_keep_alive")]
    pub sse_keep_alive_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7410
}

fn default_keep_alive() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sse_keep_alive_secs: default_keep_alive(),
        }
    }
}

/// Session creation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// When false, session creation answers "closed"
    #[serde(default = "default_true")]
    pub allow_new_sessions: bool,
    /// Gameplan every new session starts with
    #[serde(default = "default_pages")]
    pub default_pages: Vec<String>,
    /// Reuse an open session from the same origin address
    #[serde(default = "default_true")]
    pub dedupe_by_address: bool,
}

fn default_true() -> bool {
    true
}

fn default_pages() -> Vec<String> {
    ["Welcome", "Details", "Review", "Done"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            allow_new_sessions: true,
            default_pages: default_pages(),
            dedupe_by_address: true,
        }
    }
}

impl SessionsConfig {
    pub fn pages(&self) -> Vec<Page> {
        self.default_pages.iter().map(Page::new).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Point-query interval for observers (default: 1500)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Waiting checkpoints older than this are swept as stale (0 = never)
    #[serde(default)]
    pub stale_after_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    1500
}

fn default_sweep_interval() -> u64 {
    30
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            stale_after_secs: 0,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl CheckpointConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `None` when the sweep is disabled
    pub fn stale_after(&self) -> Option<Duration> {
        (self.stale_after_secs > 0).then(|| Duration::from_secs(self.stale_after_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// How long a finished creation keeps absorbing callers (default: 500)
    #[serde(default = "default_grace_window")]
    pub grace_window_ms: u64,
}

fn default_grace_window() -> u64 {
    500
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            grace_window_ms: default_grace_window(),
        }
    }
}

impl IdentityConfig {
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot file; in-memory only when unset
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write to a log file instead of stderr
    #[serde(default)]
    pub to_file: bool,

    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
            directory: default_log_dir(),
        }
    }
}

impl Config {
    /// Project-local config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from("waypoint.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Embedded defaults so the server runs without any config file
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/waypoint/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("waypoint").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables, e.g. WAYPOINT__SERVER__PORT=9000
        builder = builder.add_source(
            config::Environment::with_prefix("WAYPOINT")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.checkpoint.poll_interval_ms == 0 {
            bail!("checkpoint.poll_interval_ms must be greater than zero");
        }
        if self.sessions.default_pages.is_empty() {
            bail!("sessions.default_pages must name at least one page");
        }
        if self
            .sessions
            .default_pages
            .iter()
            .any(|p| p.trim().is_empty())
        {
            bail!("sessions.default_pages must not contain blank names");
        }
        Ok(())
    }

    /// Save config to ./waypoint.toml
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::project_config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sessions: SessionsConfig::default(),
            checkpoint: CheckpointConfig::default(),
            identity: IdentityConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
