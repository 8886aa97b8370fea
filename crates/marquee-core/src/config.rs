//! Configuration module
//!
//! The configuration is a single YAML document with a source side (`copy_from`) and a
//! destination side (`project_to`), plus optional logging, state, retry and HTTP
//! sections. Everything is validated before the control loop starts.

use std::env;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::SyncError;
use crate::models::ScheduleMarker;
use crate::provider_types::{SinkProvider, SourceProvider};
use crate::retry::RetryPolicy;

// Common constants
const DEFAULT_CONFIG_PATH: &str = "./config.yaml";
const CONFIG_PATH_ENV: &str = "MARQUEE_CONFIG";
const LEGACY_CONFIG_PATH_ENV: &str = "CONFIG_PATH";
const POLL_INTERVAL_SECS: u64 = 10;
const SCHEDULE_DURATION_HOURS: u32 = 24;
const DISPLAY_WIDTH: u32 = 1920;
const DISPLAY_HEIGHT: u32 = 1080;
const BACKGROUND_COLOR: &str = "#000000";
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Configuration file path resolution: explicit path > environment variable > default.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub cli_arg: Option<PathBuf>,
    pub env_var: Option<PathBuf>,
}

impl ConfigPaths {
    pub fn resolve(&self) -> PathBuf {
        self.cli_arg
            .clone()
            .or_else(|| self.env_var.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}

/// Resolve the configuration path from the CLI argument and the environment
/// (`MARQUEE_CONFIG`, falling back to the legacy `CONFIG_PATH`).
pub fn resolve_config_path(cli_arg: Option<PathBuf>) -> PathBuf {
    let env_var = env::var(CONFIG_PATH_ENV)
        .or_else(|_| env::var(LEGACY_CONFIG_PATH_ENV))
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);

    ConfigPaths { cli_arg, env_var }.resolve()
}

/// Complete application configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub copy_from: SourceConfig,
    pub project_to: DestinationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Source side: the WebDAV directory watched for new media.
#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    pub provider: String,
    pub server: String,
    pub path: String,
    pub auth: BasicAuthConfig,
    pub extensions: Vec<String>,
    /// Seconds between polling cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Publish files already present at startup instead of only newer ones
    #[serde(default)]
    pub process_existing: bool,
}

#[derive(Clone, Deserialize)]
pub struct BasicAuthConfig {
    pub user: String,
    pub password: String,
}

impl Debug for BasicAuthConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BasicAuthConfig")
            .field("user", &self.user)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Destination side: the signage CMS and the display content is pushed to.
#[derive(Clone, Debug, Deserialize)]
pub struct DestinationConfig {
    pub provider: String,
    pub host: String,
    pub auth: ClientCredentialsConfig,
    pub display: DisplayConfig,
    #[serde(default = "default_schedule_duration_hours")]
    pub schedule_duration_hours: u32,
    /// IANA timezone the CMS interprets schedule times in (default UTC)
    #[serde(default)]
    pub timezone: Option<String>,
    /// Comma-separated tags attached to every uploaded media item
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub markers: MarkerConfig,
}

#[derive(Clone, Deserialize)]
pub struct ClientCredentialsConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl Debug for ClientCredentialsConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ClientCredentialsConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DisplayConfig {
    pub name: String,
    #[serde(default = "default_display_width")]
    pub width: u32,
    #[serde(default = "default_display_height")]
    pub height: u32,
    #[serde(default = "default_background_color")]
    pub background_color: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MarkerConfig {
    #[serde(default = "default_schedule_prefix")]
    pub schedule_prefix: String,
    #[serde(default = "default_layout_prefix")]
    pub layout_prefix: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            schedule_prefix: default_schedule_prefix(),
            layout_prefix: default_layout_prefix(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Optional log file (rotated daily) written in addition to stdout
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StateConfig {
    /// Persist the watermark here after every published file
    #[serde(default)]
    pub watermark_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_poll_interval() -> u64 {
    POLL_INTERVAL_SECS
}

fn default_schedule_duration_hours() -> u32 {
    SCHEDULE_DURATION_HOURS
}

fn default_display_width() -> u32 {
    DISPLAY_WIDTH
}

fn default_display_height() -> u32 {
    DISPLAY_HEIGHT
}

fn default_background_color() -> String {
    BACKGROUND_COLOR.to_string()
}

fn default_schedule_prefix() -> String {
    "Auto-scheduled".to_string()
}

fn default_layout_prefix() -> String {
    "Auto-layout".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout_secs() -> u64 {
    HTTP_TIMEOUT_SECS
}

fn require(value: &str, field: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        return Err(SyncError::config(format!("Missing required field: {}", field)));
    }
    Ok(())
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Err(SyncError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!(
                "Error reading config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, SyncError> {
        if contents.trim().is_empty() {
            return Err(SyncError::config("Configuration is empty"));
        }

        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let source = &self.copy_from;
        self.source_provider()?;
        require(&source.server, "copy_from.server")?;
        require(&source.path, "copy_from.path")?;
        require(&source.auth.user, "copy_from.auth.user")?;
        require(&source.auth.password, "copy_from.auth.password")?;

        if source.extensions.is_empty() {
            return Err(SyncError::config(
                "copy_from.extensions must list at least one extension",
            ));
        }
        if let Some(ext) = source.extensions.iter().find(|ext| !ext.starts_with('.') || ext.len() < 2) {
            return Err(SyncError::config(format!(
                "Invalid extension '{}' in copy_from.extensions (expected e.g. '.jpg')",
                ext
            )));
        }
        if source.poll_interval == 0 {
            return Err(SyncError::config("copy_from.poll_interval must be greater than 0"));
        }

        let destination = &self.project_to;
        self.sink_provider()?;
        require(&destination.host, "project_to.host")?;
        require(&destination.auth.client_id, "project_to.auth.client_id")?;
        require(&destination.auth.client_secret, "project_to.auth.client_secret")?;
        require(&destination.display.name, "project_to.display.name")?;

        if destination.display.width == 0 || destination.display.height == 0 {
            return Err(SyncError::config(
                "project_to.display.width and height must be greater than 0",
            ));
        }
        if !is_hex_color(&destination.display.background_color) {
            return Err(SyncError::config(format!(
                "project_to.display.background_color must look like #RRGGBB, got '{}'",
                destination.display.background_color
            )));
        }
        if destination.schedule_duration_hours == 0 {
            return Err(SyncError::config(
                "project_to.schedule_duration_hours must be greater than 0",
            ));
        }
        self.cms_timezone()?;
        require(&destination.markers.schedule_prefix, "project_to.markers.schedule_prefix")?;
        require(&destination.markers.layout_prefix, "project_to.markers.layout_prefix")?;

        if self.retry.max_attempts == 0 {
            return Err(SyncError::config("retry.max_attempts must be at least 1"));
        }
        if self.http.timeout_secs == 0 {
            return Err(SyncError::config("http.timeout_secs must be greater than 0"));
        }

        Ok(())
    }

    pub fn source_provider(&self) -> Result<SourceProvider, SyncError> {
        self.copy_from
            .provider
            .parse()
            .map_err(|e: anyhow::Error| SyncError::config(format!("copy_from.provider: {}", e)))
    }

    pub fn sink_provider(&self) -> Result<SinkProvider, SyncError> {
        self.project_to
            .provider
            .parse()
            .map_err(|e: anyhow::Error| SyncError::config(format!("project_to.provider: {}", e)))
    }

    pub fn cms_timezone(&self) -> Result<Tz, SyncError> {
        match self.project_to.timezone.as_deref() {
            None => Ok(Tz::UTC),
            Some(name) => name.parse::<Tz>().map_err(|e| {
                SyncError::config(format!("project_to.timezone '{}' is invalid: {}", name, e))
            }),
        }
    }

    // Convenience getters for common fields
    pub fn display_name(&self) -> &str {
        &self.project_to.display.name
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.copy_from.poll_interval)
    }

    pub fn extensions(&self) -> &[String] {
        &self.copy_from.extensions
    }

    pub fn source_path(&self) -> &str {
        &self.copy_from.path
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn marker(&self) -> ScheduleMarker {
        ScheduleMarker::new(
            self.project_to.markers.schedule_prefix.clone(),
            self.project_to.markers.layout_prefix.clone(),
        )
    }
}
