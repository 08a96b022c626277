//! Configuration loading and resolution
//!
//! Configuration is read once per run from a TOML file, validated, and then
//! handed by value to the asset store gateway and the remote link client.
//! Nothing mutates it afterwards.
//!
//! # Config File Resolution
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`LIVELINK_CONFIG`)
//! 3. `./livelink.toml` in the working directory
//! 4. Platform config directory (`~/.config/livelink/config.toml` on Linux)
//!
//! The API key additionally honours `LIVELINK_API_KEY`, which takes priority
//! over the TOML value.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "LIVELINK_CONFIG";

/// Environment variable overriding `api.api_key`
pub const API_KEY_ENV_VAR: &str = "LIVELINK_API_KEY";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "livelink.toml";

/// Largest `matching.max_time_delta_secs` a chrono `Duration` can hold
pub const MAX_TIME_DELTA_SECS: u64 = i64::MAX as u64 / 1000;

/// Complete configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Remote photo server API
    pub api: ApiConfig,

    /// Asset metadata database; only identification needs it
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Pair matching heuristic
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Audit ledger output
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Server base URL, e.g. `http://photos.local:2283`
    pub url: String,

    /// API key sent as `x-api-key`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Asset database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    pub dbname: String,
    pub user: String,
    pub password: String,

    /// Restrict identification to assets owned by this user name
    #[serde(default)]
    pub owner_name: Option<String>,

    /// Table holding asset rows
    #[serde(default = "default_asset_table")]
    pub asset_table: String,

    /// Table holding user rows (only consulted when `owner_name` is set)
    #[serde(default = "default_user_table")]
    pub user_table: String,
}

/// Tie-break policy when several unlinked photos share a video's stem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Pick the photo closest in creation time; exact ties stay ambiguous
    #[default]
    NearestTimestamp,
    /// Never auto-pair when more than one photo shares the stem
    Reject,
}

/// Pair matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Suffix identifying the motion component, e.g. `_3.mov`
    #[serde(default = "default_live_video_suffix")]
    pub live_video_suffix: String,

    /// Largest accepted creation-time gap between photo and video
    #[serde(default)]
    pub max_time_delta_secs: Option<u64>,

    #[serde(default)]
    pub ambiguity_policy: AmbiguityPolicy,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            live_video_suffix: default_live_video_suffix(),
            max_time_delta_secs: None,
            ambiguity_policy: AmbiguityPolicy::default(),
        }
    }
}

/// Audit ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory receiving ledger files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Read each pairing back after linking before recording it as linked
    #[serde(default)]
    pub verify_links: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verify_links: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_db_port() -> u16 {
    5432
}

fn default_asset_table() -> String {
    "asset".to_string()
}

fn default_user_table() -> String {
    "user".to_string()
}

fn default_live_video_suffix() -> String {
    "_3.mov".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load, apply environment overrides, and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Validation(format!(
                "Configuration file not readable: {} ({})",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.api.api_key = resolve_api_key(config.api.api_key.as_deref());
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse without environment overrides or validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Validation(format!("Parse TOML failed: {}", e)))
    }

    /// Check every setting the run depends on
    pub fn validate(&self) -> Result<()> {
        let url = self.api.url.trim();
        if url.is_empty() {
            return Err(Error::Validation("api.url is empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Validation(format!(
                "api.url must start with http:// or https://, got '{}'",
                url
            )));
        }
        self.api.api_key()?;
        if self.api.timeout_secs == 0 {
            return Err(Error::Validation("api.timeout_secs must be positive".to_string()));
        }

        if let Some(database) = &self.database {
            database.validate()?;
        }

        let suffix = &self.matching.live_video_suffix;
        if suffix.trim().is_empty() {
            return Err(Error::Validation(
                "matching.live_video_suffix is empty".to_string(),
            ));
        }
        if !suffix.contains('.') {
            return Err(Error::Validation(format!(
                "matching.live_video_suffix must include a file extension, got '{}'",
                suffix
            )));
        }
        if let Some(secs) = self.matching.max_time_delta_secs {
            if secs > MAX_TIME_DELTA_SECS {
                return Err(Error::Validation(format!(
                    "matching.max_time_delta_secs must be at most {}, got {}",
                    MAX_TIME_DELTA_SECS, secs
                )));
            }
        }

        Ok(())
    }

    /// Database settings, required by the workflows that query the store
    pub fn database(&self) -> Result<&DatabaseConfig> {
        self.database.as_ref().ok_or_else(|| {
            Error::Validation(
                "[database] section missing; identification needs the asset database".to_string(),
            )
        })
    }
}

impl ApiConfig {
    /// Configured API key, rejecting blank values
    pub fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if is_valid_key(key) => Ok(key),
            _ => Err(Error::Validation(format!(
                "API key not configured. Set api.api_key in the config file or {}",
                API_KEY_ENV_VAR
            ))),
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim().trim_end_matches('/')
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Validation("database.host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Validation("database.port must be non-zero".to_string()));
        }
        if self.dbname.trim().is_empty() {
            return Err(Error::Validation("database.dbname is empty".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(Error::Validation("database.user is empty".to_string()));
        }
        validate_identifier("database.asset_table", &self.asset_table)?;
        validate_identifier("database.user_table", &self.user_table)
    }

    #[cfg(feature = "sqlx")]
    /// Build PostgreSQL connection options from the discrete settings
    pub fn connect_options(&self) -> sqlx::postgres::PgConnectOptions {
        sqlx::postgres::PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.dbname)
            .username(&self.user)
            .password(&self.password)
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the API key: environment first, then TOML
pub fn resolve_api_key(toml_key: Option<&str>) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    match (env_key, toml_key) {
        (Some(env), Some(_)) => {
            warn!(
                "API key found in both {} and TOML config. Using environment.",
                API_KEY_ENV_VAR
            );
            Some(env)
        }
        (Some(env), None) => {
            info!("API key loaded from environment variable");
            Some(env)
        }
        (None, Some(toml)) => Some(toml.to_string()),
        (None, None) => None,
    }
}

/// Locate the config file following the documented priority order
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: Working directory
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    // Priority 4: Platform config directory
    if let Some(path) = dirs::config_dir().map(|d| d.join("livelink").join("config.toml")) {
        if path.exists() {
            return Ok(path);
        }
    }

    Err(Error::Validation(format!(
        "No config file found. Pass --config, set {}, or create ./{}",
        CONFIG_ENV_VAR, LOCAL_CONFIG_FILE
    )))
}

/// Table names are interpolated into SQL, so only plain identifiers pass
fn validate_identifier(field: &str, value: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} must be a plain SQL identifier, got '{}'",
            field, value
        )))
    }
}
