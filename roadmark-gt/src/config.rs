//! Configuration management for the roadmark-gt geotagger
//!
//! Two-tier configuration:
//! 1. **TOML Bootstrap**: database path, port, logging (static, bootstrap
//!    only; restart to pick up changes)
//! 2. **Database Runtime**: all runtime tunables from the `settings` table
//!
//! Settings sources priority:
//! 1. Command-line arguments (--port, --database)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Database settings table
//! 5. Built-in defaults (code constants)
//!
//! Missing or NULL settings are initialized with built-in defaults and
//! written back to the database.

use crate::error::{Error, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
///
/// **Minimal by design** - only bootstrap concerns live here.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite catalog database file (relative or absolute)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
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

fn default_database_path() -> PathBuf {
    PathBuf::from("roadmark.db")
}

fn default_port() -> u16 {
    5760
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Load bootstrap configuration, falling back to built-in defaults
    /// when no file exists at `path`
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {:?}, using built-in defaults", path);
            return Ok(Self::default());
        }

        let toml_str = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: TomlConfig = toml::from_str(&toml_str)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        info!("Loaded TOML configuration from {:?}", path);
        Ok(config)
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Runtime settings loaded from the database
///
/// All values have built-in defaults; missing database values are
/// initialized with defaults and written back for consistency.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    // === Deduplication ===
    /// Two detections within this distance denote the same physical defect
    pub duplicate_radius_m: f64,
    /// Two detections within this distance denote the same instantaneous
    /// event (sensor jitter, not separately counted)
    pub noise_radius_m: f64,
    /// Qualifying detections that consolidate into one count increment
    pub detections_per_increment: u32,

    // === Push Channel ===
    pub sse_buffer_capacity: usize,

    // === Persistence Retry ===
    pub persist_retry_interval_ms: u64,
    pub persist_max_retries: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            duplicate_radius_m: 5.0,
            noise_radius_m: 0.02,
            detections_per_increment: 10,
            sse_buffer_capacity: 100,
            persist_retry_interval_ms: 1000,
            persist_max_retries: 5,
        }
    }
}

impl RuntimeSettings {
    /// Load runtime settings from the database
    ///
    /// For each setting: read, or write the built-in default back when
    /// missing.
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            duplicate_radius_m: get_setting_f64(pool, "duplicate_radius_m", defaults.duplicate_radius_m).await?,
            noise_radius_m: get_setting_f64(pool, "noise_radius_m", defaults.noise_radius_m).await?,
            detections_per_increment: get_setting_u32(
                pool,
                "detections_per_increment",
                defaults.detections_per_increment,
            )
            .await?,
            sse_buffer_capacity: get_setting_u64(
                pool,
                "sse_buffer_capacity",
                defaults.sse_buffer_capacity as u64,
            )
            .await? as usize,
            persist_retry_interval_ms: get_setting_u64(
                pool,
                "persist_retry_interval_ms",
                defaults.persist_retry_interval_ms,
            )
            .await?,
            persist_max_retries: get_setting_u32(
                pool,
                "persist_max_retries",
                defaults.persist_max_retries,
            )
            .await?,
        };

        info!("Loaded runtime settings from database");
        Ok(settings)
    }

    pub fn persist_retry_interval(&self) -> Duration {
        Duration::from_millis(self.persist_retry_interval_ms)
    }
}

/// Read one setting, writing the default back when missing
async fn get_setting_raw(pool: &SqlitePool, key: &str, default: String) -> Result<String> {
    let value_opt: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match value_opt {
        Some((value,)) => Ok(value),
        None => {
            info!("Setting '{}' not found in database, using default: {}", key, default);
            sqlx::query(
                "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
            )
            .bind(key)
            .bind(&default)
            .execute(pool)
            .await?;
            Ok(default)
        }
    }
}

async fn get_setting_f64(pool: &SqlitePool, key: &str, default: f64) -> Result<f64> {
    let raw = get_setting_raw(pool, key, default.to_string()).await?;
    raw.parse::<f64>()
        .map_err(|e| Error::Config(format!("Invalid f64 for '{}': {}", key, e)))
}

async fn get_setting_u32(pool: &SqlitePool, key: &str, default: u32) -> Result<u32> {
    let raw = get_setting_raw(pool, key, default.to_string()).await?;
    raw.parse::<u32>()
        .map_err(|e| Error::Config(format!("Invalid u32 for '{}': {}", key, e)))
}

async fn get_setting_u64(pool: &SqlitePool, key: &str, default: u64) -> Result<u64> {
    let raw = get_setting_raw(pool, key, default.to_string()).await?;
    raw.parse::<u64>()
        .map_err(|e| Error::Config(format!("Invalid u64 for '{}': {}", key, e)))
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub port: u16,
    pub runtime: RuntimeSettings,
}

impl Config {
    /// Assemble the effective configuration from bootstrap + overrides
    pub fn assemble(
        toml_config: TomlConfig,
        overrides: ConfigOverrides,
        runtime: RuntimeSettings,
    ) -> Self {
        Self {
            database_path: overrides
                .database_path
                .unwrap_or(toml_config.database_path),
            port: overrides.port.unwrap_or(toml_config.port),
            runtime,
        }
    }
}
