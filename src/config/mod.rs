//! Configuration management
//!
//! This module handles loading and parsing configuration for the Slopemate
//! service. Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Place directory configuration
    #[serde(default)]
    pub places: PlacesConfig,
    /// Presence rules configuration
    #[serde(default)]
    pub presence: PresenceConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/slopemate.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Cache configuration
///
/// The cache only backs place directory lookups; check-in state always goes
/// straight to the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache driver (memory or redis)
    #[serde(default)]
    pub driver: CacheDriver,
    /// Redis connection URL (optional)
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Cache driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// In-memory cache (default)
    #[default]
    Memory,
    /// Redis cache
    Redis,
}

/// Place directory configuration
///
/// When `base_url` is unset the service runs without a directory and place
/// names must be supplied by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    /// Base URL of the places subsystem, e.g. `http://places:8081`
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_places_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: default_places_timeout(),
        }
    }
}

fn default_places_timeout() -> u64 {
    5
}

/// Presence rules configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Check-ins older than this without a checkout are swept inactive
    #[serde(default = "default_checkin_ttl")]
    pub checkin_ttl_seconds: u64,
    /// History/member queries look back this many days
    #[serde(default = "default_history_window_days")]
    pub history_window_days: u32,
    /// Attempts at generating an unused join code before giving up
    #[serde(default = "default_code_attempts")]
    pub code_attempts: u32,
    /// Client-supplied check-in timestamps may run at most this far ahead
    /// of server time
    #[serde(default = "default_timestamp_skew")]
    pub max_timestamp_skew_seconds: u64,
    /// When set, new groups expire this many days after creation
    #[serde(default)]
    pub group_lifetime_days: Option<u32>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            checkin_ttl_seconds: default_checkin_ttl(),
            history_window_days: default_history_window_days(),
            code_attempts: default_code_attempts(),
            max_timestamp_skew_seconds: default_timestamp_skew(),
            group_lifetime_days: None,
        }
    }
}

fn default_checkin_ttl() -> u64 {
    3600
}

fn default_history_window_days() -> u32 {
    7
}

fn default_code_attempts() -> u32 {
    10
}

fn default_timestamp_skew() -> u64 {
    300
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
                path: path.display().to_string(),
                source: e,
            })?;

            if content.trim().is_empty() {
                Self::default()
            } else {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
            }
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Variables follow the pattern `SLOPEMATE_<SECTION>_<FIELD>`, e.g.
    /// `SLOPEMATE_SERVER_PORT` or `SLOPEMATE_DATABASE_URL`.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SLOPEMATE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SLOPEMATE_SERVER_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(origin) = std::env::var("SLOPEMATE_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Ok(driver) = std::env::var("SLOPEMATE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                other => tracing::warn!("Unknown database driver '{}', keeping configured value", other),
            }
        }
        if let Ok(url) = std::env::var("SLOPEMATE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(driver) = std::env::var("SLOPEMATE_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                other => tracing::warn!("Unknown cache driver '{}', keeping configured value", other),
            }
        }
        if let Ok(url) = std::env::var("SLOPEMATE_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(url);
        }
        if let Ok(url) = std::env::var("SLOPEMATE_PLACES_BASE_URL") {
            self.places.base_url = Some(url);
        }
        if let Ok(ttl) = std::env::var("SLOPEMATE_PRESENCE_CHECKIN_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse() {
                self.presence.checkin_ttl_seconds = ttl;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(std::path::Path::new("definitely/not/here.yml")).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.presence.checkin_ttl_seconds, 3600);
        assert_eq!(config.presence.history_window_days, 7);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 9090\npresence:\n  checkin_ttl_seconds: 1800"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.presence.checkin_ttl_seconds, 1800);
        assert_eq!(config.presence.code_attempts, 10);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server: [this is not a mapping").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
    }
}
