use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;

const APP_DIR_NAME: &str = "Event Photo Uploader";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upload_endpoint: String,
    pub base_timeout_ms: u64,
    pub timeout_per_mb_ms: u64,
    pub max_extra_timeout_ms: u64,
    pub large_file_threshold_mb: u64,
    pub large_file_delay_ms: u64,
    pub default_delay_ms: u64,
    pub max_file_size_mb: u64,
    pub progress_chunk_kb: u64,
    pub database_path: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_endpoint: "http://localhost:3000/api/upload".to_string(),
            base_timeout_ms: 120_000,
            timeout_per_mb_ms: 2_000,
            max_extra_timeout_ms: 300_000,
            large_file_threshold_mb: 50,
            large_file_delay_ms: 2_000,
            default_delay_ms: 1_000,
            max_file_size_mb: 100,
            progress_chunk_kb: 64,
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    /// Level to apply once the config is loaded, or `None` when a non-empty
    /// `RUST_LOG` already chose the filters.
    pub fn startup_log_level(&self, rust_log: Option<&str>) -> Option<log::LevelFilter> {
        match rust_log {
            Some(value) if !value.trim().is_empty() => None,
            _ => Some(self.log_level_filter()),
        }
    }

    pub fn database_path(&self) -> AppResult<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(get_data_directory()?.join("events.db")),
        }
    }
}

pub fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join(APP_DIR_NAME);

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

pub fn get_data_directory() -> AppResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| AppError::Config("Could not find data directory".to_string()))?
        .join(APP_DIR_NAME);

    fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

pub fn load_config() -> AppResult<Config> {
    load_config_from(&get_config_path()?)
}

/// Load a config file, creating it with defaults when it does not exist.
///
/// A file that fails to parse is replaced in memory by the defaults; a file
/// that parses but holds invalid values is an error.
pub fn load_config_from(config_path: &Path) -> AppResult<Config> {
    if config_path.exists() {
        let config_str = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            Config::default()
        });

        validate_config(&config)?;
        Ok(config)
    } else {
        let default_config = Config::default();
        save_config_to(config_path, &default_config)?;
        Ok(default_config)
    }
}

pub fn save_config(config: &Config) -> AppResult<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(config_path: &Path, config: &Config) -> AppResult<()> {
    validate_config(config)?;

    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(config_path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    log::info!("Configuration saved to {}", config_path.display());
    Ok(())
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    InputValidator::validate_endpoint_url(&config.upload_endpoint)?;

    if config.base_timeout_ms < 1_000 {
        return Err(AppError::validation("base_timeout_ms", "Must be at least 1000ms"));
    }

    if config.large_file_threshold_mb == 0 {
        return Err(AppError::validation("large_file_threshold_mb", "Must be greater than 0"));
    }

    if config.max_file_size_mb == 0 {
        return Err(AppError::validation("max_file_size_mb", "Must be greater than 0"));
    }

    if config.progress_chunk_kb == 0 || config.progress_chunk_kb > 16 * 1024 {
        return Err(AppError::validation(
            "progress_chunk_kb",
            "Must be between 1 and 16384",
        ));
    }

    let valid_log_levels = ["off", "error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

pub fn reset_config() -> AppResult<Config> {
    reset_config_at(&get_config_path()?)
}

pub fn reset_config_at(config_path: &Path) -> AppResult<Config> {
    if config_path.exists() {
        let backup_path = config_path.with_extension("json.reset_backup");
        fs::copy(config_path, &backup_path)?;
        log::info!("Existing config backed up to {}", backup_path.display());
    }

    let default_config = Config::default();
    save_config_to(config_path, &default_config)?;

    log::info!("Configuration reset to defaults");
    Ok(default_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = load_config_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "upload_endpoint": "https://photos.example.com/api/upload" }"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.upload_endpoint, "https://photos.example.com/api/upload");
        assert_eq!(config.default_delay_ms, 1_000);
        assert_eq!(config.max_file_size_mb, 100);
    }

    #[test]
    fn test_unparseable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_rust_log_overrides_configured_level() {
        let config = Config {
            log_level: "debug".to_string(),
            ..Config::default()
        };

        assert_eq!(config.startup_log_level(None), Some(log::LevelFilter::Debug));
        assert_eq!(config.startup_log_level(Some("  ")), Some(log::LevelFilter::Debug));
        assert_eq!(config.startup_log_level(Some("warn")), None);

        let garbled = Config {
            log_level: "loud".to_string(),
            ..Config::default()
        };
        assert_eq!(garbled.startup_log_level(None), Some(log::LevelFilter::Info));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.upload_endpoint = "not a url".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.progress_chunk_kb = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_save_backs_up_and_reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.default_delay_ms = 500;
        save_config_to(&path, &config).unwrap();
        save_config_to(&path, &config).unwrap();
        assert!(path.with_extension("json.bak").exists());

        let reset = reset_config_at(&path).unwrap();
        assert_eq!(reset, Config::default());
        assert!(path.with_extension("json.reset_backup").exists());
        assert_eq!(load_config_from(&path).unwrap().default_delay_ms, 1_000);
    }
}
