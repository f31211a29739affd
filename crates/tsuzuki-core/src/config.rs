use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tsuzuki_detect::SelectorConfig;

use crate::error::TsuzukiError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
///
/// Every section falls back to its own defaults when missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub resume: ResumeConfig,
    #[serde(default)]
    pub save: SaveConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub mutation_debounce_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay_ms: 1000,
            mutation_debounce_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub detect_debounce_ms: u64,
    pub resume_debounce_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            detect_debounce_ms: 500,
            resume_debounce_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeConfig {
    pub initial_delay_ms: u64,
    pub embedded_delay_ms: u64,
    pub metadata_debounce_ms: u64,
    pub min_seconds: f64,
    pub max_percent: f64,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            embedded_delay_ms: 3000,
            metadata_debounce_ms: 500,
            min_seconds: 30.0,
            max_percent: 95.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub interval_ms: u64,
    pub timeupdate_threshold_ms: u64,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            timeupdate_threshold_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_age_days: u32,
    pub completed_percent: f64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            completed_percent: 95.0,
        }
    }
}

impl AppConfig {
    /// Load config: user file (if exists) over the built-in defaults.
    pub fn load() -> Result<Self, TsuzukiError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            Self::load_from(&user_path)
        } else {
            Self::from_toml(DEFAULT_CONFIG)
        }
    }

    /// Load a specific config file. Missing sections and keys keep their
    /// defaults.
    pub fn load_from(path: &Path) -> Result<Self, TsuzukiError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| TsuzukiError::Config(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, TsuzukiError> {
        toml::from_str(content).map_err(|e| TsuzukiError::Config(e.to_string()))
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), TsuzukiError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, TsuzukiError> {
        toml::to_string_pretty(self).map_err(|e| TsuzukiError::Config(e.to_string()))
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the user's source overrides, next to the config file.
    pub fn sources_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("sources.toml"))
            .unwrap_or_else(|| PathBuf::from("sources.toml"))
    }

    /// Path to the progress database.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("tsuzuki.db"))
            .unwrap_or_else(|| PathBuf::from("tsuzuki.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, TsuzukiError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "tsuzuki")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.detection.max_attempts, 10);
        assert_eq!(config.navigation.detect_debounce_ms, 500);
        assert_eq!(config.resume.embedded_delay_ms, 3000);
        assert_eq!(config.save.interval_ms, 5000);
        assert_eq!(config.retention.max_age_days, 30);
        assert_eq!(config.selector.playback_roots.len(), 7);
    }

    #[test]
    fn test_embedded_file_matches_section_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.detection.retry_delay_ms, DetectionConfig::default().retry_delay_ms);
        assert_eq!(config.resume.min_seconds, ResumeConfig::default().min_seconds);
        assert_eq!(
            config.retention.completed_percent,
            RetentionConfig::default().completed_percent
        );
        assert_eq!(
            config.selector.area_threshold,
            SelectorConfig::default().area_threshold
        );
    }

    #[test]
    fn test_partial_user_file() {
        let config = AppConfig::from_toml("[detection]\nmax_attempts = 3\n").unwrap();
        assert_eq!(config.detection.max_attempts, 3);
        assert_eq!(config.detection.retry_delay_ms, 1000);
        assert_eq!(config.save.timeupdate_threshold_ms, 5000);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[detection\n").unwrap_err();
        assert!(matches!(err, TsuzukiError::Config(_)));
    }

    #[test]
    fn test_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.detection.max_attempts, config.detection.max_attempts);
        assert_eq!(deserialized.selector.first_party_hosts, config.selector.first_party_hosts);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retention]\nmax_age_days = 7\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.retention.max_age_days, 7);
    }
}
