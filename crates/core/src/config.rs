//! Engine configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! or missing file yields a working setup.

use std::path::{Path, PathBuf};

use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// SQLite file; defaults to the platform data directory
    pub database_path: Option<PathBuf>,
    /// Lifetime of a room when the creator does not choose one
    pub default_room_minutes: i64,
    /// Store-side code draws before giving up
    pub code_attempts: u32,
    /// Change-feed buffer per subscriber before it lags
    pub feed_capacity: usize,
    /// Re-tally attempts when votes arrive while results are being written
    pub finalize_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            default_room_minutes: 30,
            code_attempts: 16,
            feed_capacity: 256,
            finalize_attempts: 8,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file. A missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config = Self::parse(&raw)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.code_attempts == 0 {
            return Err(Error::Config("code_attempts must be at least 1".into()));
        }
        if self.feed_capacity == 0 {
            return Err(Error::Config("feed_capacity must be at least 1".into()));
        }
        if self.default_room_minutes <= 0 {
            return Err(Error::Config("default_room_minutes must be positive".into()));
        }
        if self.finalize_attempts == 0 {
            return Err(Error::Config("finalize_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn default_room_duration(&self) -> Duration {
        Duration::minutes(self.default_room_minutes)
    }

    /// Resolve the database file location
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }

        let dirs = ProjectDirs::from("dev", "onyx", "verdict").ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine data directory",
            ))
        })?;
        Ok(dirs.data_dir().join("verdict.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verdict.toml");
        std::fs::write(&path, "code_attempts = 4\nfeed_capacity = 32\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.code_attempts, 4);
        assert_eq!(config.feed_capacity, 32);
        assert_eq!(config.default_room_minutes, 30);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::parse("finalize_attempts = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::parse("code_attempts = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::parse("feed_capacity = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::parse("code_attempts = \"many\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_code_length_is_not_configurable() {
        assert!(matches!(
            EngineConfig::parse("code_length = 4"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_explicit_database_path() {
        let config = EngineConfig::parse("database_path = \"/tmp/rooms.db\"").unwrap();
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/rooms.db")
        );
    }
}
