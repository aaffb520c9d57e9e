use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, StageError};
use crate::host::HostFlavor;
use crate::resolver::DEFAULT_FOLDER_TITLE;

pub const MIN_MAINTENANCE_MINUTES: u64 = 60;
pub const MAX_MAINTENANCE_MINUTES: u64 = 1440;
/// One year.
pub const MAX_TTL_HOURS: u64 = 8760;

/// Settings file, every field optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Where the stage and metadata are persisted.
    pub data_dir: PathBuf,

    /// Chromium profile `Bookmarks` file acting as the live tree.
    pub bookmarks_file: Option<PathBuf>,

    pub host_flavor: HostFlavor,

    /// Container id new folders are created under, overriding the flavor default.
    pub default_parent: Option<String>,

    pub folder_title: String,

    pub ttl_hours: u64,

    pub maintenance_interval_minutes: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bookmarks_file: None,
            host_flavor: HostFlavor::default(),
            default_parent: None,
            folder_title: DEFAULT_FOLDER_TITLE.to_string(),
            ttl_hours: 24,
            maintenance_interval_minutes: MAX_MAINTENANCE_MINUTES,
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bookmark-stage")
}

impl StageConfig {
    /// Read `path` if it exists; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| StageError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TTL_HOURS).contains(&self.ttl_hours) {
            return Err(StageError::Config(format!(
                "ttl_hours must be within 1..={} (got {})",
                MAX_TTL_HOURS, self.ttl_hours
            )));
        }

        if self.folder_title.trim().is_empty() {
            return Err(StageError::Config("folder_title must not be empty".into()));
        }

        if !(MIN_MAINTENANCE_MINUTES..=MAX_MAINTENANCE_MINUTES)
            .contains(&self.maintenance_interval_minutes)
        {
            return Err(StageError::Config(format!(
                "maintenance_interval_minutes must be within {}..={} (got {})",
                MIN_MAINTENANCE_MINUTES, MAX_MAINTENANCE_MINUTES, self.maintenance_interval_minutes
            )));
        }

        if self.bookmarks_file.is_some() && self.host_flavor == HostFlavor::Firefox {
            warn!("⚠️  bookmarks_file is a Chromium profile file but host_flavor is firefox");
        }

        Ok(())
    }

    /// Clamped to [`MAX_TTL_HOURS`] so an unvalidated config cannot overflow.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours.min(MAX_TTL_HOURS) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StageConfig::default();
        config.validate().unwrap();
        assert_eq!(config.folder_title, "Imported Bookmarks");
        assert_eq!(config.ttl(), chrono::Duration::hours(24));
        assert!(config.data_dir.ends_with("bookmark-stage"));
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, StageConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"host_flavor": "firefox", "ttl_hours": 6}"#).unwrap();

        let config = StageConfig::load(&path).unwrap();
        assert_eq!(config.host_flavor, HostFlavor::Firefox);
        assert_eq!(config.ttl_hours, 6);
        assert_eq!(config.maintenance_interval_minutes, 1440);
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "ttl_hours = 6").unwrap();
        assert!(matches!(StageConfig::load(&path).unwrap_err(), StageError::Config(_)));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = StageConfig::default();
        config.ttl_hours = 0;
        assert!(config.validate().is_err());

        for hours in [MAX_TTL_HOURS + 1, u64::MAX / 2, u64::MAX] {
            let mut config = StageConfig::default();
            config.ttl_hours = hours;
            assert!(config.validate().is_err(), "{} hours accepted", hours);
            assert_eq!(config.ttl(), chrono::Duration::hours(MAX_TTL_HOURS as i64));
        }

        let mut config = StageConfig::default();
        config.folder_title = "  ".into();
        assert!(config.validate().is_err());

        for minutes in [0, 59, 1441] {
            let mut config = StageConfig::default();
            config.maintenance_interval_minutes = minutes;
            assert!(config.validate().is_err(), "{} minutes accepted", minutes);
        }
    }
}
