use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Index mutations between automatic flushes.
    pub save_threshold: usize,
    /// Maximum Hamming distance for two perceptual hashes to match.
    pub similarity_threshold: u32,
    /// Pause after deletes and renames, for slow network filesystems.
    pub settle_delay_ms: u64,
    /// Side of the gradient hash grid.
    pub hash_size: u32,
    /// File names deleted on sight (compared case-insensitively).
    pub junk_files: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_threshold: 10,
            similarity_threshold: 3,
            settle_delay_ms: 100,
            hash_size: 10,
            junk_files: vec![".picasa.ini".to_string(), "desktop.ini".to_string()],
        }
    }
}

impl Config {
    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn is_junk(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.junk_files.iter().any(|junk| junk.to_lowercase() == lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.save_threshold, 10);
        assert_eq!(config.similarity_threshold, 3);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "settle_delay_ms": 0, "save_threshold": 25 }"#).unwrap();

        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.save_threshold, 25);
        assert_eq!(config.hash_size, 10);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Config::load_or_default(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_junk_names_ignore_case() {
        let config = Config::default();
        assert!(config.is_junk("Desktop.ini"));
        assert!(config.is_junk(".picasa.ini"));
        assert!(!config.is_junk("IMG001.JPG"));
    }
}
