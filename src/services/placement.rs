use crate::core::record::Record;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Highest collision suffix tried before giving up.
pub const MAX_DISAMBIGUATOR: u32 = 99;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No free name for {path} after {attempts} attempts")]
    Exhausted { path: String, attempts: u32 },
}

/// Computes canonical `YYYY/MM/YYYYMMDD-HHMMSS-N.ext` destinations and
/// performs the filesystem mutations, pausing after each one.
pub struct PlacementService {
    settle_delay: Duration,
}

impl PlacementService {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    pub fn canonical_path(root: &Path, record: &Record, disambiguator: u32) -> PathBuf {
        let ts = record.timestamp;
        let name = format!(
            "{}-{}.{}",
            ts.format("%Y%m%d-%H%M%S"),
            disambiguator,
            record.extension()
        );
        root.join(ts.format("%Y").to_string())
            .join(ts.format("%m").to_string())
            .join(name)
    }

    /// True when the record already sits at one of its own canonical names.
    pub fn is_canonical(&self, root: &Path, record: &Record) -> bool {
        (0..=MAX_DISAMBIGUATOR).any(|n| Self::canonical_path(root, record, n) == record.path())
    }

    /// The `-0` destination, with its year/month directories created.
    pub fn primary_target(&self, root: &Path, record: &Record) -> Result<PathBuf, PlacementError> {
        let target = Self::canonical_path(root, record, 0);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(target)
    }

    /// First unused `-1` .. `-99` destination.
    pub fn free_slot(&self, root: &Path, record: &Record) -> Result<PathBuf, PlacementError> {
        (1..=MAX_DISAMBIGUATOR)
            .map(|n| Self::canonical_path(root, record, n))
            .find(|candidate| !candidate.exists())
            .ok_or_else(|| PlacementError::Exhausted {
                path: record.path().display().to_string(),
                attempts: MAX_DISAMBIGUATOR,
            })
    }

    pub fn move_file(&self, from: &Path, to: &Path) -> Result<(), PlacementError> {
        fs::rename(from, to)?;
        self.settle();
        Ok(())
    }

    pub fn delete_file(&self, path: &Path) -> Result<(), PlacementError> {
        fs::remove_file(path)?;
        self.settle();
        Ok(())
    }

    pub fn remove_dir(&self, path: &Path) -> Result<(), PlacementError> {
        fs::remove_dir(path)?;
        self.settle();
        Ok(())
    }

    fn settle(&self) {
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
    }
}
