use super::IndexError;
use crate::core::record::{path_key, Fingerprint, Record};
use sled::transaction::TransactionResult;
use sled::{Db, Transactional, Tree};
use std::path::{Path, PathBuf};

const BY_PATH: &str = "by_path";
const BY_FINGERPRINT: &str = "by_fingerprint";

/// Dual-keyed persistent index: path -> record and fingerprint -> record.
///
/// Writes land in sled immediately but only become durable on
/// [`IndexStore::flush`], which runs automatically every
/// `save_threshold` mutations.
pub struct IndexStore {
    db: Db,
    by_path: Tree,
    by_fingerprint: Tree,
    save_threshold: usize,
    mod_count: usize,
}

impl IndexStore {
    pub fn open(path: &Path, save_threshold: usize) -> Result<Self, IndexError> {
        let db = sled::Config::new()
            .path(path)
            .flush_every_ms(None)
            .open()?;
        let by_path = db.open_tree(BY_PATH)?;
        let by_fingerprint = db.open_tree(BY_FINGERPRINT)?;

        Ok(Self {
            db,
            by_path,
            by_fingerprint,
            save_threshold: save_threshold.max(1),
            mod_count: 0,
        })
    }

    pub fn get_by_path(&self, path: &Path) -> Result<Option<Record>, IndexError> {
        decode(self.by_path.get(path_key(path))?)
    }

    pub fn get_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Record>, IndexError> {
        decode(self.by_fingerprint.get(fingerprint.key())?)
    }

    /// Upsert under the record's current path and fingerprint.
    pub fn add(&mut self, record: &Record) -> Result<(), IndexError> {
        let value = serde_json::to_vec(record)?;
        let path_key = record.path_key();
        let fingerprint_key = record.fingerprint.key();

        let result: TransactionResult<(), sled::Error> = (&self.by_path, &self.by_fingerprint)
            .transaction(|(paths, fingerprints)| {
                paths.insert(path_key.as_bytes(), value.as_slice())?;
                fingerprints.insert(fingerprint_key.as_bytes(), value.as_slice())?;
                Ok(())
            });
        result?;

        log::debug!("Added {}", record);
        self.modified()
    }

    /// Drop the record from both mappings. Missing keys are ignored, and a
    /// fingerprint entry that now belongs to another path is left alone.
    pub fn remove(&mut self, record: &Record) -> Result<(), IndexError> {
        let path_key = record.path_key();
        let fingerprint_key = record.fingerprint.key();

        let result: TransactionResult<(), sled::Error> = (&self.by_path, &self.by_fingerprint)
            .transaction(|(paths, fingerprints)| {
                paths.remove(path_key.as_bytes())?;
                let owned = fingerprints
                    .get(fingerprint_key.as_bytes())?
                    .is_some_and(|value| owned_by(&value, &record.identifier));
                if owned {
                    fingerprints.remove(fingerprint_key.as_bytes())?;
                }
                Ok(())
            });
        result?;

        log::debug!("Removed {}", record);
        self.modified()
    }

    /// Snapshot of every record in path order.
    pub fn all_records(&self) -> Result<Vec<Record>, IndexError> {
        self.by_path
            .iter()
            .values()
            .map(|value| -> Result<Record, IndexError> { Ok(serde_json::from_slice(&value?)?) })
            .collect()
    }

    pub fn all_paths(&self) -> Result<Vec<PathBuf>, IndexError> {
        self.by_path
            .iter()
            .keys()
            .map(|key| -> Result<PathBuf, IndexError> {
                Ok(PathBuf::from(String::from_utf8_lossy(&key?).into_owned()))
            })
            .collect()
    }

    pub fn all_fingerprints(&self) -> Result<Vec<Fingerprint>, IndexError> {
        self.by_fingerprint
            .iter()
            .values()
            .map(|value| -> Result<Fingerprint, IndexError> {
                let record: Record = serde_json::from_slice(&value?)?;
                Ok(record.fingerprint)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Mutations not yet made durable.
    pub fn pending(&self) -> usize {
        self.mod_count
    }

    /// Persist pending mutations. Without `force` this is a no-op when
    /// nothing changed.
    pub fn flush(&mut self, force: bool) -> Result<(), IndexError> {
        if self.mod_count > 0 || force {
            self.db.flush()?;
            log::debug!("Flushed {} index mutation(s)", self.mod_count);
            self.mod_count = 0;
        }
        Ok(())
    }

    fn modified(&mut self) -> Result<(), IndexError> {
        self.mod_count += 1;
        if self.mod_count >= self.save_threshold {
            self.flush(false)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn drop_fingerprint_entry(&self, fingerprint: &Fingerprint) {
        self.by_fingerprint.remove(fingerprint.key()).unwrap();
    }

    #[cfg(test)]
    pub(crate) fn drop_path_entry(&self, path: &Path) {
        self.by_path.remove(path_key(path)).unwrap();
    }
}

/// Unreadable entries count as owned so they get cleared.
fn owned_by(value: &[u8], identifier: &Path) -> bool {
    serde_json::from_slice::<Record>(value)
        .map(|stored| stored.identifier == identifier)
        .unwrap_or(true)
}

fn decode(value: Option<sled::IVec>) -> Result<Option<Record>, IndexError> {
    value
        .map(|bytes| serde_json::from_slice(&bytes))
        .transpose()
        .map_err(IndexError::from)
}
