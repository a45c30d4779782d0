// Startup consistency pass over the index and the archive tree:
// - fill gaps between the path and fingerprint mappings
// - forget records whose file is gone
// - index archived files the store does not know about

use crate::core::loader::{is_loadable, Loader};
use crate::services::sorter::{is_hidden, SortError, Sorter};
use walkdir::WalkDir;

impl<L: Loader> Sorter<L> {
    /// Bring the index back in line with itself and with the archive.
    /// Runs automatically when a sorter is opened; a second run on a
    /// consistent archive changes nothing.
    pub fn audit(&mut self) -> Result<(), SortError> {
        log::info!("Verifying database consistency");

        for fingerprint in self.store.all_fingerprints()? {
            let Some(record) = self.store.get_by_fingerprint(&fingerprint)? else {
                continue;
            };
            if self.store.get_by_path(record.path())?.is_none() {
                log::warn!("Missing in path index {}", record);
                self.store.add(&record)?;
                self.summary.repaired += 1;
            }
        }

        for path in self.store.all_paths()? {
            let Some(record) = self.store.get_by_path(&path)? else {
                continue;
            };
            if self.store.get_by_fingerprint(&record.fingerprint)?.is_none() {
                log::warn!("Missing in fingerprint index {}", record);
                self.store.add(&record)?;
                self.summary.repaired += 1;
            }
        }

        for record in self.store.all_records()? {
            if !record.path().exists() {
                log::warn!("Deleting missing {}", record);
                self.store.remove(&record)?;
                self.summary.repaired += 1;
            }
        }

        self.index_untracked()?;
        self.store.flush(true)?;
        Ok(())
    }

    fn index_untracked(&mut self) -> Result<(), SortError> {
        let root = self.archive_root.clone();
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));

        for entry in walker {
            let entry = entry?;
            let path = entry.path();
            // earlier reloads may have evicted files this walk already listed
            if !entry.file_type().is_file() || !is_loadable(path) || !path.exists() {
                continue;
            }
            if self.store.get_by_path(path)?.is_none() {
                log::warn!("Found unindexed file {}", path.display());
                self.reload(path)?;
                self.summary.reindexed += 1;
            }
        }
        Ok(())
    }
}
