use crate::config::{Config, ConfigError};
use crate::core::hash::{HashError, HashService};
use crate::core::loader::{is_image, is_loadable, LoadError, Loader};
use crate::core::record::Record;
use crate::database::{self, IndexError, IndexStore, INDEX_FILE_NAME, TRASH_DIR_NAME};
use crate::services::placement::{PlacementError, PlacementService};
use crate::services::resolver::{choose_better, Choice, DuplicateResolver, ResolveError};
use chrono::{NaiveDate, NaiveDateTime};
use indicatif::ProgressBar;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SortError {
    #[error("{path} does not exist or is not a directory")]
    DestinationMissing { path: String },

    #[error("{path} does not exist!")]
    SourceMissing { path: String },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("Hash computation error: {0}")]
    Hash(#[from] HashError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ResolveError> for SortError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Index(e) => SortError::Index(e),
            ResolveError::Load(e) => SortError::Load(e),
        }
    }
}

/// Counters for one sorter's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SortSummary {
    pub placed: usize,
    pub deleted: usize,
    pub recycled: usize,
    pub skipped: usize,
    pub junk_removed: usize,
    pub dirs_removed: usize,
    pub reindexed: usize,
    pub repaired: usize,
}

impl fmt::Display for SortSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} placed, {} deleted, {} recycled, {} skipped, {} junk removed, {} empty dirs removed, {} reindexed, {} index repairs",
            self.placed,
            self.deleted,
            self.recycled,
            self.skipped,
            self.junk_removed,
            self.dirs_removed,
            self.reindexed,
            self.repaired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    Archive,
    Trash,
}

/// Losers dated before this are assumed to have a wrong camera clock.
fn oldest_trusted_timestamp() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1980, 2, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Moves media from source trees into the archive, resolving duplicates
/// against the index as it goes.
pub struct Sorter<L: Loader> {
    pub(crate) archive_root: PathBuf,
    trash_dir: PathBuf,
    pub(crate) store: IndexStore,
    loader: L,
    config: Config,
    resolver: DuplicateResolver,
    placement: PlacementService,
    hash_service: HashService,
    progress: ProgressBar,
    pub(crate) summary: SortSummary,
}

impl<L: Loader> Sorter<L> {
    /// Open the archive at `archive_root` and run the consistency audit.
    pub fn open(archive_root: &Path, loader: L, config: Config) -> Result<Self, SortError> {
        if !archive_root.is_dir() {
            return Err(SortError::DestinationMissing {
                path: archive_root.display().to_string(),
            });
        }
        let data_dir = database::data_dir(archive_root)?;
        let trash_dir = data_dir.join(TRASH_DIR_NAME);
        fs::create_dir_all(&trash_dir)?;
        let store = IndexStore::open(&data_dir.join(INDEX_FILE_NAME), config.save_threshold)?;

        let mut sorter = Self {
            archive_root: archive_root.to_path_buf(),
            trash_dir,
            store,
            loader,
            resolver: DuplicateResolver::new(config.similarity_threshold),
            placement: PlacementService::new(config.settle_delay()),
            hash_service: HashService::new(),
            progress: ProgressBar::hidden(),
            summary: SortSummary::default(),
            config,
        };
        sorter.audit()?;
        Ok(sorter)
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn trash_dir(&self) -> &Path {
        &self.trash_dir
    }

    pub fn summary(&self) -> SortSummary {
        self.summary
    }

    /// Sort everything under `source` into the archive. Emptied
    /// subdirectories are removed; `source` itself is kept.
    pub fn sort_dir(&mut self, source: &Path) -> Result<(), SortError> {
        if !source.is_dir() {
            return Err(SortError::SourceMissing {
                path: source.display().to_string(),
            });
        }
        self.walk(source, source)?;
        self.store.flush(true)?;
        Ok(())
    }

    fn walk(&mut self, dir: &Path, root: &Path) -> Result<(), SortError> {
        log::info!("Processing DIR {}", dir.display());
        for path in sorted_entries(dir)? {
            if path.is_dir() {
                if !is_hidden(&path) {
                    self.walk(&path, root)?;
                }
            } else if path.is_file() {
                if is_loadable(&path) {
                    self.sort_file(&path)?;
                } else if file_name(&path).is_some_and(|name| self.config.is_junk(&name)) {
                    log::info!("Deleting junk file {}", path.display());
                    self.placement.delete_file(&path)?;
                    self.summary.junk_removed += 1;
                }
            }
        }

        if dir != root && fs::read_dir(dir)?.next().is_none() {
            log::info!("Deleting empty directory {}", dir.display());
            self.placement.remove_dir(dir)?;
            self.summary.dirs_removed += 1;
        }
        self.store.flush(false)?;
        Ok(())
    }

    pub fn sort_file(&mut self, path: &Path) -> Result<(), SortError> {
        log::info!("Processing FILE {}", path.display());
        self.progress.set_message(path.display().to_string());
        self.progress.inc(1);

        let incoming = match self.loader.load(path) {
            Ok(record) => record,
            Err(LoadError::UnsupportedFormat { path }) => {
                log::warn!("Skipping unsupported file {}", path);
                self.summary.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        // a source inside the archive was indexed in place by the audit
        if let Some(own) = self.store.get_by_path(path)? {
            self.store.remove(&own)?;
        }

        match self.resolver.find_existing(&self.store, &incoming.fingerprint)? {
            None => self.move_to_sorted(incoming),
            Some(existing) => {
                log::info!("Found match for incoming {}", incoming);
                log::info!("  With existing {}", existing);
                self.keep_better(existing, incoming)
            }
        }
    }

    fn move_to_sorted(&mut self, record: Record) -> Result<(), SortError> {
        self.sort_to(Destination::Archive, record)
    }

    fn sort_to(&mut self, destination: Destination, mut record: Record) -> Result<(), SortError> {
        let root = match destination {
            Destination::Archive => self.archive_root.clone(),
            Destination::Trash => self.trash_dir.clone(),
        };
        if destination == Destination::Archive && self.placement.is_canonical(&root, &record) {
            log::debug!("{} is already in place", record.path().display());
            self.store.add(&record)?;
            return Ok(());
        }
        let mut target = self.placement.primary_target(&root, &record)?;

        if target.exists() {
            if destination == Destination::Archive && is_image(record.path()) {
                log::info!(
                    "{} already exists! Checking for rotated images...",
                    target.display()
                );
                if let Some(existing) = self
                    .resolver
                    .find_rotated(&self.store, &self.loader, &record)?
                    .filter(|existing| existing.identifier != record.identifier)
                {
                    log::info!("Rotated version of {}", record);
                    log::info!("  Matches existing {}", existing);
                    return self.keep_better(existing, record);
                }
            }
            target = self.placement.free_slot(&root, &record)?;
        }

        log::info!("Moving {} to {}", record.path().display(), target.display());
        self.placement.move_file(record.path(), &target)?;
        record.identifier = target;

        match destination {
            Destination::Archive => {
                self.store.add(&record)?;
                self.summary.placed += 1;
            }
            Destination::Trash => self.summary.recycled += 1,
        }
        Ok(())
    }

    /// Remove a losing duplicate from the archive flow. Byte-identical
    /// copies of `survivor` are deleted, anything else goes to the trash.
    pub(crate) fn evict(&mut self, loser: Record, survivor: &Path) -> Result<(), SortError> {
        if !loser.path().exists() {
            log::warn!("Nothing to evict, {} is already gone", loser.path().display());
            return Ok(());
        }
        if loser.path() == survivor {
            log::warn!("Refusing to evict {} in favour of itself", loser);
            return Ok(());
        }
        if survivor.exists()
            && self
                .hash_service
                .verify_identical_content(loser.path(), survivor)?
        {
            log::info!("Deleting {}", loser);
            log::info!("  Identical to {}", survivor.display());
            self.placement.delete_file(loser.path())?;
            self.summary.deleted += 1;
            return Ok(());
        }
        log::debug!("Recycling {}", loser);
        self.sort_to(Destination::Trash, loser)
    }

    fn keep_better(&mut self, existing: Record, incoming: Record) -> Result<(), SortError> {
        match choose_better(&existing, &incoming) {
            Choice::First => self.keep_existing(existing, incoming),
            Choice::Second => self.keep_incoming(existing, incoming),
        }
    }

    fn keep_existing(&mut self, existing: Record, incoming: Record) -> Result<(), SortError> {
        log::info!("Keeping existing {}", existing);
        log::info!("  Evicting incoming {}", incoming);
        if should_transplant(&incoming, &existing) {
            log::info!("  But preserving incoming's exif {}", incoming);
            self.transplant(&incoming, &existing);
            self.reload(existing.path())?;
        }
        self.evict(incoming, existing.path())
    }

    fn keep_incoming(&mut self, existing: Record, mut incoming: Record) -> Result<(), SortError> {
        log::info!("Evicting existing {}", existing);
        log::info!("  Keeping incoming {}", incoming);
        if should_transplant(&existing, &incoming) {
            log::info!("  But preserving existing's exif {}", existing);
            self.transplant(&existing, &incoming);
            incoming = self.loader.load(incoming.path())?;
        }
        self.store.remove(&existing)?;
        self.evict(existing, incoming.path())?;
        self.move_to_sorted(incoming)
    }

    fn transplant(&self, from: &Record, to: &Record) {
        if let Err(e) = self.loader.transplant_metadata(from.path(), to.path()) {
            log::warn!("Failed to transplant exif: {}", e);
        }
    }

    /// Re-fingerprint a file already inside the archive and index it,
    /// resolving a clash with another archived copy.
    pub(crate) fn reload(&mut self, path: &Path) -> Result<(), SortError> {
        log::info!("Reloading {}", path.display());
        let reloaded = self.loader.load(path)?;

        if let Some(stale) = self.store.get_by_path(path)? {
            if stale.fingerprint != reloaded.fingerprint {
                self.store.remove(&stale)?;
            }
        }

        if let Some(existing) = self.store.get_by_fingerprint(&reloaded.fingerprint)? {
            if existing.identifier != reloaded.identifier {
                log::warn!("Reloaded {}", reloaded);
                log::warn!("  Matches existing {}", existing);
                match choose_better(&reloaded, &existing) {
                    Choice::First => {
                        self.store.remove(&existing)?;
                        self.evict(existing, path)?;
                    }
                    Choice::Second => {
                        let survivor = existing.identifier;
                        return self.evict(reloaded, &survivor);
                    }
                }
            }
        }
        self.store.add(&reloaded)?;
        Ok(())
    }
}

/// A JPEG loser with an older, plausible date donates its metadata to a
/// JPEG winner.
fn should_transplant(loser: &Record, winner: &Record) -> bool {
    loser.is_jpg()
        && winner.is_jpg()
        && oldest_trusted_timestamp().is_some_and(|floor| loser.timestamp > floor)
        && loser.timestamp < winner.timestamp
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    file_name(path).is_some_and(|name| name.starts_with('.'))
}
