// Duplicate detection and best-copy selection:
// - exact fingerprint lookup
// - near-duplicate scan by Hamming distance (perceptual only)
// - rotation-aware lookup for images
// - deterministic "keep the better copy" ordering

use crate::core::loader::{LoadError, Loader};
use crate::core::record::{Fingerprint, Record};
use crate::database::{IndexError, IndexStore};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),
}

/// Which side of a comparison should survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    First,
    Second,
}

/// Pick the copy worth keeping. Equal pixel counts defer to an HDR flag;
/// every remaining tie goes to `a`.
pub fn choose_better(a: &Record, b: &Record) -> Choice {
    let (pixels_a, pixels_b) = (a.pixels(), b.pixels());
    let (hdr_a, hdr_b) = (a.is_hdr(), b.is_hdr());

    if pixels_a == pixels_b && (hdr_a || hdr_b) {
        if hdr_a { Choice::First } else { Choice::Second }
    } else if pixels_a >= pixels_b {
        Choice::First
    } else {
        Choice::Second
    }
}

pub struct DuplicateResolver {
    similarity_threshold: u32,
}

impl DuplicateResolver {
    pub fn new(similarity_threshold: u32) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Exact match first, then the near-duplicate scan for perceptual
    /// fingerprints.
    pub fn find_existing(
        &self,
        store: &IndexStore,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Record>, IndexError> {
        if let Some(exact) = store.get_by_fingerprint(fingerprint)? {
            return Ok(Some(exact));
        }
        if fingerprint.is_perceptual() {
            return self.find_similar(store, fingerprint);
        }
        Ok(None)
    }

    /// First indexed perceptual record (in path order) within the
    /// similarity threshold. Not necessarily the closest one.
    pub fn find_similar(
        &self,
        store: &IndexStore,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Record>, IndexError> {
        let Some(incoming) = fingerprint.as_perceptual() else {
            return Ok(None);
        };
        let found = store.all_records()?.into_iter().find(|record| {
            record
                .fingerprint
                .as_perceptual()
                .and_then(|existing| existing.distance(incoming))
                .is_some_and(|dist| dist <= self.similarity_threshold)
        });
        Ok(found)
    }

    /// Turn the image up to three quarter turns looking for an archived
    /// match.
    pub fn find_rotated<L: Loader + ?Sized>(
        &self,
        store: &IndexStore,
        loader: &L,
        record: &Record,
    ) -> Result<Option<Record>, ResolveError> {
        if !record.fingerprint.is_perceptual() {
            return Ok(None);
        }
        for (turn, fingerprint) in loader
            .rotated_fingerprints(record.path())?
            .iter()
            .take(3)
            .enumerate()
        {
            if let Some(existing) = self.find_existing(store, fingerprint)? {
                log::debug!("Rotation {} of {} matched", (turn + 1) * 90, record.path().display());
                return Ok(Some(existing));
            }
        }
        Ok(None)
    }
}

impl Default for DuplicateResolver {
    fn default() -> Self {
        Self::new(3)
    }
}
