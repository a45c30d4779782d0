//! Test doubles for the sorting services. Each "media file" is a small
//! JSON document describing the record the loader should produce, so
//! scenarios can be written without real images.

use crate::config::Config;
use crate::core::exif::ExifError;
use crate::core::hash::HashService;
use crate::core::loader::{is_image, is_loadable, LoadError, Loader};
use crate::core::record::{Dimensions, Fingerprint, PerceptualHash, Record, Tags};
use crate::core::record::fixtures::timestamp;
use crate::services::sorter::Sorter;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stub {
    pub fp: Vec<u8>,
    pub ts: NaiveDateTime,
    pub w: u32,
    pub h: u32,
    #[serde(default)]
    pub hdr: bool,
    #[serde(default)]
    pub turns: Vec<Vec<u8>>,
    /// Donor has no metadata block, so transplants from it fail.
    #[serde(default)]
    pub bare: bool,
}

pub fn stub(fp: &[u8], (year, month, day): (i32, u32, u32), w: u32, h: u32) -> Stub {
    Stub {
        fp: fp.to_vec(),
        ts: timestamp(year, month, day),
        w,
        h,
        hdr: false,
        turns: Vec::new(),
        bare: false,
    }
}

pub fn write_stub(path: &Path, stub: &Stub) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, serde_json::to_vec(stub).unwrap()).unwrap();
}

fn read_stub(path: &Path) -> Result<Stub, LoadError> {
    let raw = fs::read(path)?;
    serde_json::from_slice(&raw).map_err(|_| LoadError::UnsupportedFormat {
        path: path.display().to_string(),
    })
}

/// Loader that reads [`Stub`] documents. Images get the stub's perceptual
/// hash, everything else a BLAKE3 digest of the file. Metadata transplant
/// copies the donor's timestamp, or fails when the donor is `bare`.
pub struct StubLoader;

impl Loader for StubLoader {
    fn load(&self, path: &Path) -> Result<Record, LoadError> {
        if !is_loadable(path) {
            return Err(LoadError::UnsupportedFormat {
                path: path.display().to_string(),
            });
        }
        let stub = read_stub(path)?;
        let fingerprint = if is_image(path) {
            Fingerprint::Perceptual(PerceptualHash(stub.fp.clone()))
        } else {
            Fingerprint::Content(HashService::new().compute_content_hash(path)?)
        };
        let tags = stub.hdr.then(|| {
            let mut tags = Tags::new();
            tags.insert("EXIF:CustomRendered".to_string(), json!(3));
            tags
        });

        Ok(Record {
            identifier: path.to_path_buf(),
            content_size: fs::metadata(path)?.len(),
            fingerprint,
            timestamp: stub.ts,
            dimensions: Some(Dimensions::new(stub.w, stub.h)),
            tags,
        })
    }

    fn rotated_fingerprints(&self, path: &Path) -> Result<Vec<Fingerprint>, LoadError> {
        Ok(read_stub(path)?
            .turns
            .into_iter()
            .map(|bytes| Fingerprint::Perceptual(PerceptualHash(bytes)))
            .collect())
    }

    fn transplant_metadata(&self, from: &Path, to: &Path) -> Result<(), LoadError> {
        let donor = read_stub(from)?;
        if donor.bare {
            return Err(LoadError::Exif(ExifError::NoExif {
                path: from.display().to_string(),
            }));
        }
        let mut target = read_stub(to)?;
        target.ts = donor.ts;
        fs::write(to, serde_json::to_vec(&target).unwrap())?;
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        settle_delay_ms: 0,
        ..Config::default()
    }
}

pub fn open_sorter(archive: &Path) -> Sorter<StubLoader> {
    Sorter::open(archive, StubLoader, test_config()).unwrap()
}

/// Every file under `root` outside hidden directories, sorted.
pub fn archived_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
