use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Metadata tags keyed `Group:Name`, e.g. `EXIF:DateTimeOriginal`.
pub type Tags = BTreeMap<String, serde_json::Value>;

/// Sentinel used by both HDR markers.
const HDR_SENTINEL: u64 = 3;

/// Perceptual hash bits, comparable by Hamming distance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualHash(pub Vec<u8>);

impl PerceptualHash {
    /// Number of differing bits, or `None` when the hashes have different lengths.
    pub fn distance(&self, other: &PerceptualHash) -> Option<u32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum(),
        )
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Typed content fingerprint. Near-duplicate comparison only applies to
/// the perceptual kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Fingerprint {
    Perceptual(PerceptualHash),
    Content(String),
}

impl Fingerprint {
    pub fn is_perceptual(&self) -> bool {
        matches!(self, Fingerprint::Perceptual(_))
    }

    pub fn as_perceptual(&self) -> Option<&PerceptualHash> {
        match self {
            Fingerprint::Perceptual(hash) => Some(hash),
            Fingerprint::Content(_) => None,
        }
    }

    /// Index key for the fingerprint mapping.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Perceptual(hash) => write!(f, "dhash:{}", hash.to_hex()),
            Fingerprint::Content(digest) => write!(f, "blake3:{}", digest),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A single archived (or about to be archived) media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: PathBuf,
    pub content_size: u64,
    pub fingerprint: Fingerprint,
    pub timestamp: NaiveDateTime,
    pub dimensions: Option<Dimensions>,
    pub tags: Option<Tags>,
}

impl Record {
    pub fn path(&self) -> &Path {
        &self.identifier
    }

    /// Path index key.
    pub fn path_key(&self) -> String {
        path_key(&self.identifier)
    }

    /// Pixel count, zero when dimensions are unknown.
    pub fn pixels(&self) -> u64 {
        self.dimensions.map(|d| d.pixels()).unwrap_or(0)
    }

    pub fn tag(&self, key: &str) -> Option<&serde_json::Value> {
        self.tags.as_ref().and_then(|tags| tags.get(key))
    }

    pub fn is_hdr(&self) -> bool {
        ["MakerNotes:HDRImageType", "EXIF:CustomRendered"]
            .iter()
            .any(|key| self.tag(key).is_some_and(is_hdr_sentinel))
    }

    /// Lowercased extension with `jpeg` folded into `jpg`.
    pub fn extension(&self) -> String {
        normalized_extension(&self.identifier)
    }

    pub fn is_jpg(&self) -> bool {
        self.extension() == "jpg"
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self
            .dimensions
            .map(|d| format!("{}x{}", d.width, d.height))
            .unwrap_or_else(|| "?x?".to_string());
        write!(
            f,
            "{} {} {} {} {}",
            self.fingerprint,
            self.identifier.display(),
            self.content_size,
            dims,
            self.timestamp
        )
    }
}

pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn normalized_extension(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if ext == "jpeg" { "jpg".to_string() } else { ext }
}

fn is_hdr_sentinel(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Number(n) => n.as_u64() == Some(HDR_SENTINEL),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok() == Some(HDR_SENTINEL),
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::NaiveDate;

    pub fn timestamp(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    pub fn perceptual(bytes: &[u8]) -> Fingerprint {
        Fingerprint::Perceptual(PerceptualHash(bytes.to_vec()))
    }

    pub fn record(path: &str, fingerprint: Fingerprint, width: u32, height: u32) -> Record {
        Record {
            identifier: PathBuf::from(path),
            content_size: 1,
            fingerprint,
            timestamp: timestamp(2000, 1, 1),
            dimensions: Some(Dimensions::new(width, height)),
            tags: None,
        }
    }
}
