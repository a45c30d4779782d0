use crate::core::exif::{ExifError, ExifService};
use crate::core::hash::{HashError, HashService};
use crate::core::perceptual::PerceptualService;
use crate::core::record::{Dimensions, Fingerprint, Record, Tags};
use chrono::{DateTime, Local, NaiveDateTime};
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use thiserror::Error;

/// Extensions the sorter hands to a loader.
pub const LOADABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "mov", "avi", "mp4", "m4v", "wmv"];

/// Extensions fingerprinted perceptually.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Tags that may carry a capture or modification date, in lookup order.
/// [`MediaLoader`] only fills the `EXIF:` keys; the rest are honored when
/// a [`Loader`] with a richer tag source supplies them.
pub const DATE_KEYS: &[&str] = &[
    "EXIF:CreateDate",
    "EXIF:DateTimeOriginal",
    "EXIF:ModifyDate",
    "RIFF:DateTimeOriginal",
    "QuickTime:PreviewDate",
    "QuickTime:CreateDate",
    "QuickTime:ModifyDate",
    "QuickTime:TrackCreateDate",
    "QuickTime:TrackModifyDate",
    "QuickTime:MediaCreateDate",
    "QuickTime:MediaModifyDate",
    "XMP:DateCreated",
    "XMP:CreateDate",
    "XMP:ModifyDate",
];

// Only `EXIF:Pixel*Dimension` comes from kamadak-exif, and it cannot read
// video containers, so default-loaded videos have unknown dimensions.
const WIDTH_KEYS: &[&str] = &[
    "File:ImageWidth",
    "RIFF:ImageWidth",
    "QuickTime:ImageWidth",
    "EXIF:PixelXDimension",
];
const HEIGHT_KEYS: &[&str] = &[
    "File:ImageHeight",
    "RIFF:ImageHeight",
    "QuickTime:ImageHeight",
    "EXIF:PixelYDimension",
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Unsupported format: {path}")]
    UnsupportedFormat { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Hash computation error: {0}")]
    Hash(#[from] HashError),

    #[error("EXIF error: {0}")]
    Exif(#[from] ExifError),
}

/// Turns a media file into a [`Record`]. One instance lives for the whole
/// run and is handed to the sorter explicitly.
pub trait Loader {
    /// Fingerprint the file and extract its metadata.
    fn load(&self, path: &Path) -> Result<Record, LoadError>;

    /// Perceptual fingerprints of the image after one, two and three
    /// quarter turns.
    fn rotated_fingerprints(&self, path: &Path) -> Result<Vec<Fingerprint>, LoadError>;

    /// Copy the metadata block of `from` into `to`.
    fn transplant_metadata(&self, from: &Path, to: &Path) -> Result<(), LoadError>;
}

pub fn is_loadable(path: &Path) -> bool {
    has_extension(path, LOADABLE_EXTENSIONS)
}

pub fn is_image(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

/// Default loader: `image` + `image_hasher` for pictures, BLAKE3 for
/// everything else, `kamadak-exif` for tags.
pub struct MediaLoader {
    perceptual: PerceptualService,
    hash_service: HashService,
    exif_service: ExifService,
}

impl MediaLoader {
    pub fn new(hash_size: u32) -> Self {
        Self {
            perceptual: PerceptualService::new(hash_size),
            hash_service: HashService::new(),
            exif_service: ExifService::new(),
        }
    }

    fn load_image(&self, path: &Path) -> Result<Record, LoadError> {
        let image = image::open(path)?;
        let fingerprint = self.perceptual.fingerprint(&image);
        let dimensions = Some(Dimensions::new(image.width(), image.height()));
        self.build_record(path, fingerprint, |_| dimensions)
    }

    fn load_media(&self, path: &Path) -> Result<Record, LoadError> {
        let digest = self.hash_service.compute_content_hash(path)?;
        self.build_record(path, Fingerprint::Content(digest), dimensions_from_tags)
    }

    fn build_record(
        &self,
        path: &Path,
        fingerprint: Fingerprint,
        dimensions: impl FnOnce(Option<&Tags>) -> Option<Dimensions>,
    ) -> Result<Record, LoadError> {
        let tags = self.exif_service.extract_tags(path)?;
        if tags.is_none() {
            log::warn!("No exif info found in {}", path.display());
        }
        let metadata = fs::metadata(path)?;
        let timestamp = self.oldest_timestamp(tags.as_ref(), &metadata, path);

        Ok(Record {
            identifier: path.to_path_buf(),
            content_size: metadata.len(),
            fingerprint,
            timestamp,
            dimensions: dimensions(tags.as_ref()),
            tags,
        })
    }

    /// Oldest of the tag dates, the modification time and the creation time.
    pub fn oldest_timestamp(
        &self,
        tags: Option<&Tags>,
        metadata: &fs::Metadata,
        path: &Path,
    ) -> NaiveDateTime {
        let mut dates = Vec::new();
        if let Some(tags) = tags {
            for key in DATE_KEYS {
                let Some(raw) = tags.get(*key).and_then(|v| v.as_str()) else {
                    continue;
                };
                match self.exif_service.parse_exif_datetime(raw) {
                    Some(dt) => dates.push(dt),
                    None => log::warn!(
                        "Failed to parse exif {} value {:?} in {}",
                        key,
                        raw,
                        path.display()
                    ),
                }
            }
        }
        dates.extend(metadata.modified().ok().map(local_naive));
        dates.extend(metadata.created().ok().map(local_naive));

        dates
            .into_iter()
            .min()
            .unwrap_or_else(|| Local::now().naive_local())
    }
}

impl Default for MediaLoader {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Loader for MediaLoader {
    fn load(&self, path: &Path) -> Result<Record, LoadError> {
        if !is_loadable(path) {
            return Err(LoadError::UnsupportedFormat {
                path: path.display().to_string(),
            });
        }
        if is_image(path) {
            self.load_image(path)
        } else {
            self.load_media(path)
        }
    }

    fn rotated_fingerprints(&self, path: &Path) -> Result<Vec<Fingerprint>, LoadError> {
        if !is_image(path) {
            return Err(LoadError::UnsupportedFormat {
                path: path.display().to_string(),
            });
        }
        let image = image::open(path)?;
        Ok(self.perceptual.rotated_fingerprints(&image))
    }

    fn transplant_metadata(&self, from: &Path, to: &Path) -> Result<(), LoadError> {
        self.exif_service.transplant(from, to)?;
        Ok(())
    }
}

fn local_naive(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

fn dimensions_from_tags(tags: Option<&Tags>) -> Option<Dimensions> {
    let tags = tags?;
    let first = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| tags.get(*key).and_then(tag_as_u32))
    };
    Some(Dimensions::new(first(WIDTH_KEYS)?, first(HEIGHT_KEYS)?))
}

fn tag_as_u32(value: &serde_json::Value) -> Option<u32> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_image(path: &Path, width: u32, height: u32) {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x * 5 + y * 11) % 256) as u8;
            Rgb([intensity, 255 - intensity, intensity / 3])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_extension_sets() {
        assert!(is_loadable(Path::new("/a/IMG001.JPG")));
        assert!(is_loadable(Path::new("/a/clip.m4v")));
        assert!(!is_loadable(Path::new("/a/notes.txt")));
        assert!(!is_loadable(Path::new("/a/noext")));
        assert!(is_image(Path::new("/a/b.PNG")));
        assert!(is_image(Path::new("/a/b.jpeg")));
        assert!(!is_image(Path::new("/a/b.mov")));
    }

    #[test]
    fn test_unsupported_format() {
        let loader = MediaLoader::default();
        let result = loader.load(Path::new("/tmp/readme.txt"));
        assert!(matches!(result, Err(LoadError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_load_png_is_perceptual() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shot.png");
        create_test_image(&path, 120, 80);

        let record = MediaLoader::default().load(&path).unwrap();
        assert!(record.fingerprint.is_perceptual());
        assert_eq!(record.dimensions, Some(Dimensions::new(120, 80)));
        assert_eq!(record.content_size, fs::metadata(&path).unwrap().len());
        assert_eq!(record.identifier, path);
    }

    #[test]
    fn test_load_video_uses_content_hash() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mov");
        fs::write(&path, b"not really a movie").unwrap();

        let record = MediaLoader::default().load(&path).unwrap();
        assert_eq!(
            record.fingerprint,
            Fingerprint::Content(blake3::hash(b"not really a movie").to_hex().to_string())
        );
        assert_eq!(record.dimensions, None);
        assert!(record.tags.is_none());

        let modified = local_naive(fs::metadata(&path).unwrap().modified().unwrap());
        assert!(record.timestamp <= modified);
    }

    #[test]
    fn test_rotated_copy_matches_on_third_turn() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("original.png");
        let rotated = temp_dir.path().join("rotated.png");
        create_test_image(&original, 90, 60);
        image::open(&original).unwrap().rotate90().save(&rotated).unwrap();

        let loader = MediaLoader::default();
        let original_fp = loader.load(&original).unwrap().fingerprint;
        let turns = loader.rotated_fingerprints(&rotated).unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2], original_fp);
    }

    #[test]
    fn test_oldest_timestamp_prefers_oldest_tag_and_skips_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        fs::write(&path, b"x").unwrap();
        let metadata = fs::metadata(&path).unwrap();

        let mut tags = Tags::new();
        tags.insert("EXIF:DateTimeOriginal".into(), json!("2004:06:01 10:00:00"));
        tags.insert("EXIF:CreateDate".into(), json!("2001:02:03 04:05:06\0"));
        tags.insert("XMP:CreateDate".into(), json!("garbage"));

        let loader = MediaLoader::default();
        let ts = loader.oldest_timestamp(Some(&tags), &metadata, &path);
        assert_eq!(ts.to_string(), "2001-02-03 04:05:06");
    }

    #[test]
    fn test_oldest_timestamp_falls_back_to_file_times() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.avi");
        fs::write(&path, b"x").unwrap();
        let metadata = fs::metadata(&path).unwrap();

        let ts = MediaLoader::default().oldest_timestamp(None, &metadata, &path);
        let modified = local_naive(metadata.modified().unwrap());
        assert!(ts <= modified);
    }

    #[test]
    fn test_dimensions_from_tags() {
        let mut tags = Tags::new();
        tags.insert("QuickTime:ImageWidth".into(), json!(1280));
        tags.insert("QuickTime:ImageHeight".into(), json!("720"));
        assert_eq!(
            dimensions_from_tags(Some(&tags)),
            Some(Dimensions::new(1280, 720))
        );

        tags.remove("QuickTime:ImageHeight");
        assert_eq!(dimensions_from_tags(Some(&tags)), None);
        assert_eq!(dimensions_from_tags(None), None);
    }
}
