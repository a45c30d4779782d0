use crate::core::record::Tags;
use chrono::NaiveDateTime;
use exif::{Field, In, Reader, Tag, Value};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

#[derive(Debug, Error)]
pub enum ExifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error: {0}")]
    Parse(#[from] exif::Error),

    #[error("Not a JPEG file: {path}")]
    NotJpeg { path: String },

    #[error("No EXIF segment found in {path}")]
    NoExif { path: String },
}

/// Reads EXIF metadata into the `Group:Name` tag map and moves EXIF
/// segments between JPEG files.
pub struct ExifService;

impl ExifService {
    pub fn new() -> Self {
        Self
    }

    /// Extract EXIF tags from a media file. Files without readable EXIF
    /// data yield `None`.
    pub fn extract_tags(&self, file_path: &Path) -> Result<Option<Tags>, ExifError> {
        let file = match File::open(file_path) {
            Ok(f) => f,
            Err(_) => return Ok(None),
        };
        let mut buf_reader = BufReader::new(file);

        let exif_reader = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(reader) => reader,
            Err(_) => return Ok(None),
        };

        let mut tags = Tags::new();
        for field in exif_reader.fields().filter(|f| f.ifd_num == In::PRIMARY) {
            if field.tag == Tag::MakerNote {
                continue;
            }
            if let Some(value) = self.field_to_json(field) {
                let name = format!("EXIF:{}", field.tag);
                if let Some(alias) = exiftool_alias(field.tag) {
                    tags.insert(alias.to_string(), value.clone());
                }
                tags.insert(name, value);
            }
        }

        if tags.is_empty() {
            Ok(None)
        } else {
            Ok(Some(tags))
        }
    }

    fn field_to_json(&self, field: &Field) -> Option<serde_json::Value> {
        match &field.value {
            Value::Ascii(vec) => vec.first().map(|ascii_val| {
                serde_json::Value::String(
                    String::from_utf8_lossy(ascii_val)
                        .trim_end_matches('\0')
                        .to_string(),
                )
            }),
            Value::Short(vec) if vec.len() == 1 => Some(vec[0].into()),
            Value::Long(vec) if vec.len() == 1 => Some(vec[0].into()),
            Value::Byte(vec) if vec.len() == 1 => Some(vec[0].into()),
            Value::Undefined(..) | Value::Unknown(..) => None,
            _ => Some(serde_json::Value::String(
                field.display_value().to_string(),
            )),
        }
    }

    /// Parse an EXIF-style `YYYY:MM:DD HH:MM:SS` datetime, tolerating
    /// surrounding whitespace and trailing NULs.
    pub fn parse_exif_datetime(&self, datetime_str: &str) -> Option<NaiveDateTime> {
        let cleaned = datetime_str.trim().trim_end_matches('\0');
        NaiveDateTime::parse_from_str(cleaned, "%Y:%m:%d %H:%M:%S").ok()
    }

    /// Copy the EXIF segment of `from` into `to`, replacing whatever EXIF
    /// `to` already carries. Pixel data of `to` is untouched.
    pub fn transplant(&self, from: &Path, to: &Path) -> Result<(), ExifError> {
        let source = fs::read(from)?;
        let (source_segments, _) = jpeg_segments(&source).ok_or_else(|| ExifError::NotJpeg {
            path: from.display().to_string(),
        })?;
        let exif_segment = source_segments
            .iter()
            .find(|s| s.is_exif())
            .map(|s| s.bytes)
            .ok_or_else(|| ExifError::NoExif {
                path: from.display().to_string(),
            })?;

        let target = fs::read(to)?;
        let (target_segments, scan_start) =
            jpeg_segments(&target).ok_or_else(|| ExifError::NotJpeg {
                path: to.display().to_string(),
            })?;

        let mut out = Vec::with_capacity(target.len() + exif_segment.len());
        out.extend_from_slice(&SOI);
        let mut inserted = false;
        for segment in &target_segments {
            if segment.is_exif() {
                continue;
            }
            if !inserted && segment.marker != APP0 {
                out.extend_from_slice(exif_segment);
                inserted = true;
            }
            out.extend_from_slice(segment.bytes);
        }
        if !inserted {
            out.extend_from_slice(exif_segment);
        }
        out.extend_from_slice(&target[scan_start..]);

        replace_via_staging(&to.with_extension("transplant"), to, &out)?;
        Ok(())
    }
}

impl Default for ExifService {
    fn default() -> Self {
        Self::new()
    }
}

/// exiftool names for the EXIF fields whose tag names differ.
fn exiftool_alias(tag: Tag) -> Option<&'static str> {
    if tag == Tag::DateTimeDigitized {
        Some("EXIF:CreateDate")
    } else if tag == Tag::DateTime {
        Some("EXIF:ModifyDate")
    } else {
        None
    }
}

struct Segment<'a> {
    marker: u8,
    bytes: &'a [u8],
}

impl Segment<'_> {
    fn is_exif(&self) -> bool {
        self.marker == APP1 && self.bytes.get(4..4 + EXIF_HEADER.len()) == Some(EXIF_HEADER)
    }
}

/// Write `bytes` to `staging`, then rename it over `to`. The staging file
/// is removed again if either step fails.
fn replace_via_staging(staging: &Path, to: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let result = fs::write(staging, bytes).and_then(|()| fs::rename(staging, to));
    if result.is_err() && staging.exists() {
        if let Err(e) = fs::remove_file(staging) {
            log::warn!("Could not remove {}: {}", staging.display(), e);
        }
    }
    result
}

/// Header segments between SOI and the start of scan, plus the offset of
/// the scan marker. `None` if the data is not a well-formed JPEG header.
fn jpeg_segments(data: &[u8]) -> Option<(Vec<Segment<'_>>, usize)> {
    if data.get(..2) != Some(&SOI[..]) {
        return None;
    }
    let mut segments = Vec::new();
    let mut pos = 2;
    loop {
        if *data.get(pos)? != 0xFF {
            return None;
        }
        // fill bytes
        while *data.get(pos + 1)? == 0xFF {
            pos += 1;
        }
        let marker = *data.get(pos + 1)?;
        if marker == SOS || marker == EOI {
            return Some((segments, pos));
        }
        let len = u16::from_be_bytes([*data.get(pos + 2)?, *data.get(pos + 3)?]) as usize;
        let end = pos + 2 + len;
        let bytes = data.get(pos..end)?;
        segments.push(Segment { marker, bytes });
        pos = end;
    }
}
