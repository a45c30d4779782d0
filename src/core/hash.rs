use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-level content hashing, used for non-image fingerprints and for
/// deciding whether an evicted duplicate can be deleted outright.
pub struct HashService;

impl HashService {
    pub fn new() -> Self {
        Self
    }

    /// Compute the BLAKE3 digest of the file contents as lowercase hex.
    pub fn compute_content_hash(&self, file_path: &Path) -> Result<String, HashError> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0; 128 * 1024];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// True when both files have exactly the same bytes.
    pub fn verify_identical_content(&self, file1: &Path, file2: &Path) -> Result<bool, HashError> {
        let hash1 = self.compute_content_hash(file1)?;
        let hash2 = self.compute_content_hash(file2)?;
        Ok(hash1 == hash2)
    }
}

impl Default for HashService {
    fn default() -> Self {
        Self::new()
    }
}
