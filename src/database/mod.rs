pub mod store;

use sled::transaction::TransactionError;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use store::IndexStore;

/// Hidden directory inside the archive root holding the index and trash.
pub const DATA_DIR_NAME: &str = ".imagesort";
pub const INDEX_FILE_NAME: &str = "images.db";
pub const TRASH_DIR_NAME: &str = "trash";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Index transaction error: {0}")]
    Transaction(#[from] TransactionError<sled::Error>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not create data directory {path}: {source}")]
    DataDir {
        path: String,
        source: std::io::Error,
    },
}

/// Create (if needed) and return `<root>/.imagesort`.
pub fn data_dir(root: &Path) -> Result<PathBuf, IndexError> {
    let dir = root.join(DATA_DIR_NAME);
    std::fs::create_dir_all(&dir).map_err(|source| IndexError::DataDir {
        path: dir.display().to_string(),
        source,
    })?;
    Ok(dir)
}
