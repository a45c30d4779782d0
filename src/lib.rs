//! Sort photos and videos from source trees into a date-organized archive,
//! keeping one best copy of every exact, near or rotated duplicate.

pub mod config;
pub mod core;
pub mod database;
pub mod services;

pub use self::config::Config;
pub use self::core::{Loader, MediaLoader, Record};
pub use self::database::IndexStore;
pub use self::services::{SortError, SortSummary, Sorter};
