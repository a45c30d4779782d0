pub mod exif;
pub mod hash;
pub mod loader;
pub mod perceptual;
pub mod record;

pub use hash::HashService;
pub use loader::{Loader, LoadError, MediaLoader};
pub use record::{Dimensions, Fingerprint, PerceptualHash, Record, Tags};
