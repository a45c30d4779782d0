use crate::core::record::{Fingerprint, PerceptualHash};
use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig};

/// Gradient (dHash) perceptual hashing of decoded images.
pub struct PerceptualService {
    hasher: Hasher,
}

impl PerceptualService {
    /// `hash_size` is the side of the hash grid, so the hash has
    /// `hash_size * hash_size` bits.
    pub fn new(hash_size: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Gradient)
            .hash_size(hash_size, hash_size)
            .to_hasher();
        Self { hasher }
    }

    pub fn fingerprint(&self, image: &DynamicImage) -> Fingerprint {
        let hash = self.hasher.hash_image(image);
        Fingerprint::Perceptual(PerceptualHash(hash.as_bytes().to_vec()))
    }

    /// Fingerprints of the image turned by 90, 180 and 270 degrees.
    pub fn rotated_fingerprints(&self, image: &DynamicImage) -> Vec<Fingerprint> {
        let mut rotated = image.clone();
        (0..3)
            .map(|_| {
                rotated = rotated.rotate90();
                self.fingerprint(&rotated)
            })
            .collect()
    }
}

impl Default for PerceptualService {
    fn default() -> Self {
        Self::new(10)
    }
}
