//! Keypoint detection and description.
//!
//! The controller only sees the [`FeatureExtractor`] trait; [`OrbExtractor`]
//! is the bundled implementation (FAST-9 corners, intensity-centroid
//! orientation, steered BRIEF descriptors).

pub mod brief;
pub mod fast;

use image::RgbImage;
use log::trace;
use rayon::prelude::*;

use crate::config::MosaicConfig;
use crate::types::{FeatureSet, Keypoint};

pub trait FeatureExtractor: Send + Sync {
    /// Detects features in `image`. A lower `threshold` yields more, weaker
    /// features. Must be deterministic and return an empty set (not an error)
    /// for images without usable structure.
    fn extract(&self, image: &RgbImage, threshold: f32) -> FeatureSet;
}

pub struct OrbExtractor {
    pub max_features: usize,
    pattern: Vec<brief::TestPair>,
}

impl OrbExtractor {
    pub fn new(max_features: usize) -> OrbExtractor {
        OrbExtractor {
            max_features,
            pattern: brief::sampling_pattern(),
        }
    }

    pub fn from_config(config: &MosaicConfig) -> OrbExtractor {
        Self::new(config.max_features)
    }
}

impl Default for OrbExtractor {
    fn default() -> Self {
        Self::new(MosaicConfig::default().max_features)
    }
}

impl FeatureExtractor for OrbExtractor {
    fn extract(&self, image: &RgbImage, threshold: f32) -> FeatureSet {
        let gray = image::imageops::grayscale(image);
        let threshold = threshold.clamp(1.0, 255.0).round() as u8;
        let mut corners = fast::detect(&gray, threshold, brief::required_border());
        corners.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        corners.truncate(self.max_features);
        if corners.is_empty() {
            return FeatureSet::empty();
        }

        let integral = brief::IntegralImage::new(&gray);
        let (keypoints, descriptors): (Vec<_>, Vec<_>) = corners
            .par_iter()
            .map(|c| {
                let angle = brief::orientation(&gray, c.x, c.y);
                let keypoint = Keypoint {
                    p2d: glam::Vec2::new(c.x as f32, c.y as f32),
                    scale: (2 * brief::PATCH_RADIUS + 1) as f32,
                    angle,
                    response: c.score,
                };
                (keypoint, brief::describe(&integral, &self.pattern, c.x, c.y, angle))
            })
            .unzip();
        trace!("extracted {} features at threshold {}", keypoints.len(), threshold);
        FeatureSet::new(keypoints, descriptors)
    }
}
