use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::matching::MatcherKind;
use crate::merge::Interpolation;

/// Tunable parameters for the whole pipeline.
///
/// Every field has a default, so a JSON file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MosaicConfig {
    pub camera_index: u32,
    pub rescale_factor: f32,
    pub video_file_path: Option<String>,

    /// FAST intensity difference; lower finds more, weaker corners.
    pub feature_threshold: u8,
    pub max_features: usize,
    /// A frame needs strictly more features than this to be used.
    pub min_feature_count: usize,

    pub match_ratio_threshold: f32,
    pub match_candidate_breadth: usize,
    pub matcher: MatcherKind,

    pub ransac_reprojection_threshold: f64,
    pub ransac_max_iterations: usize,
    pub ransac_confidence: f64,
    pub min_inliers: usize,
    pub ransac_seed: u64,

    /// Upper bound on canvas width * height.
    pub max_canvas_area: u64,
    /// Drop frames whose centre moved less than this since the last accepted frame.
    pub min_frame_displacement: Option<f64>,
    pub interpolation: Interpolation,

    pub frame_interval_ms: u64,
    pub latest_frame_only: bool,
    pub max_consecutive_read_failures: usize,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            rescale_factor: 1.0,
            video_file_path: None,
            feature_threshold: 20,
            max_features: 2000,
            min_feature_count: 500,
            match_ratio_threshold: 0.7,
            match_candidate_breadth: 50,
            matcher: MatcherKind::Lsh,
            ransac_reprojection_threshold: 5.0,
            ransac_max_iterations: 2000,
            ransac_confidence: 0.995,
            min_inliers: 4,
            ransac_seed: 0x5eed,
            max_canvas_area: 64 * 1024 * 1024,
            min_frame_displacement: None,
            interpolation: Interpolation::Bilinear,
            frame_interval_ms: 500,
            latest_frame_only: false,
            max_consecutive_read_failures: 10,
        }
    }
}

impl MosaicConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<MosaicConfig> {
        let config: MosaicConfig = crate::io::object_from_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MosaicError::InvalidConfig(msg));
        if !(self.rescale_factor.is_finite() && self.rescale_factor > 0.0) {
            return invalid(format!("rescale_factor must be > 0, got {}", self.rescale_factor));
        }
        if !(self.match_ratio_threshold > 0.0 && self.match_ratio_threshold < 1.0) {
            return invalid(format!(
                "match_ratio_threshold must be in (0, 1), got {}",
                self.match_ratio_threshold
            ));
        }
        if self.match_candidate_breadth < 2 {
            return invalid("match_candidate_breadth must be at least 2".to_string());
        }
        if self.max_features == 0 {
            return invalid("max_features must be positive".to_string());
        }
        if !(self.ransac_reprojection_threshold.is_finite() && self.ransac_reprojection_threshold > 0.0) {
            return invalid("ransac_reprojection_threshold must be > 0".to_string());
        }
        if !(self.ransac_confidence > 0.0 && self.ransac_confidence < 1.0) {
            return invalid("ransac_confidence must be in (0, 1)".to_string());
        }
        if self.ransac_max_iterations == 0 {
            return invalid("ransac_max_iterations must be positive".to_string());
        }
        if self.min_inliers < 4 {
            return invalid(format!("min_inliers must be at least 4, got {}", self.min_inliers));
        }
        if self.max_canvas_area == 0 {
            return invalid("max_canvas_area must be positive".to_string());
        }
        if let Some(d) = self.min_frame_displacement {
            if !(d.is_finite() && d >= 0.0) {
                return invalid(format!("min_frame_displacement must be >= 0, got {}", d));
            }
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
