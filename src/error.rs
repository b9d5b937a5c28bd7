pub type Result<T> = std::result::Result<T, MosaicError>;

/// Everything that can go wrong while building a mosaic.
///
/// The per-frame variants (`LowFeatureCount` through `InsufficientMotion`)
/// only ever cause the current frame to be dropped; see
/// [`MosaicError::is_frame_local`].
#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    #[error("too few features: found {found}, need more than {required}")]
    LowFeatureCount { found: usize, required: usize },

    #[error("insufficient correspondences: {found} matches, need at least 4")]
    InsufficientCorrespondences { found: usize },

    #[error("degenerate homography fit: {inliers} inliers, need {required}")]
    DegenerateFit { inliers: usize, required: usize },

    #[error("planned canvas {width}x{height} exceeds the size bound")]
    CanvasOverflow { width: u64, height: u64 },

    #[error("frame moved {displacement:.2} px, need at least {required:.2} px")]
    InsufficientMotion { displacement: f64, required: f64 },

    #[error("no frame source available: {0}")]
    SourceUnavailable(String),

    #[error("frame read failed: {0}")]
    ReadFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MosaicError {
    /// True for failures that drop a single frame and leave the mosaic intact.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            MosaicError::LowFeatureCount { .. }
                | MosaicError::InsufficientCorrespondences { .. }
                | MosaicError::DegenerateFit { .. }
                | MosaicError::CanvasOverflow { .. }
                | MosaicError::InsufficientMotion { .. }
        )
    }

    /// Short stable label used for drop counters and reports.
    pub fn label(&self) -> &'static str {
        match self {
            MosaicError::LowFeatureCount { .. } => "low_feature_count",
            MosaicError::InsufficientCorrespondences { .. } => "insufficient_correspondences",
            MosaicError::DegenerateFit { .. } => "degenerate_fit",
            MosaicError::CanvasOverflow { .. } => "canvas_overflow",
            MosaicError::InsufficientMotion { .. } => "insufficient_motion",
            MosaicError::SourceUnavailable(_) => "source_unavailable",
            MosaicError::ReadFailed(_) => "read_failed",
            MosaicError::InvalidConfig(_) => "invalid_config",
            MosaicError::Io(_) => "io",
            MosaicError::Image(_) => "image",
            MosaicError::Json(_) => "json",
        }
    }
}
