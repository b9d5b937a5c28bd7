use std::collections::BTreeMap;

use glam::DVec2;
use image::RgbImage;
use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::config::MosaicConfig;
use crate::display::{Display, DisplayStream};
use crate::error::{MosaicError, Result};
use crate::features::{FeatureExtractor, OrbExtractor};
use crate::geometry::{
    CanvasPlan, CanvasPlanner, EstimatedHomography, HomographyEstimator, RansacEstimator,
};
use crate::matching::{FeatureMatcher, matcher_from_config};
use crate::merge::ImageMerger;
use crate::source::FrameSource;
use crate::types::FeatureSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    /// No mosaic yet.
    Empty,
    /// Mosaic exists and is being extended.
    Accumulating,
    /// Source exhausted or cancelled; terminal.
    Done,
}

/// What happened to a single frame.
#[derive(Debug)]
pub enum FrameOutcome {
    Seeded { features: usize },
    Merged(MergeSummary),
    Dropped(MosaicError),
    /// The controller is already `Done`.
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    pub frame_index: usize,
    pub features: usize,
    pub matches: usize,
    pub inliers: usize,
    pub translation: (f64, f64),
    pub plan: CanvasPlan,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MosaicStats {
    pub frames_processed: usize,
    pub frames_seeded: usize,
    pub frames_merged: usize,
    pub dropped: BTreeMap<String, usize>,
    pub merges: Vec<MergeSummary>,
}

impl MosaicStats {
    pub fn frames_dropped(&self) -> usize {
        self.dropped.values().sum()
    }

    fn record_drop(&mut self, err: &MosaicError) {
        *self.dropped.entry(err.label().to_string()).or_default() += 1;
    }
}

/// Owns the mosaic and drives each frame through
/// extract -> match -> estimate -> plan -> merge.
pub struct MosaicController {
    config: MosaicConfig,
    extractor: Box<dyn FeatureExtractor>,
    matcher: Box<dyn FeatureMatcher>,
    estimator: Box<dyn HomographyEstimator>,
    planner: CanvasPlanner,
    merger: ImageMerger,
    state: ControllerState,
    mosaic: Option<RgbImage>,
    mosaic_features: Option<FeatureSet>,
    last_frame_features: Option<FeatureSet>,
    /// Centre of the last accepted frame, in current mosaic coordinates.
    last_center: Option<DVec2>,
    stats: MosaicStats,
}

fn frame_center(image: &RgbImage) -> DVec2 {
    DVec2::new(
        (image.width().max(1) - 1) as f64 / 2.0,
        (image.height().max(1) - 1) as f64 / 2.0,
    )
}

impl MosaicController {
    /// Controller with the bundled ORB extractor, configured matcher and
    /// RANSAC estimator.
    pub fn new(config: MosaicConfig) -> Result<MosaicController> {
        let extractor = Box::new(OrbExtractor::from_config(&config));
        let matcher = matcher_from_config(&config);
        let estimator = Box::new(RansacEstimator::from_config(&config));
        Self::with_components(config, extractor, matcher, estimator)
    }

    pub fn with_components(
        config: MosaicConfig,
        extractor: Box<dyn FeatureExtractor>,
        matcher: Box<dyn FeatureMatcher>,
        estimator: Box<dyn HomographyEstimator>,
    ) -> Result<MosaicController> {
        config.validate()?;
        Ok(MosaicController {
            planner: CanvasPlanner::from_config(&config),
            merger: ImageMerger::from_config(&config),
            config,
            extractor,
            matcher,
            estimator,
            state: ControllerState::Empty,
            mosaic: None,
            mosaic_features: None,
            last_frame_features: None,
            last_center: None,
            stats: MosaicStats::default(),
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    pub fn mosaic(&self) -> Option<&RgbImage> {
        self.mosaic.as_ref()
    }

    pub fn into_mosaic(self) -> Option<RgbImage> {
        self.mosaic
    }

    pub fn stats(&self) -> &MosaicStats {
        &self.stats
    }

    /// Features of the most recent frame offered to [`Self::process_frame`].
    pub fn last_frame_features(&self) -> Option<&FeatureSet> {
        self.last_frame_features.as_ref()
    }

    /// Moves to `Done`. Returns `true` only on the call that made the transition.
    pub fn finish(&mut self) -> bool {
        if self.state == ControllerState::Done {
            return false;
        }
        info!(
            "mosaic finished: {} frames, {} merged, {} dropped",
            self.stats.frames_processed,
            self.stats.frames_merged,
            self.stats.frames_dropped()
        );
        self.state = ControllerState::Done;
        true
    }

    /// Runs one frame through the pipeline. Per-frame failures are absorbed:
    /// the frame is dropped and the mosaic kept.
    pub fn process_frame(&mut self, frame: &RgbImage) -> FrameOutcome {
        if self.state == ControllerState::Done {
            return FrameOutcome::Ignored;
        }
        let frame_index = self.stats.frames_processed;
        self.stats.frames_processed += 1;

        let features = self.extractor.extract(frame, self.config.feature_threshold as f32);
        let n_features = features.len();
        trace!("frame {}: {} features", frame_index, n_features);
        self.last_frame_features = Some(features);

        if n_features <= self.config.min_feature_count {
            let err = MosaicError::LowFeatureCount {
                found: n_features,
                required: self.config.min_feature_count,
            };
            return self.drop_frame(frame_index, err);
        }

        if self.state == ControllerState::Empty {
            info!("seeding mosaic with frame {} ({} features)", frame_index, n_features);
            self.mosaic = Some(frame.clone());
            self.mosaic_features = self.last_frame_features.clone();
            self.last_center = Some(frame_center(frame));
            self.state = ControllerState::Accumulating;
            self.stats.frames_seeded += 1;
            return FrameOutcome::Seeded {
                features: n_features,
            };
        }

        match self.register(frame, frame_index) {
            Ok(summary) => {
                self.stats.frames_merged += 1;
                self.stats.merges.push(summary.clone());
                FrameOutcome::Merged(summary)
            }
            Err(err) => self.drop_frame(frame_index, err),
        }
    }

    fn drop_frame(&mut self, frame_index: usize, err: MosaicError) -> FrameOutcome {
        if err.is_frame_local() {
            debug!("frame {} dropped: {}", frame_index, err);
        } else {
            warn!("frame {} dropped on unexpected error: {}", frame_index, err);
        }
        self.stats.record_drop(&err);
        FrameOutcome::Dropped(err)
    }

    fn register(&mut self, frame: &RgbImage, frame_index: usize) -> Result<MergeSummary> {
        let (Some(mosaic), Some(features)) = (self.mosaic.as_ref(), self.last_frame_features.as_ref())
        else {
            return Err(MosaicError::InsufficientCorrespondences { found: 0 });
        };
        let mosaic_features = match self.mosaic_features.take() {
            Some(f) => f,
            None => self.extractor.extract(mosaic, self.config.feature_threshold as f32),
        };
        let outcome = Self::register_against(
            &self.config,
            self.matcher.as_ref(),
            self.estimator.as_ref(),
            &self.planner,
            features,
            &mosaic_features,
            frame,
            mosaic,
            self.last_center,
        );
        let (estimate, plan, matches, center) = match outcome {
            Ok(v) => v,
            Err(err) => {
                self.mosaic_features = Some(mosaic_features);
                return Err(err);
            }
        };

        let merged = self.merger.merge(frame, mosaic, &estimate.homography, &plan);
        let summary = MergeSummary {
            frame_index,
            features: features.len(),
            matches,
            inliers: estimate.inlier_count(),
            translation: estimate.homography.translation_component(),
            plan,
        };
        debug!(
            "frame {} merged: {} matches, {} inliers, canvas {}x{}",
            frame_index, summary.matches, summary.inliers, plan.width, plan.height
        );
        // the old mosaic and its features are discarded here
        self.mosaic = Some(merged);
        self.mosaic_features = None;
        self.last_center = Some(center + DVec2::new(plan.offset_x as f64, plan.offset_y as f64));
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn register_against(
        config: &MosaicConfig,
        matcher: &dyn FeatureMatcher,
        estimator: &dyn HomographyEstimator,
        planner: &CanvasPlanner,
        features: &FeatureSet,
        mosaic_features: &FeatureSet,
        frame: &RgbImage,
        mosaic: &RgbImage,
        last_center: Option<DVec2>,
    ) -> Result<(EstimatedHomography, CanvasPlan, usize, DVec2)> {
        let matches = matcher.match_features(
            features,
            mosaic_features,
            config.match_candidate_breadth,
            config.match_ratio_threshold,
        );
        trace!("{} matches against {} mosaic features", matches.len(), mosaic_features.len());
        let estimate = estimator.estimate(features, mosaic_features, &matches)?;
        let plan = planner.plan(frame.dimensions(), mosaic.dimensions(), &estimate.homography)?;

        let center = estimate
            .homography
            .project(frame_center(frame))
            .ok_or(MosaicError::CanvasOverflow {
                width: plan.width as u64,
                height: plan.height as u64,
            })?;
        if let (Some(required), Some(last)) = (config.min_frame_displacement, last_center) {
            let displacement = center.distance(last);
            if displacement < required {
                return Err(MosaicError::InsufficientMotion {
                    displacement,
                    required,
                });
            }
        }
        Ok((estimate, plan, matches.len(), center))
    }

    /// Pulls frames until the source ends or the display reports cancellation.
    ///
    /// Transient read failures are skipped; more than
    /// `max_consecutive_read_failures` in a row ends the stream.
    pub fn run<S, D>(&mut self, source: &mut S, display: &mut D)
    where
        S: FrameSource + ?Sized,
        D: Display + ?Sized,
    {
        let interval = self.config.frame_interval();
        let mut read_failures = 0;
        while self.state != ControllerState::Done {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => {
                    read_failures = 0;
                    frame
                }
                Ok(None) => {
                    info!("frame source exhausted");
                    self.finish();
                    break;
                }
                Err(err) => {
                    read_failures += 1;
                    warn!("{} ({} in a row)", err, read_failures);
                    if read_failures > self.config.max_consecutive_read_failures {
                        warn!("too many read failures, stopping");
                        self.finish();
                        break;
                    }
                    continue;
                }
            };

            self.process_frame(&frame);
            display.show(DisplayStream::Live, &frame);
            if let Some(features) = &self.last_frame_features {
                display.show_features(DisplayStream::Live, features);
            }
            if let Some(mosaic) = &self.mosaic {
                display.show(DisplayStream::Mosaic, mosaic);
            }
            if display.poll_cancel(interval) {
                info!("cancelled");
                self.finish();
            }
        }
    }
}
