use glam::DVec2;
use log::{debug, trace};
use nalgebra as na;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use super::homography::{Homography, fit_least_squares, fit_minimal, project_with};
use crate::config::MosaicConfig;
use crate::error::{MosaicError, Result};
use crate::types::{FeatureSet, MatchSet};

/// Minimum number of correspondences for a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

const REFINE_ROUNDS: usize = 6;
/// Median residual to gate: 3 sigma with the MAD-to-sigma factor.
const MAD_GATE: f64 = 3.0 * 1.4826;
/// Lower bound on the refinement gate, in pixels.
const MIN_REFINE_GATE: f64 = 0.05;

/// A fitted transform (frame -> mosaic) and the matches that agree with it.
#[derive(Debug, Clone)]
pub struct EstimatedHomography {
    pub homography: Homography,
    /// One flag per match, in `MatchSet` order.
    pub inliers: Vec<bool>,
}

impl EstimatedHomography {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|i| **i).count()
    }
}

pub trait HomographyEstimator: Send + Sync {
    /// Fits the transform mapping `query` keypoints onto `reference`
    /// keypoints for the given matches.
    fn estimate(
        &self,
        query: &FeatureSet,
        reference: &FeatureSet,
        matches: &MatchSet,
    ) -> Result<EstimatedHomography>;
}

/// Sample-consensus estimator over four-point DLT fits.
#[derive(Debug, Clone)]
pub struct RansacEstimator {
    pub reprojection_threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacEstimator {
    fn default() -> Self {
        Self::from_config(&MosaicConfig::default())
    }
}

fn reprojection_error(h: &na::Matrix3<f64>, pair: &(DVec2, DVec2)) -> f64 {
    project_with(h, pair.0).map_or(f64::INFINITY, |p| p.distance(pair.1))
}

fn nearly_collinear(a: DVec2, b: DVec2, c: DVec2) -> bool {
    (b - a).perp_dot(c - a).abs() < 1.0
}

/// True when any three of the four points in either image are (nearly) on a line.
fn degenerate_sample(sample: &[(DVec2, DVec2); 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|&[i, j, k]| {
        nearly_collinear(sample[i].0, sample[j].0, sample[k].0)
            || nearly_collinear(sample[i].1, sample[j].1, sample[k].1)
    })
}

impl RansacEstimator {
    pub fn from_config(config: &MosaicConfig) -> RansacEstimator {
        RansacEstimator {
            reprojection_threshold: config.ransac_reprojection_threshold,
            max_iterations: config.ransac_max_iterations,
            confidence: config.ransac_confidence,
            min_inliers: config.min_inliers.max(MIN_CORRESPONDENCES),
            seed: config.ransac_seed,
        }
    }

    fn inlier_mask(&self, h: &na::Matrix3<f64>, pairs: &[(DVec2, DVec2)]) -> Vec<bool> {
        pairs
            .iter()
            .map(|pair| reprojection_error(h, pair) <= self.reprojection_threshold)
            .collect()
    }

    /// Iterations needed to draw one all-inlier sample with the configured confidence.
    fn adaptive_iterations(&self, inlier_ratio: f64) -> usize {
        let p_good = inlier_ratio.powi(MIN_CORRESPONDENCES as i32);
        if p_good >= 1.0 {
            return 1;
        }
        if p_good <= 0.0 {
            return self.max_iterations;
        }
        let n = (1.0 - self.confidence).ln() / (1.0 - p_good).ln();
        if n.is_finite() {
            (n.ceil() as usize).clamp(1, self.max_iterations)
        } else {
            self.max_iterations
        }
    }

    /// Least-squares refits over a shrinking support set.
    ///
    /// Each round fits only the pairs whose residual is within a robust gate
    /// (a multiple of the median inlier residual, bounded by the reprojection
    /// threshold), so near-miss correspondences inside the threshold do not
    /// bias the final transform. Stops when the support set stops changing.
    fn refine(&self, start: na::Matrix3<f64>, pairs: &[(DVec2, DVec2)]) -> Option<na::Matrix3<f64>> {
        let mut h = start;
        let mut refined = false;
        let mut support: Option<Vec<bool>> = None;
        for _ in 0..REFINE_ROUNDS {
            let residuals: Vec<f64> = pairs.iter().map(|pair| reprojection_error(&h, pair)).collect();
            let mut within: Vec<f64> = residuals
                .iter()
                .copied()
                .filter(|r| *r <= self.reprojection_threshold)
                .collect();
            if within.len() < MIN_CORRESPONDENCES {
                break;
            }
            within.sort_by(f64::total_cmp);
            let median = within[within.len() / 2];
            let gate = (MAD_GATE * median).clamp(MIN_REFINE_GATE, self.reprojection_threshold);
            let mask: Vec<bool> = residuals.iter().map(|r| *r <= gate).collect();
            if support.as_ref() == Some(&mask) {
                break;
            }
            let subset: Vec<_> = pairs
                .iter()
                .zip(mask.iter())
                .filter_map(|(p, keep)| keep.then_some(*p))
                .collect();
            let Some(next) = fit_least_squares(&subset) else {
                break;
            };
            trace!("refine: {} pairs within {:.4} px", subset.len(), gate);
            h = next;
            refined = true;
            support = Some(mask);
        }
        refined.then_some(h)
    }

    /// Runs the consensus loop on raw point pairs.
    pub fn estimate_pairs(&self, pairs: &[(DVec2, DVec2)]) -> Result<EstimatedHomography> {
        if pairs.len() < MIN_CORRESPONDENCES {
            return Err(MosaicError::InsufficientCorrespondences { found: pairs.len() });
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut indices: Vec<usize> = (0..pairs.len()).collect();
        let mut best: Option<(na::Matrix3<f64>, usize)> = None;
        let mut budget = self.max_iterations;
        let mut iteration = 0;
        while iteration < budget {
            iteration += 1;
            let (chosen, _) = indices.partial_shuffle(&mut rng, MIN_CORRESPONDENCES);
            let sample = [
                pairs[chosen[0]],
                pairs[chosen[1]],
                pairs[chosen[2]],
                pairs[chosen[3]],
            ];
            if degenerate_sample(&sample) {
                continue;
            }
            let Some(h) = fit_minimal(&sample) else {
                continue;
            };
            let count = pairs
                .iter()
                .filter(|pair| reprojection_error(&h, pair) <= self.reprojection_threshold)
                .count();
            if best.as_ref().is_none_or(|(_, c)| count > *c) {
                best = Some((h, count));
                budget = budget.min(self.adaptive_iterations(count as f64 / pairs.len() as f64));
            }
        }

        let best_count = best.as_ref().map_or(0, |(_, c)| *c);
        let Some((h_sample, _)) = best.filter(|(_, c)| *c >= self.min_inliers) else {
            debug!("ransac: best consensus {} of {} after {} iterations", best_count, pairs.len(), iteration);
            return Err(MosaicError::DegenerateFit {
                inliers: best_count,
                required: self.min_inliers,
            });
        };

        let sample_mask = self.inlier_mask(&h_sample, pairs);

        // keep the refined fit only if it does not lose support
        let (matrix, mask) = match self.refine(h_sample, pairs) {
            Some(h_refit) => {
                let refit_mask = self.inlier_mask(&h_refit, pairs);
                let refit_count = refit_mask.iter().filter(|i| **i).count();
                if refit_count >= best_count {
                    (h_refit, refit_mask)
                } else {
                    (h_sample, sample_mask)
                }
            }
            None => (h_sample, sample_mask),
        };
        let inlier_count = mask.iter().filter(|i| **i).count();
        let homography = Homography::from_matrix(matrix).ok_or(MosaicError::DegenerateFit {
            inliers: inlier_count,
            required: self.min_inliers,
        })?;
        trace!(
            "ransac: {} / {} inliers after {} iterations",
            inlier_count,
            pairs.len(),
            iteration
        );
        Ok(EstimatedHomography {
            homography,
            inliers: mask,
        })
    }
}

impl HomographyEstimator for RansacEstimator {
    fn estimate(
        &self,
        query: &FeatureSet,
        reference: &FeatureSet,
        matches: &MatchSet,
    ) -> Result<EstimatedHomography> {
        if matches.len() < MIN_CORRESPONDENCES {
            return Err(MosaicError::InsufficientCorrespondences { found: matches.len() });
        }
        let pairs: Vec<(DVec2, DVec2)> = matches
            .point_pairs(query, reference)
            .into_iter()
            .map(|(q, r)| (q.as_dvec2(), r.as_dvec2()))
            .collect();
        self.estimate_pairs(&pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_budget_shrinks_with_inlier_ratio() {
        let ransac = RansacEstimator::default();
        assert_eq!(ransac.adaptive_iterations(1.0), 1);
        assert!(ransac.adaptive_iterations(0.9) < ransac.adaptive_iterations(0.5));
        assert_eq!(ransac.adaptive_iterations(0.0), ransac.max_iterations);
    }

    #[test]
    fn collinear_sample_is_degenerate() {
        let p = |x: f64, y: f64| DVec2::new(x, y);
        let line = [
            (p(0.0, 0.0), p(0.0, 0.0)),
            (p(10.0, 10.0), p(10.0, 10.0)),
            (p(20.0, 20.0), p(20.0, 20.0)),
            (p(0.0, 30.0), p(0.0, 30.0)),
        ];
        assert!(degenerate_sample(&line));
    }
}
