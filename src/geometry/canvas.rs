use glam::DVec2;
use log::warn;
use serde::Serialize;

use super::homography::Homography;
use crate::config::MosaicConfig;
use crate::error::{MosaicError, Result};

/// Size of the next canvas and where the previous mosaic's top-left corner
/// lands inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CanvasPlan {
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl CanvasPlan {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Translation taking old mosaic coordinates to new canvas coordinates.
    pub fn offset_translation(&self) -> Homography {
        Homography::translation(self.offset_x as f64, self.offset_y as f64)
    }
}

/// Pixel-centre corners of a `width` x `height` image.
pub fn corners(width: u32, height: u32) -> [DVec2; 4] {
    let (w, h) = ((width.max(1) - 1) as f64, (height.max(1) - 1) as f64);
    [
        DVec2::new(0.0, 0.0),
        DVec2::new(w, 0.0),
        DVec2::new(0.0, h),
        DVec2::new(w, h),
    ]
}

/// Rounds values sitting within float noise of an integer.
fn snap(v: f64) -> f64 {
    if (v - v.round()).abs() < 1e-6 { v.round() } else { v }
}

#[derive(Debug, Clone, Copy)]
pub struct CanvasPlanner {
    pub max_canvas_area: u64,
}

impl CanvasPlanner {
    pub fn from_config(config: &MosaicConfig) -> CanvasPlanner {
        CanvasPlanner {
            max_canvas_area: config.max_canvas_area,
        }
    }

    /// Exact bounding box of the mosaic and the frame warped by `homography`.
    pub fn plan(
        &self,
        frame_dims: (u32, u32),
        mosaic_dims: (u32, u32),
        homography: &Homography,
    ) -> Result<CanvasPlan> {
        let mut points: Vec<DVec2> = corners(mosaic_dims.0, mosaic_dims.1).to_vec();
        for c in corners(frame_dims.0, frame_dims.1) {
            match homography.project(c) {
                Some(p) => points.push(p),
                None => {
                    warn!("frame corner {} maps to infinity", c);
                    return Err(MosaicError::CanvasOverflow {
                        width: u64::MAX,
                        height: u64::MAX,
                    });
                }
            }
        }
        let (min, max) = points.iter().fold(
            (DVec2::splat(f64::INFINITY), DVec2::splat(f64::NEG_INFINITY)),
            |(lo, hi), p| (lo.min(*p), hi.max(*p)),
        );
        let (x0, y0) = (snap(min.x).floor(), snap(min.y).floor());
        let (x1, y1) = (snap(max.x).ceil(), snap(max.y).ceil());
        let width = x1 - x0 + 1.0;
        let height = y1 - y0 + 1.0;
        let fits = width.is_finite()
            && height.is_finite()
            && width <= u32::MAX as f64
            && height <= u32::MAX as f64
            && width * height <= self.max_canvas_area as f64;
        if !fits {
            warn!("planned canvas {:.0}x{:.0} rejected", width, height);
            return Err(MosaicError::CanvasOverflow {
                width: width as u64,
                height: height as u64,
            });
        }
        Ok(CanvasPlan {
            width: width as u32,
            height: height as u32,
            offset_x: (-x0) as u32,
            offset_y: (-y0) as u32,
        })
    }
}
