use glam::DVec2;
use image::{RgbImage, imageops};
use log::trace;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::MosaicConfig;
use crate::geometry::{CanvasPlan, Homography, corners};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Bilinear,
}

/// Warps frames into a new canvas and composites them over the old mosaic.
///
/// Compositing is last-writer-wins: every canvas pixel covered by the warped
/// frame takes the frame's value.
#[derive(Debug, Clone, Copy)]
pub struct ImageMerger {
    pub interpolation: Interpolation,
}

impl Default for ImageMerger {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Bilinear,
        }
    }
}

fn sample_nearest(frame: &RgbImage, p: DVec2) -> Option<[u8; 3]> {
    let (x, y) = (p.x.round(), p.y.round());
    if x < 0.0 || y < 0.0 || x >= frame.width() as f64 || y >= frame.height() as f64 {
        return None;
    }
    Some(frame.get_pixel(x as u32, y as u32).0)
}

fn sample_bilinear(frame: &RgbImage, p: DVec2) -> Option<[u8; 3]> {
    const TOL: f64 = 1e-6;
    let (w, h) = (frame.width() as f64 - 1.0, frame.height() as f64 - 1.0);
    if p.x < -TOL || p.y < -TOL || p.x > w + TOL || p.y > h + TOL {
        return None;
    }
    let (px, py) = (p.x.clamp(0.0, w), p.y.clamp(0.0, h));
    let (x0, y0) = (px.floor() as u32, py.floor() as u32);
    let x1 = (x0 + 1).min(frame.width() - 1);
    let y1 = (y0 + 1).min(frame.height() - 1);
    let (fx, fy) = (px - x0 as f64, py - y0 as f64);
    let (p00, p10) = (frame.get_pixel(x0, y0).0, frame.get_pixel(x1, y0).0);
    let (p01, p11) = (frame.get_pixel(x0, y1).0, frame.get_pixel(x1, y1).0);
    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}

impl ImageMerger {
    pub fn from_config(config: &MosaicConfig) -> ImageMerger {
        ImageMerger {
            interpolation: config.interpolation,
        }
    }

    /// Builds the next mosaic: `mosaic` copied at the plan offset, then
    /// `frame` warped through `offset ∘ homography` on top.
    pub fn merge(
        &self,
        frame: &RgbImage,
        mosaic: &RgbImage,
        homography: &Homography,
        plan: &CanvasPlan,
    ) -> RgbImage {
        let mut canvas = RgbImage::new(plan.width, plan.height);
        imageops::replace(&mut canvas, mosaic, plan.offset_x as i64, plan.offset_y as i64);

        let to_canvas = plan.offset_translation().compose(homography);
        let from_canvas = to_canvas.inverse();

        // only rows/columns inside the warped frame's bounding box can be hit
        let warped: Vec<DVec2> = corners(frame.width(), frame.height())
            .iter()
            .filter_map(|c| to_canvas.project(*c))
            .collect();
        if warped.len() < 4 || frame.width() == 0 || frame.height() == 0 {
            return canvas;
        }
        let (lo, hi) = warped.iter().fold(
            (DVec2::splat(f64::INFINITY), DVec2::splat(f64::NEG_INFINITY)),
            |(lo, hi), p| (lo.min(*p), hi.max(*p)),
        );
        let max_x = plan.width as f64 - 1.0;
        let max_y = plan.height as f64 - 1.0;
        let x0 = (lo.x.floor() - 1.0).clamp(0.0, max_x) as u32;
        let x1 = (hi.x.ceil() + 1.0).clamp(0.0, max_x) as u32;
        let y0 = (lo.y.floor() - 1.0).clamp(0.0, max_y) as usize;
        let y1 = (hi.y.ceil() + 1.0).clamp(0.0, max_y) as usize;
        trace!("warping frame into canvas rows {}..={} cols {}..={}", y0, y1, x0, x1);

        let interpolation = self.interpolation;
        let row_len = plan.width as usize * 3;
        canvas
            .par_chunks_mut(row_len)
            .enumerate()
            .skip(y0)
            .take(y1 + 1 - y0)
            .for_each(|(y, row)| {
                for x in x0..=x1 {
                    let Some(src) = from_canvas.project(DVec2::new(x as f64, y as f64)) else {
                        continue;
                    };
                    let pixel = match interpolation {
                        Interpolation::Nearest => sample_nearest(frame, src),
                        Interpolation::Bilinear => sample_bilinear(frame, src),
                    };
                    if let Some(pixel) = pixel {
                        let i = x as usize * 3;
                        row[i..i + 3].copy_from_slice(&pixel);
                    }
                }
            });
        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_hits_exact_pixels_on_integer_coordinates() {
        let frame = RgbImage::from_fn(4, 3, |x, y| image::Rgb([x as u8 * 10, y as u8 * 20, 7]));
        assert_eq!(sample_bilinear(&frame, DVec2::new(3.0, 2.0)), Some([30, 40, 7]));
        assert_eq!(sample_bilinear(&frame, DVec2::new(1.5, 0.0)), Some([15, 0, 7]));
        assert_eq!(sample_bilinear(&frame, DVec2::new(3.5, 0.0)), None);
        assert_eq!(sample_nearest(&frame, DVec2::new(-0.4, 0.0)), Some([0, 0, 7]));
    }
}
