use image::GrayImage;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::types::{DESCRIPTOR_BYTES, Descriptor};

/// Radius of the circular patch used for orientation and sampling.
pub const PATCH_RADIUS: i32 = 12;
/// Half size of the box filter applied around each sample point.
const SMOOTH_RADIUS: i32 = 2;
const PATTERN_SEED: u64 = 0x0b_41ef;

/// Pixels a keypoint must keep from the image edge so every steered sample
/// and its smoothing window stay inside the image.
pub const fn required_border() -> u32 {
    (PATCH_RADIUS + SMOOTH_RADIUS + 1) as u32
}

/// One binary test: compare the smoothed intensity at `p0` with `p1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestPair {
    pub p0: (f32, f32),
    pub p1: (f32, f32),
}

/// Seeded sampling pattern; every point lies inside the patch circle so any
/// rotation keeps it within `PATCH_RADIUS` (plus rounding).
pub fn sampling_pattern() -> Vec<TestPair> {
    let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
    let r = PATCH_RADIUS - 1;
    let point = |rng: &mut ChaCha8Rng| loop {
        let x = rng.random_range(-r..=r);
        let y = rng.random_range(-r..=r);
        if x * x + y * y <= r * r {
            return (x as f32, y as f32);
        }
    };
    (0..DESCRIPTOR_BYTES * 8)
        .map(|_| {
            let p0 = point(&mut rng);
            let mut p1 = point(&mut rng);
            while p1 == p0 {
                p1 = point(&mut rng);
            }
            TestPair { p0, p1 }
        })
        .collect()
}

/// Summed-area table with one row and column of zero padding.
pub struct IntegralImage {
    width: u32,
    sums: Vec<u64>,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> IntegralImage {
        let (w, h) = gray.dimensions();
        let stride = (w + 1) as usize;
        let mut sums = vec![0u64; stride * (h + 1) as usize];
        for y in 0..h as usize {
            let mut row_sum = 0u64;
            for x in 0..w as usize {
                row_sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }
        IntegralImage { width: w, sums }
    }

    /// Sum over the inclusive box `[x0, x1] x [y0, y1]`.
    pub fn box_sum(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> u64 {
        let stride = (self.width + 1) as usize;
        let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize + 1, y1 as usize + 1);
        self.sums[y1 * stride + x1] + self.sums[y0 * stride + x0]
            - self.sums[y0 * stride + x1]
            - self.sums[y1 * stride + x0]
    }

    fn smoothed(&self, x: i32, y: i32) -> u64 {
        self.box_sum(
            (x - SMOOTH_RADIUS) as u32,
            (y - SMOOTH_RADIUS) as u32,
            (x + SMOOTH_RADIUS) as u32,
            (y + SMOOTH_RADIUS) as u32,
        )
    }
}

/// Intensity-centroid orientation of the circular patch around `(x, y)`.
pub fn orientation(gray: &GrayImage, x: u32, y: u32) -> f32 {
    let (mut m01, mut m10) = (0i64, 0i64);
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        for dx in -PATCH_RADIUS..=PATCH_RADIUS {
            if dx * dx + dy * dy > PATCH_RADIUS * PATCH_RADIUS {
                continue;
            }
            let v = gray.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

/// Steered BRIEF: the pattern is rotated by `angle` before sampling.
pub fn describe(integral: &IntegralImage, pattern: &[TestPair], x: u32, y: u32, angle: f32) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let steer = |(px, py): (f32, f32)| -> (i32, i32) {
        (
            x as i32 + (cos * px - sin * py).round() as i32,
            y as i32 + (sin * px + cos * py).round() as i32,
        )
    };
    let mut descriptor = Descriptor::zeros();
    for (bit, pair) in pattern.iter().enumerate() {
        let (x0, y0) = steer(pair.p0);
        let (x1, y1) = steer(pair.p1);
        if integral.smoothed(x0, y0) < integral.smoothed(x1, y1) {
            descriptor.set_bit(bit);
        }
    }
    descriptor
}
