//! Deterministic textured frames for demos, tests and benchmarks.

use image::{Rgb, RgbImage, imageops};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Random colour blocks of `block` x `block` pixels.
pub fn block_texture(width: u32, height: u32, block: u32, seed: u64) -> RgbImage {
    let block = block.max(1);
    let cols = width.div_ceil(block) as usize;
    let rows = height.div_ceil(block) as usize;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let colors: Vec<[u8; 3]> = (0..cols * rows).map(|_| rng.random()).collect();
    RgbImage::from_fn(width, height, |x, y| {
        let i = (y / block) as usize * cols + (x / block) as usize;
        Rgb(colors[i])
    })
}

/// A single-colour frame, featureless by construction.
pub fn uniform(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value; 3]))
}

/// Windows of `frame_w` x `frame_h` sliding across `texture` by
/// (`step_x`, `step_y`) per frame, starting at the top-left corner.
///
/// Stops early once the window would leave the texture.
pub fn pan_frames(
    texture: &RgbImage,
    frame_w: u32,
    frame_h: u32,
    step_x: u32,
    step_y: u32,
    count: usize,
) -> Vec<RgbImage> {
    (0..count as u32)
        .map(|i| (i * step_x, i * step_y))
        .take_while(|(x, y)| x + frame_w <= texture.width() && y + frame_h <= texture.height())
        .map(|(x, y)| imageops::crop_imm(texture, x, y, frame_w, frame_h).to_image())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan_frames_overlap_by_the_step() {
        let texture = block_texture(60, 20, 4, 1);
        let frames = pan_frames(&texture, 20, 20, 10, 0, 10);
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[1].get_pixel(0, 3), frames[0].get_pixel(10, 3));
        assert_eq!(block_texture(60, 20, 4, 1), texture);
    }
}
