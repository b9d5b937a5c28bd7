use image::GrayImage;
use rayon::prelude::*;

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
const CIRCLE_OFFSETS: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// FAST-9: nine contiguous circle pixels must all be brighter or all darker.
const ARC_LENGTH: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

fn has_arc(mask: u16) -> bool {
    // duplicate the ring so runs that wrap past index 15 are found
    let mut run = (mask as u32) | ((mask as u32) << 16);
    for _ in 1..ARC_LENGTH {
        run &= run >> 1;
    }
    run != 0
}

/// Segment-test score of one pixel, 0.0 when it is not a corner.
///
/// The score is the summed excess over the threshold of the brighter (or
/// darker) circle pixels, whichever side forms the arc.
fn corner_score(gray: &GrayImage, x: u32, y: u32, threshold: i16) -> f32 {
    let center = gray.get_pixel(x, y)[0] as i16;
    let mut bright_mask: u16 = 0;
    let mut dark_mask: u16 = 0;
    let mut bright_sum = 0i32;
    let mut dark_sum = 0i32;
    for (i, &(dx, dy)) in CIRCLE_OFFSETS.iter().enumerate() {
        let v = gray.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as i16;
        let diff = v - center;
        if diff > threshold {
            bright_mask |= 1 << i;
            bright_sum += (diff - threshold) as i32;
        } else if diff < -threshold {
            dark_mask |= 1 << i;
            dark_sum += (-diff - threshold) as i32;
        }
    }
    let mut score = 0;
    if bright_mask.count_ones() >= ARC_LENGTH && has_arc(bright_mask) {
        score = bright_sum;
    }
    if dark_mask.count_ones() >= ARC_LENGTH && has_arc(dark_mask) {
        score = score.max(dark_sum);
    }
    score as f32
}

/// Detects FAST-9 corners at least `border` pixels away from every edge and
/// keeps only 3x3 local maxima of the score.
pub fn detect(gray: &GrayImage, threshold: u8, border: u32) -> Vec<Corner> {
    let (w, h) = gray.dimensions();
    let border = border.max(3);
    if w <= 2 * border || h <= 2 * border {
        return Vec::new();
    }
    let threshold = threshold as i16;
    let mut scores = vec![0.0f32; (w * h) as usize];
    scores
        .par_chunks_mut(w as usize)
        .enumerate()
        .skip(border as usize)
        .take((h - 2 * border) as usize)
        .for_each(|(y, row)| {
            for x in border..w - border {
                row[x as usize] = corner_score(gray, x, y as u32, threshold);
            }
        });

    let score_at = |x: u32, y: u32| scores[(y * w + x) as usize];
    let mut corners = Vec::new();
    for y in border..h - border {
        for x in border..w - border {
            let s = score_at(x, y);
            if s <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'nms: for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let n = score_at((x as i32 + dx) as u32, (y as i32 + dy) as u32);
                    // plateaus keep their first pixel in raster order
                    let earlier = dy < 0 || (dy == 0 && dx < 0);
                    if n > s || (earlier && n == s) {
                        is_max = false;
                        break 'nms;
                    }
                }
            }
            if is_max {
                corners.push(Corner { x, y, score: s });
            }
        }
    }
    corners
}
