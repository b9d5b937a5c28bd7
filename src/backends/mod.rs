//! Live and encoded-video frame sources behind optional features.

use image::RgbImage;
use rayon::prelude::*;

#[cfg(feature = "camera")]
pub mod camera;
#[cfg(feature = "ffmpeg")]
pub mod video;

#[cfg(feature = "camera")]
pub use camera::CameraSource;
#[cfg(feature = "ffmpeg")]
pub use video::VideoFileSource;

/// Container extensions routed to the video decoder.
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "avi", "mov", "mkv", "webm", "m4v"];

pub fn is_video_file(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    // BT.601, studio range
    let c = 1.164 * (y as f32 - 16.0);
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(c + 1.596 * e),
        clamp(c - 0.392 * d - 0.813 * e),
        clamp(c + 2.017 * d),
    ]
}

/// Converts a packed YUYV 4:2:2 buffer to RGB. `stride` is the row pitch in
/// bytes; `None` when the buffer is too short or the width is odd.
#[cfg_attr(not(feature = "camera"), allow(dead_code))]
pub(crate) fn yuyv_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Option<RgbImage> {
    let row_bytes = width as usize * 2;
    let stride = (stride as usize).max(row_bytes);
    let needed = match height as usize {
        0 => 0,
        h => stride * (h - 1) + row_bytes,
    };
    if width % 2 != 0 || data.len() < needed {
        return None;
    }
    let mut rgb = RgbImage::new(width, height);
    if width == 0 || height == 0 {
        return Some(rgb);
    }
    rgb.par_chunks_mut(width as usize * 3)
        .enumerate()
        .for_each(|(row, out)| {
            let src = &data[row * stride..row * stride + row_bytes];
            for (yuyv, px) in src.chunks_exact(4).zip(out.chunks_exact_mut(6)) {
                px[..3].copy_from_slice(&yuv_to_rgb(yuyv[0], yuyv[1], yuyv[3]));
                px[3..].copy_from_slice(&yuv_to_rgb(yuyv[2], yuyv[1], yuyv[3]));
            }
        });
    Some(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_extremes_and_padding() {
        // two rows of two pixels: black|white, then white|black, 8 byte pitch
        let data = [
            16, 128, 235, 128, 0, 0, 0, 0, //
            235, 128, 16, 128, 0, 0, 0, 0,
        ];
        let rgb = yuyv_to_rgb(&data, 2, 2, 8).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(0, 1).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 1).0, [0, 0, 0]);
    }

    #[test]
    fn yuyv_rejects_short_buffers() {
        assert!(yuyv_to_rgb(&[16, 128, 16], 2, 1, 4).is_none());
        assert!(yuyv_to_rgb(&[16, 128, 16, 128], 3, 1, 6).is_none());
        assert!(yuyv_to_rgb(&[], 0, 0, 0).is_some());
    }

    #[test]
    fn video_extensions() {
        assert!(is_video_file("clip.MP4"));
        assert!(is_video_file("/data/run 3/pan.mkv"));
        assert!(!is_video_file("frames/*.png"));
        assert!(!is_video_file("clip.gif"));
    }
}
