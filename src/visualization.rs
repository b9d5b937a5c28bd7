use std::io::Cursor;
use std::time::Duration;

use image::RgbImage;
use log::warn;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rerun::{RecordingStream, RecordingStreamBuilder, TimeCell};

use crate::display::{CancelToken, Display, DisplayStream, Pacer};
use crate::error::{MosaicError, Result};
use crate::types::FeatureSet;

pub fn id_to_color(id: usize) -> (u8, u8, u8, u8) {
    let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
    let color_num = rng.random_range(0..2u32.pow(24));
    (
        ((color_num >> 16) % 256) as u8,
        ((color_num >> 8) % 256) as u8,
        (color_num % 256) as u8,
        255,
    )
}

/// rerun use top left corner as (0, 0)
pub fn rerun_shift(p2ds: &[(f32, f32)]) -> Vec<(f32, f32)> {
    p2ds.iter().map(|(x, y)| (*x + 0.5, *y + 0.5)).collect()
}

pub fn log_image_as_compressed(
    recording: &RecordingStream,
    topic: &str,
    img: &RgbImage,
) -> Result<()> {
    let mut bytes: Vec<u8> = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    recording
        .log(
            format!("{}/image", topic),
            &rerun::EncodedImage::from_file_contents(bytes),
        )
        .map_err(|e| MosaicError::Io(std::io::Error::other(e)))
}

/// Streams live frames, keypoints and the mosaic to a rerun viewer or `.rrd` file.
pub struct RerunDisplay {
    recording: RecordingStream,
    cancel: CancelToken,
    pacer: Pacer,
    frame_idx: i64,
}

impl RerunDisplay {
    /// Spawns a viewer, or records to `save_path` when given.
    pub fn new(save_path: Option<&str>, cancel: CancelToken) -> Result<RerunDisplay> {
        let builder = RecordingStreamBuilder::new("video_mosaic");
        let recording = match save_path {
            Some(path) => builder.save(path),
            None => builder.spawn(),
        }
        .map_err(|e| MosaicError::Io(std::io::Error::other(e)))?;
        Ok(RerunDisplay {
            recording,
            cancel,
            pacer: Pacer::default(),
            frame_idx: 0,
        })
    }
}

impl Display for RerunDisplay {
    fn show(&mut self, stream: DisplayStream, image: &RgbImage) {
        self.recording
            .set_time("frame", TimeCell::from_sequence(self.frame_idx));
        if let Err(e) = log_image_as_compressed(&self.recording, stream.name(), image) {
            warn!("failed to log {}: {}", stream.name(), e);
        }
    }

    fn show_features(&mut self, stream: DisplayStream, features: &FeatureSet) {
        let (pts, colors): (Vec<_>, Vec<_>) = features
            .keypoints()
            .iter()
            .enumerate()
            .map(|(i, kp)| ((kp.p2d.x, kp.p2d.y), id_to_color(i)))
            .unzip();
        let pts = rerun_shift(&pts);
        let logged = self.recording.log(
            format!("{}/pts", stream.name()),
            &rerun::Points2D::new(pts)
                .with_colors(colors)
                .with_radii([rerun::Radius::new_ui_points(3.0)]),
        );
        if let Err(e) = logged {
            warn!("failed to log keypoints: {}", e);
        }
    }

    fn poll_cancel(&mut self, wait: Duration) -> bool {
        self.frame_idx += 1;
        self.pacer.wait(wait, &self.cancel)
    }
}
