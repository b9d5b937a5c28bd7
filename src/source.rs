//! Frame sources: anything that yields RGB frames one at a time.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use glob::glob;
use image::codecs::gif::GifDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, DynamicImage, Frame, ImageReader, RgbImage};
use log::{debug, info, trace, warn};

use crate::backends::is_video_file;
use crate::config::MosaicConfig;
use crate::error::{MosaicError, Result};

pub trait FrameSource: Send {
    /// `Ok(None)` means the stream is exhausted. `Err` is a transient read
    /// failure; the caller may keep reading.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Number of frames left, when known.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).next_frame()
    }

    fn len_hint(&self) -> Option<usize> {
        (**self).len_hint()
    }
}

/// Frames held in memory, yielded in order.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<RgbImage>,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>) -> MemorySource {
        MemorySource {
            frames: frames.into(),
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    let p = rp.ok()?;
    let name = p.as_os_str().to_string_lossy().to_lowercase();
    [".png", ".jpg", ".jpeg", ".bmp"]
        .iter()
        .any(|ext| name.ends_with(ext))
        .then_some(p)
}

/// Still images read in lexicographic path order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceSource {
    /// `location` is either a directory or a glob pattern.
    pub fn open(location: &str) -> Result<ImageSequenceSource> {
        let pattern = if Path::new(location).is_dir() {
            format!("{}/*", location.trim_end_matches('/'))
        } else {
            location.to_string()
        };
        let entries = glob(&pattern)
            .map_err(|e| MosaicError::SourceUnavailable(format!("bad pattern {}: {}", pattern, e)))?;
        let mut paths: Vec<PathBuf> = entries.filter_map(img_filter).collect();
        paths.sort();
        if paths.is_empty() {
            return Err(MosaicError::SourceUnavailable(format!("no images match {}", pattern)));
        }
        info!("image sequence: {} frames from {}", paths.len(), pattern);
        Ok(ImageSequenceSource { paths, next: 0 })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        // advance first so an unreadable file is skipped on the next call
        self.next += 1;
        trace!("reading {}", path.display());
        let img = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| MosaicError::ReadFailed(format!("{}: {}", path.display(), e)))?
            .decode()
            .map_err(|e| MosaicError::ReadFailed(format!("{}: {}", path.display(), e)))?;
        Ok(Some(img.into_rgb8()))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.paths.len() - self.next)
    }
}

/// Frames of an animated GIF, decoded up front and composited to full size.
pub struct GifSource {
    frames: VecDeque<Frame>,
}

impl GifSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<GifSource> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MosaicError::SourceUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let decoder = GifDecoder::new(BufReader::new(file))?;
        let frames = decoder.into_frames().collect_frames()?;
        info!("gif: {} frames from {}", frames.len(), path.display());
        Ok(GifSource {
            frames: frames.into(),
        })
    }
}

impl FrameSource for GifSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self
            .frames
            .pop_front()
            .map(|f| DynamicImage::ImageRgba8(f.into_buffer()).into_rgb8()))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}

/// Scales every frame of `inner` by a constant factor.
pub struct RescaledSource<S> {
    inner: S,
    factor: f32,
}

impl<S: FrameSource> RescaledSource<S> {
    pub fn new(inner: S, factor: f32) -> RescaledSource<S> {
        RescaledSource { inner, factor }
    }
}

impl<S: FrameSource> FrameSource for RescaledSource<S> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(frame) = self.inner.next_frame()? else {
            return Ok(None);
        };
        let w = ((frame.width() as f32 * self.factor).round() as u32).max(1);
        let h = ((frame.height() as f32 * self.factor).round() as u32).max(1);
        if (w, h) == frame.dimensions() {
            return Ok(Some(frame));
        }
        Ok(Some(imageops::resize(&frame, w, h, FilterType::Triangle)))
    }

    fn len_hint(&self) -> Option<usize> {
        self.inner.len_hint()
    }
}

/// Stops after `limit` frames.
pub struct TakeSource<S> {
    inner: S,
    remaining: usize,
}

impl<S: FrameSource> TakeSource<S> {
    pub fn new(inner: S, limit: usize) -> TakeSource<S> {
        TakeSource {
            inner,
            remaining: limit,
        }
    }
}

impl<S: FrameSource> FrameSource for TakeSource<S> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let frame = self.inner.next_frame()?;
        if frame.is_some() {
            self.remaining -= 1;
        }
        Ok(frame)
    }

    fn len_hint(&self) -> Option<usize> {
        Some(
            self.inner
                .len_hint()
                .map_or(self.remaining, |n| n.min(self.remaining)),
        )
    }
}

#[derive(Default)]
struct Slot {
    frame: Option<RgbImage>,
    error: Option<String>,
    finished: bool,
    overwritten: usize,
}

type Shared = Arc<(Mutex<Slot>, Condvar)>;

/// Reads `inner` on a background thread and keeps only the newest frame.
///
/// A consumer slower than the producer sees the latest frame; older unread
/// frames are overwritten.
pub struct LatestFrameSource {
    shared: Shared,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

fn produce<S: FrameSource>(mut inner: S, shared: Shared, stop: Arc<AtomicBool>) {
    let (lock, cvar) = &*shared;
    while !stop.load(Ordering::Relaxed) {
        let result = inner.next_frame();
        let Ok(mut slot) = lock.lock() else {
            break;
        };
        match result {
            Ok(Some(frame)) => {
                if slot.frame.replace(frame).is_some() {
                    slot.overwritten += 1;
                }
            }
            Ok(None) => {
                slot.finished = true;
                cvar.notify_all();
                break;
            }
            Err(e) => slot.error = Some(e.to_string()),
        }
        cvar.notify_all();
    }
    if let Ok(mut slot) = lock.lock() {
        slot.finished = true;
    }
    cvar.notify_all();
}

impl LatestFrameSource {
    pub fn spawn<S: FrameSource + 'static>(inner: S) -> LatestFrameSource {
        let shared: Shared = Arc::new((Mutex::new(Slot::default()), Condvar::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let shared = shared.clone();
            let stop = stop.clone();
            std::thread::spawn(move || produce(inner, shared, stop))
        };
        LatestFrameSource {
            shared,
            stop,
            handle: Some(handle),
        }
    }

    /// Frames the producer replaced before they were read.
    pub fn overwritten(&self) -> usize {
        self.shared.0.lock().map_or(0, |s| s.overwritten)
    }
}

impl FrameSource for LatestFrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let poisoned = |_| MosaicError::ReadFailed("frame slot poisoned".to_string());
        let (lock, cvar) = &*self.shared;
        let mut slot = lock.lock().map_err(poisoned)?;
        loop {
            if let Some(frame) = slot.frame.take() {
                return Ok(Some(frame));
            }
            if let Some(e) = slot.error.take() {
                return Err(MosaicError::ReadFailed(e));
            }
            if slot.finished {
                return Ok(None);
            }
            slot = cvar.wait(slot).map_err(poisoned)?;
        }
    }
}

impl Drop for LatestFrameSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("frame reader thread panicked");
            }
        }
    }
}

#[cfg(feature = "ffmpeg")]
fn open_video_file(path: &str) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(crate::backends::VideoFileSource::open(path)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video_file(path: &str) -> Result<Box<dyn FrameSource>> {
    Err(MosaicError::SourceUnavailable(format!(
        "{} is a video file but video decoding is not built in (enable the ffmpeg feature)",
        path
    )))
}

#[cfg(feature = "camera")]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(crate::backends::CameraSource::open(index)?))
}

#[cfg(not(feature = "camera"))]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>> {
    Err(MosaicError::SourceUnavailable(format!(
        "camera {} requested but camera capture is not built in (enable the camera feature)",
        index
    )))
}

/// Builds the source described by `config`: a GIF, video file or image
/// sequence when `video_file_path` is set, otherwise the camera. Backends
/// left out of the build report `SourceUnavailable`.
pub fn open_source(config: &MosaicConfig) -> Result<Box<dyn FrameSource>> {
    let mut source: Box<dyn FrameSource> = match &config.video_file_path {
        Some(path) if path.to_lowercase().ends_with(".gif") => Box::new(GifSource::open(path)?),
        Some(path) if is_video_file(path) => open_video_file(path)?,
        Some(path) => Box::new(ImageSequenceSource::open(path)?),
        None => open_camera(config.camera_index)?,
    };
    if config.rescale_factor != 1.0 {
        debug!("rescaling frames by {}", config.rescale_factor);
        source = Box::new(RescaledSource::new(source, config.rescale_factor));
    }
    if config.latest_frame_only {
        debug!("reading frames on a background thread");
        source = Box::new(LatestFrameSource::spawn(source));
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_source_stops_early() {
        let frames = vec![RgbImage::new(2, 2); 5];
        let mut source = TakeSource::new(MemorySource::new(frames), 3);
        assert_eq!(source.len_hint(), Some(3));
        let mut n = 0;
        while source.next_frame().unwrap().is_some() {
            n += 1;
        }
        assert_eq!(n, 3);
    }

    #[cfg(not(feature = "camera"))]
    #[test]
    fn camera_is_unavailable() {
        let config = MosaicConfig::default();
        assert!(matches!(
            open_source(&config),
            Err(MosaicError::SourceUnavailable(_))
        ));
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn video_file_needs_the_decoder() {
        let config = MosaicConfig {
            video_file_path: Some("flight.mp4".to_string()),
            ..Default::default()
        };
        match open_source(&config) {
            Err(MosaicError::SourceUnavailable(msg)) => assert!(msg.contains("ffmpeg"), "{}", msg),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("video file opened without a decoder"),
        }
    }

    #[cfg(feature = "ffmpeg")]
    #[test]
    fn missing_video_file_is_unavailable() {
        let config = MosaicConfig {
            video_file_path: Some("/nonexistent/flight.mp4".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            open_source(&config),
            Err(MosaicError::SourceUnavailable(_))
        ));
    }
}
