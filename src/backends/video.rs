use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::util::frame::Video;
use image::RgbImage;
use log::info;

use crate::error::{MosaicError, Result};
use crate::source::FrameSource;

/// Frames decoded from the best video stream of a container file.
pub struct VideoFileSource {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    remaining: Option<usize>,
    flushed: bool,
}

fn unavailable(path: &Path, e: impl std::fmt::Display) -> MosaicError {
    MosaicError::SourceUnavailable(format!("{}: {}", path.display(), e))
}

fn read_failed(e: ffmpeg::Error) -> MosaicError {
    MosaicError::ReadFailed(format!("video decode: {}", e))
}

impl VideoFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<VideoFileSource> {
        let path = path.as_ref();
        ffmpeg::init().map_err(|e| unavailable(path, e))?;
        let input = ffmpeg::format::input(&path).map_err(|e| unavailable(path, e))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| unavailable(path, "no video stream"))?;
        let stream_index = stream.index();
        let remaining = usize::try_from(stream.frames()).ok().filter(|n| *n > 0);
        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|e| unavailable(path, e))?;
        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| unavailable(path, e))?;
        info!(
            "{}: {}x{} video, {} frames",
            path.display(),
            decoder.width(),
            decoder.height(),
            remaining.map_or("unknown".to_string(), |n| n.to_string())
        );
        Ok(VideoFileSource {
            input,
            decoder,
            scaler,
            stream_index,
            remaining,
            flushed: false,
        })
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        let index = self.stream_index;
        self.input
            .packets()
            .find(|(stream, _)| stream.index() == index)
            .map(|(_, packet)| packet)
    }

    fn convert(&mut self, decoded: &Video) -> Result<RgbImage> {
        let mut rgb = Video::empty();
        self.scaler.run(decoded, &mut rgb).map_err(read_failed)?;
        let (width, height) = (rgb.width(), rgb.height());
        let row_bytes = width as usize * 3;
        let stride = rgb.stride(0);
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in rgb.data(0).chunks(stride).take(height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }
        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| MosaicError::ReadFailed("decoded frame has a short plane".to_string()))
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                self.remaining = self.remaining.map(|n| n.saturating_sub(1));
                return self.convert(&decoded).map(Some);
            }
            if self.flushed {
                return Ok(None);
            }
            match self.next_packet() {
                Some(packet) => self.decoder.send_packet(&packet).map_err(read_failed)?,
                None => {
                    self.decoder.send_eof().map_err(read_failed)?;
                    self.flushed = true;
                }
            }
        }
    }

    fn len_hint(&self) -> Option<usize> {
        self.remaining
    }
}
