use image::RgbImage;
use log::info;
use v4l::buffer::Type;
use v4l::format::FourCC;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::yuyv_to_rgb;
use crate::error::{MosaicError, Result};
use crate::source::FrameSource;

/// Frames from a V4L2 camera, captured as YUYV over memory-mapped buffers.
pub struct CameraSource {
    stream: MmapStream<'static>,
    _device: Device,
    width: u32,
    height: u32,
    stride: u32,
}

impl CameraSource {
    pub fn open(index: u32) -> Result<CameraSource> {
        let unavailable = |what: &str, e: std::io::Error| {
            MosaicError::SourceUnavailable(format!("camera {}: {}: {}", index, what, e))
        };
        let device = Device::new(index as usize).map_err(|e| unavailable("open", e))?;
        let mut format = device.format().map_err(|e| unavailable("query format", e))?;
        format.fourcc = FourCC::new(b"YUYV");
        let format = device.set_format(&format).map_err(|e| unavailable("set format", e))?;
        if format.fourcc != FourCC::new(b"YUYV") {
            return Err(MosaicError::SourceUnavailable(format!(
                "camera {} does not deliver YUYV (got {:?})",
                index, format.fourcc
            )));
        }
        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, 4)
            .map_err(|e| unavailable("start stream", e))?;
        info!("camera {}: {}x{} YUYV", index, format.width, format.height);
        Ok(CameraSource {
            stream,
            _device: device,
            width: format.width,
            height: format.height,
            stride: format.stride,
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let (data, _) = self
            .stream
            .next()
            .map_err(|e| MosaicError::ReadFailed(format!("camera capture: {}", e)))?;
        yuyv_to_rgb(data, self.width, self.height, self.stride)
            .map(Some)
            .ok_or_else(|| MosaicError::ReadFailed(format!("short camera buffer ({} bytes)", data.len())))
    }
}
