use std::collections::BTreeMap;
use std::path::Path;

use image::RgbImage;
use serde::{Serialize, de::DeserializeOwned};

use crate::controller::{MergeSummary, MosaicStats};
use crate::error::Result;

/// Serializes an object to a pretty-printed JSON file.
pub fn object_to_json<T: Serialize, P: AsRef<Path>>(output_path: P, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    std::fs::write(output_path, j)?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned, P: AsRef<Path>>(file_path: P) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Writes the mosaic as a raster image; the format follows the file extension.
pub fn save_mosaic<P: AsRef<Path>>(output_path: P, mosaic: &RgbImage) -> Result<()> {
    mosaic.save(output_path)?;
    Ok(())
}

/// Summary of one mosaicking session, written at shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub timestamp: String,
    pub frames_processed: usize,
    pub frames_seeded: usize,
    pub frames_merged: usize,
    pub frames_dropped: usize,
    pub dropped_by_reason: BTreeMap<String, usize>,
    pub mosaic_width: Option<u32>,
    pub mosaic_height: Option<u32>,
    pub merges: Vec<MergeSummary>,
}

impl SessionReport {
    pub fn new(stats: &MosaicStats, mosaic: Option<&RgbImage>) -> SessionReport {
        let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
        SessionReport {
            timestamp: now.to_string(),
            frames_processed: stats.frames_processed,
            frames_seeded: stats.frames_seeded,
            frames_merged: stats.frames_merged,
            frames_dropped: stats.frames_dropped(),
            dropped_by_reason: stats.dropped.clone(),
            mosaic_width: mosaic.map(|m| m.width()),
            mosaic_height: mosaic.map(|m| m.height()),
            merges: stats.merges.clone(),
        }
    }
}

pub fn write_session_report<P: AsRef<Path>>(output_path: P, report: &SessionReport) -> Result<()> {
    object_to_json(output_path, report)
}
