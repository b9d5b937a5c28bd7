pub mod backends;
pub mod capability;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod features;
pub mod geometry;
pub mod io;
pub mod matching;
pub mod merge;
pub mod source;
pub mod synthetic;
pub mod types;

#[cfg(feature = "visualization")]
pub mod visualization;

pub use config::MosaicConfig;
pub use controller::{ControllerState, FrameOutcome, MosaicController, MosaicStats};
pub use error::{MosaicError, Result};
