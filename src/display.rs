use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use image::RgbImage;
use log::info;

use crate::error::{MosaicError, Result};
use crate::types::FeatureSet;

/// The two named image streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayStream {
    Live,
    Mosaic,
}

impl DisplayStream {
    pub fn name(&self) -> &'static str {
        match self {
            DisplayStream::Live => "live_input",
            DisplayStream::Mosaic => "mosaic_output",
        }
    }
}

/// Output side of the run loop.
pub trait Display {
    fn show(&mut self, stream: DisplayStream, image: &RgbImage);

    fn show_features(&mut self, _stream: DisplayStream, _features: &FeatureSet) {}

    /// Waits out the frame interval and reports whether the user asked to stop.
    fn poll_cancel(&mut self, wait: Duration) -> bool;
}

/// Shared stop flag, settable from another thread or a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancels this token on Ctrl-C / SIGTERM. A process holds at most one
    /// such handler; installing a second one fails.
    pub fn cancel_on_interrupt(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            info!("interrupted, stopping after the current frame");
            token.cancel();
        })
        .map_err(|e| MosaicError::Io(std::io::Error::other(e)))
    }
}

/// Paces frames in wall-clock time.
///
/// The wait is measured from the previous poll, so time spent processing a
/// frame counts towards the interval.
#[derive(Debug, Default)]
pub struct Pacer {
    last_poll: Option<Instant>,
}

impl Pacer {
    const SLICE: Duration = Duration::from_millis(10);

    pub fn wait(&mut self, interval: Duration, cancel: &CancelToken) -> bool {
        if let Some(last) = self.last_poll {
            let deadline = last + interval;
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                std::thread::sleep((deadline - now).min(Self::SLICE));
            }
        }
        self.last_poll = Some(Instant::now());
        cancel.is_cancelled()
    }
}

/// Shows nothing; only paces and watches a [`CancelToken`].
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    cancel: CancelToken,
    pacer: Pacer,
    shown: usize,
}

impl HeadlessDisplay {
    pub fn new(cancel: CancelToken) -> HeadlessDisplay {
        HeadlessDisplay {
            cancel,
            pacer: Pacer::default(),
            shown: 0,
        }
    }

    /// Images received across both streams.
    pub fn shown(&self) -> usize {
        self.shown
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, _stream: DisplayStream, _image: &RgbImage) {
        self.shown += 1;
    }

    fn poll_cancel(&mut self, wait: Duration) -> bool {
        self.pacer.wait(wait, &self.cancel)
    }
}
