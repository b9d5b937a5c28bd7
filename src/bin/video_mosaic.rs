use std::time::Instant;

use clap::Parser;
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use video_mosaic::capability::Capabilities;
use video_mosaic::display::{CancelToken, Display, HeadlessDisplay};
use video_mosaic::io::{SessionReport, save_mosaic, write_session_report};
use video_mosaic::source::{FrameSource, TakeSource, open_source};
use video_mosaic::{MosaicConfig, MosaicController};

#[derive(Parser)]
#[command(version, about, author)]
struct VmrsCli {
    /// image folder, glob pattern, .gif or video file; the camera is used when omitted
    video_file: Option<String>,

    /// camera index
    #[arg(short, long)]
    camera: Option<u32>,

    /// scale factor applied to every frame
    #[arg(short, long)]
    rescale: Option<f32>,

    /// json config, CLI flags override its values
    #[arg(long)]
    config: Option<String>,

    /// where to write the final mosaic
    #[arg(short, long, default_value = "mosaic.png")]
    output: String,

    /// optional json session report
    #[arg(long)]
    report: Option<String>,

    #[arg(long)]
    max_frames: Option<usize>,

    /// pacing between frames in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// record live frames and mosaic to an .rrd file
    #[arg(long)]
    rerun_save: Option<String>,

    /// open a rerun viewer
    #[arg(long)]
    view: bool,
}

/// Advances a progress bar for every frame read.
struct ProgressSource<S> {
    inner: S,
    bar: ProgressBar,
}

impl<S: FrameSource> FrameSource for ProgressSource<S> {
    fn next_frame(&mut self) -> video_mosaic::Result<Option<RgbImage>> {
        let frame = self.inner.next_frame();
        match &frame {
            Ok(Some(_)) | Err(_) => self.bar.inc(1),
            Ok(None) => self.bar.finish(),
        }
        frame
    }

    fn len_hint(&self) -> Option<usize> {
        self.inner.len_hint()
    }
}

#[cfg(feature = "visualization")]
fn make_display(cli: &VmrsCli, cancel: CancelToken) -> Result<Box<dyn Display>, Box<dyn std::error::Error>> {
    use video_mosaic::visualization::RerunDisplay;
    if cli.view || cli.rerun_save.is_some() {
        return Ok(Box::new(RerunDisplay::new(cli.rerun_save.as_deref(), cancel)?));
    }
    Ok(Box::new(HeadlessDisplay::new(cancel)))
}

#[cfg(not(feature = "visualization"))]
fn make_display(cli: &VmrsCli, cancel: CancelToken) -> Result<Box<dyn Display>, Box<dyn std::error::Error>> {
    if cli.view || cli.rerun_save.is_some() {
        log::warn!("built without rerun support, running headless");
    }
    Ok(Box::new(HeadlessDisplay::new(cancel)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = VmrsCli::parse();
    Capabilities::probe().log();

    let mut config = match &cli.config {
        Some(path) => MosaicConfig::from_json_file(path)?,
        None => MosaicConfig::default(),
    };
    if cli.video_file.is_some() {
        config.video_file_path = cli.video_file.clone();
    }
    if let Some(camera) = cli.camera {
        config.camera_index = camera;
    }
    if let Some(rescale) = cli.rescale {
        config.rescale_factor = rescale;
    }
    if let Some(interval) = cli.interval_ms {
        config.frame_interval_ms = interval;
    }
    config.validate()?;

    let mut source = open_source(&config)?;
    if let Some(max_frames) = cli.max_frames {
        source = Box::new(TakeSource::new(source, max_frames));
    }
    let bar = match source.len_hint() {
        Some(n) => ProgressBar::new(n as u64).with_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} frames {elapsed}")?,
        ),
        None => ProgressBar::hidden(),
    };
    let mut source = ProgressSource { inner: source, bar };

    let cancel = CancelToken::new();
    cancel.cancel_on_interrupt()?;
    let mut display = make_display(&cli, cancel)?;
    let mut controller = MosaicController::new(config)?;
    let now = Instant::now();
    controller.run(&mut source, display.as_mut());
    let duration_sec = now.elapsed().as_secs_f64();
    let stats = controller.stats();
    println!(
        "processed {} frames in {:.3} sec ({} merged, {} dropped)",
        stats.frames_processed,
        duration_sec,
        stats.frames_merged,
        stats.frames_dropped()
    );

    if let Some(path) = &cli.report {
        write_session_report(path, &SessionReport::new(stats, controller.mosaic()))?;
    }
    match controller.mosaic() {
        Some(mosaic) => {
            save_mosaic(&cli.output, mosaic)?;
            println!("mosaic {}x{} saved to {}", mosaic.width(), mosaic.height(), cli.output);
        }
        None => println!("no frame had enough features, nothing to save"),
    }
    Ok(())
}
