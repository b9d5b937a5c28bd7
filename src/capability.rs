use log::info;
use serde::Serialize;

/// What this build can read from and draw to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub version: &'static str,
    pub sources: Vec<&'static str>,
    pub displays: Vec<&'static str>,
    pub worker_threads: usize,
}

impl Capabilities {
    pub fn probe() -> Capabilities {
        let mut displays = vec!["headless"];
        if cfg!(feature = "visualization") {
            displays.push("rerun");
        }
        let mut sources = vec!["image_sequence", "gif"];
        if cfg!(feature = "ffmpeg") {
            sources.push("video_file");
        }
        if cfg!(feature = "camera") {
            sources.push("camera");
        }
        Capabilities {
            version: env!("CARGO_PKG_VERSION"),
            sources,
            displays,
            worker_threads: rayon::current_num_threads(),
        }
    }

    pub fn log(&self) {
        info!(
            "video-mosaic {}: sources [{}], displays [{}], {} worker threads",
            self.version,
            self.sources.join(", "),
            self.displays.join(", "),
            self.worker_threads
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_follow_enabled_backends() {
        let caps = Capabilities::probe();
        assert!(caps.sources.starts_with(&["image_sequence", "gif"]));
        assert_eq!(caps.sources.contains(&"video_file"), cfg!(feature = "ffmpeg"));
        assert_eq!(caps.sources.contains(&"camera"), cfg!(feature = "camera"));
        assert!(caps.worker_threads >= 1);
    }
}
