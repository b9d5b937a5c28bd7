pub mod canvas;
pub mod homography;
pub mod ransac;

pub use canvas::*;
pub use homography::Homography;
pub use ransac::*;
