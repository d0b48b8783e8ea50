mod detector;
mod params;
mod rejection;

pub use detector::SoftCascadeDetector;
pub use params::{DetectorParams, DEFAULT_MAX_SCALE, DEFAULT_MIN_SCALE, DEFAULT_SCALES};
pub use rejection::{ParseRejectionError, RejectionCriteria};
