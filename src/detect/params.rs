use super::rejection::RejectionCriteria;

pub const DEFAULT_MIN_SCALE: f64 = 0.4;
pub const DEFAULT_MAX_SCALE: f64 = 5.0;
pub const DEFAULT_SCALES: i32 = 55;

/// Search configuration handed to the native create call.
///
/// Values are forwarded as-is. `min_scale < max_scale` and `scales > 0` are
/// the caller's contract; the native library decides what happens otherwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorParams {
    /// Smallest image scale, relative to the input frame, to search.
    pub min_scale: f64,
    /// Largest image scale, relative to the input frame, to search.
    pub max_scale: f64,
    /// Number of scale levels sampled between `min_scale` and `max_scale`.
    pub scales: i32,
    pub rejection: RejectionCriteria,
}

impl DetectorParams {
    pub fn with_scale_range(mut self, min_scale: f64, max_scale: f64) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    pub fn with_scales(mut self, scales: i32) -> Self {
        self.scales = scales;
        self
    }

    pub fn with_rejection(mut self, rejection: RejectionCriteria) -> Self {
        self.rejection = rejection;
        self
    }
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            scales: DEFAULT_SCALES,
            rejection: RejectionCriteria::DEFAULT,
        }
    }
}
