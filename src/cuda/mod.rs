//! GPU memory and execution streams owned on the Rust side.

mod gpu_mat;
mod stream;

pub use gpu_mat::{GpuMat, MatType};
pub use stream::Stream;

/// Output of a detect call: an opaque matrix populated by the native library.
pub type DetectionBuffer = GpuMat;
