mod frame;
pub mod extract;
pub mod input;
pub mod sampler;

#[cfg(feature = "desktop")]
pub mod capture;

pub use extract::{extract_window, WindowRequest};
pub use frame::FrameSample;
pub use input::{LocalVideo, VideoInput};
pub use sampler::{capture_frame, encode_jpeg, sample_uniform, EncodedFrame, FrameSource};

#[cfg(feature = "desktop")]
pub use capture::OpenCvVideo;
