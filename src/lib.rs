pub mod config;
pub mod error;
pub mod metrics;
pub mod motion;
pub mod pipeline;
pub mod pose;
pub mod video;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use metrics::Handedness;
pub use pipeline::{CapturedFrame, SwingAnalysis, SwingPipeline, WindowAnalysis};
