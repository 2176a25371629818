pub mod cascade;
pub mod detector;
pub mod extractor;
pub mod keypoint;
pub mod models;
pub mod preprocess;
pub mod roi;

pub use cascade::{run_cascade, AttemptStrategy, CascadeOutcome};
pub use detector::{DetectorSet, LandmarkDetector, ModelTier};
#[cfg(feature = "desktop")]
pub use detector::OnnxPoseModel;
pub use extractor::{ExtractionSummary, LandmarkExtractor, TrackingState};
pub use keypoint::{Joint, LandmarkPoint, Landmarks, PoseFrame};
#[cfg(feature = "desktop")]
pub use models::{ModelRegistry, SharedModel};
pub use roi::{bbox_from_landmarks, BBox, Roi};
