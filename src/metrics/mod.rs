pub mod biomech;
pub mod geometry;

pub use biomech::{
    derive_metrics, BiomechanicalMetrics, HandPathClass, HandVsChest, Handedness, Lead, LowerBodyLead,
};
pub use geometry::Displacement;
