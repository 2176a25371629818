pub mod energy;
pub mod phase;

pub use energy::{energy_series, motion_energy, MotionEnergySample};
pub use phase::{detect_phases, PhaseDetection, PhaseIndices, PhaseStrategy, SwingEvent};
