//! Per-frame confidence cascade.
//!
//! Each frame runs an ordered list of attempt strategies. A strategy names the
//! model tier, the region it looks at, and the gate that decides whether it
//! runs given the best result so far. Later attempts only replace the best
//! result when they strictly improve its quality score.

use image::RgbImage;

use super::detector::{DetectorSet, ModelTier};
use super::keypoint::Landmarks;
use super::preprocess::upscale;
use super::roi::Roi;
use crate::config::ExtractorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Tracked region from the previous frame
    Roi,
    /// Whole, uncropped frame
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Always,
    /// Runs while the best result is weak
    Weak,
    /// Runs only while nothing has been found
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptStrategy {
    pub tier: ModelTier,
    pub region: Region,
    pub gate: Gate,
}

impl AttemptStrategy {
    const fn new(tier: ModelTier, region: Region, gate: Gate) -> Self {
        Self { tier, region, gate }
    }
}

/// Plan used while a tracked ROI is available.
pub const TRACKED_PLAN: [AttemptStrategy; 4] = [
    AttemptStrategy::new(ModelTier::Primary, Region::Roi, Gate::Always),
    AttemptStrategy::new(ModelTier::Primary, Region::Full, Gate::Weak),
    AttemptStrategy::new(ModelTier::Secondary, Region::Full, Gate::Weak),
    AttemptStrategy::new(ModelTier::Relaxed, Region::Full, Gate::Empty),
];

/// Plan used for a full-frame search (no ROI, or ROI dropped after misses).
pub const SEARCH_PLAN: [AttemptStrategy; 3] = [
    AttemptStrategy::new(ModelTier::Primary, Region::Full, Gate::Always),
    AttemptStrategy::new(ModelTier::Secondary, Region::Full, Gate::Weak),
    AttemptStrategy::new(ModelTier::Relaxed, Region::Full, Gate::Empty),
];

/// A scored pose.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub landmarks: Landmarks,
    pub quality: u32,
}

impl Candidate {
    pub fn none() -> Self {
        Self {
            landmarks: Landmarks::empty(),
            quality: 0,
        }
    }

    pub fn scored(landmarks: Landmarks) -> Self {
        let quality = landmarks.quality();
        Self { landmarks, quality }
    }

    /// Too few points, or quality below `min_points + 2`.
    pub fn is_weak(&self, min_points: usize) -> bool {
        self.landmarks.is_empty()
            || self.landmarks.count() < min_points
            || self.quality < min_points as u32 + 2
    }
}

impl Gate {
    pub fn admits(&self, best: &Candidate, min_points: usize) -> bool {
        match self {
            Gate::Always => true,
            Gate::Weak => best.is_weak(min_points),
            Gate::Empty => best.quality == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub strategy: AttemptStrategy,
    pub quality: u32,
    pub failed: bool,
}

#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub best: Candidate,
    /// Quality of the first attempt in the plan
    pub initial_quality: u32,
    pub selected: Option<AttemptStrategy>,
    pub attempts: Vec<AttemptRecord>,
}

impl CascadeOutcome {
    pub fn found(&self) -> bool {
        !self.best.landmarks.is_empty()
    }

    pub fn used_fallback(&self) -> bool {
        self.attempts.len() > 1
    }
}

fn run_attempt(
    strategy: &AttemptStrategy,
    frame: &RgbImage,
    roi: Option<&Roi>,
    detectors: &mut DetectorSet<'_>,
    config: &ExtractorConfig,
) -> (Candidate, bool) {
    let region = match (strategy.region, roi) {
        (Region::Roi, Some(roi)) => *roi,
        _ => Roi::full(frame.width(), frame.height()),
    };
    let input = if region.is_full() {
        upscale(frame, config.upscale)
    } else {
        upscale(&region.crop(frame), config.upscale)
    };

    match detectors.get(strategy.tier).detect(&input) {
        Ok(Some(local)) => (Candidate::scored(region.remap(&local)), false),
        Ok(None) => (Candidate::none(), false),
        Err(e) => {
            tracing::warn!(tier = strategy.tier.as_str(), "landmark inference failed: {:#}", e);
            (Candidate::none(), true)
        }
    }
}

/// Runs `plan` over one frame and keeps the best-scoring pose.
pub fn run_plan(
    plan: &[AttemptStrategy],
    frame: &RgbImage,
    roi: Option<&Roi>,
    detectors: &mut DetectorSet<'_>,
    config: &ExtractorConfig,
) -> CascadeOutcome {
    let start = CascadeOutcome {
        best: Candidate::none(),
        initial_quality: 0,
        selected: None,
        attempts: Vec::with_capacity(plan.len()),
    };

    plan.iter().fold(start, |mut outcome, strategy| {
        let first = outcome.attempts.is_empty();
        if !first && !strategy.gate.admits(&outcome.best, config.min_points) {
            return outcome;
        }

        let (candidate, failed) = run_attempt(strategy, frame, roi, detectors, config);
        outcome.attempts.push(AttemptRecord {
            strategy: *strategy,
            quality: candidate.quality,
            failed,
        });
        if first {
            outcome.initial_quality = candidate.quality;
        }
        if candidate.quality > outcome.best.quality {
            outcome.best = candidate;
            outcome.selected = Some(*strategy);
        }
        outcome
    })
}

/// Picks the plan for the tracking state and runs it.
pub fn run_cascade(
    frame: &RgbImage,
    roi: Option<&Roi>,
    detectors: &mut DetectorSet<'_>,
    config: &ExtractorConfig,
) -> CascadeOutcome {
    match roi {
        Some(_) => run_plan(&TRACKED_PLAN, frame, roi, detectors, config),
        None => run_plan(&SEARCH_PLAN, frame, None, detectors, config),
    }
}
