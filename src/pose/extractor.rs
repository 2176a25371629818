//! Sequential landmark extraction with ROI tracking.
//!
//! The ROI for frame `i + 1` comes from the detection on frame `i`, so frames
//! are processed strictly in order and the tracking state is threaded through
//! the loop explicitly.

use tracing::{debug, info};

use super::cascade::{run_cascade, AttemptStrategy, CascadeOutcome, Region};
use super::detector::DetectorSet;
use super::keypoint::PoseFrame;
use super::roi::Roi;
use crate::config::ExtractorConfig;
use crate::video::FrameSample;

/// Per-run tracking state carried from one frame to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackingState {
    pub roi: Option<Roi>,
    pub miss_streak: u32,
}

impl TrackingState {
    /// ROI to crop to, if it is still trusted.
    pub fn usable_roi(&self, max_miss_streak: u32) -> Option<&Roi> {
        if self.miss_streak < max_miss_streak {
            self.roi.as_ref()
        } else {
            None
        }
    }

    fn after(self, outcome: &CascadeOutcome, width: u32, height: u32, config: &ExtractorConfig) -> Self {
        if outcome.found() {
            return Self {
                roi: Roi::from_landmarks(&outcome.best.landmarks, width, height, config),
                miss_streak: 0,
            };
        }
        let miss_streak = self.miss_streak.saturating_add(1);
        Self {
            roi: if miss_streak >= config.max_miss_streak { None } else { self.roi },
            miss_streak,
        }
    }
}

/// Counters for one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    pub frames: usize,
    pub frames_with_landmarks: usize,
    pub roi_attempts: usize,
    pub roi_selected: usize,
    pub fallback_frames: usize,
    pub failed_inferences: usize,
}

impl ExtractionSummary {
    fn record(&mut self, outcome: &CascadeOutcome) {
        self.frames += 1;
        if outcome.found() {
            self.frames_with_landmarks += 1;
        }
        if outcome.attempts.iter().any(|a| a.strategy.region == Region::Roi) {
            self.roi_attempts += 1;
        }
        if matches!(outcome.selected, Some(AttemptStrategy { region: Region::Roi, .. })) {
            self.roi_selected += 1;
        }
        if outcome.used_fallback() {
            self.fallback_frames += 1;
        }
        self.failed_inferences += outcome.attempts.iter().filter(|a| a.failed).count();
    }
}

pub struct LandmarkExtractor {
    config: ExtractorConfig,
}

impl LandmarkExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// One frame: run the cascade from `state`, return the pose and the next state.
    pub fn step(
        &self,
        state: TrackingState,
        frame: &FrameSample,
        detectors: &mut DetectorSet<'_>,
    ) -> (PoseFrame, TrackingState, CascadeOutcome) {
        let roi = state.usable_roi(self.config.max_miss_streak);
        let outcome = run_cascade(&frame.pixels, roi, detectors, &self.config);

        debug!(
            frame = frame.index,
            attempts = outcome.attempts.len(),
            quality = outcome.best.quality,
            selected = ?outcome.selected.map(|s| (s.tier.as_str(), s.region)),
            miss_streak = state.miss_streak,
            "cascade"
        );

        let next = state.after(&outcome, frame.pixels.width(), frame.pixels.height(), &self.config);
        let pose = PoseFrame::new(frame.index, frame.timestamp_sec, outcome.best.landmarks.clone());
        (pose, next, outcome)
    }

    /// Every frame yields a `PoseFrame`; total misses are empty landmark sets.
    pub fn extract(
        &self,
        frames: &[FrameSample],
        detectors: &mut DetectorSet<'_>,
    ) -> (Vec<PoseFrame>, ExtractionSummary) {
        let mut poses = Vec::with_capacity(frames.len());
        let mut summary = ExtractionSummary::default();

        let _final_state = frames.iter().fold(TrackingState::default(), |state, frame| {
            let (pose, next, outcome) = self.step(state, frame, detectors);
            summary.record(&outcome);
            poses.push(pose);
            next
        });

        info!(
            frames = summary.frames,
            with_landmarks = summary.frames_with_landmarks,
            roi_selected = summary.roi_selected,
            fallback_frames = summary.fallback_frames,
            "landmark extraction finished"
        );
        (poses, summary)
    }
}
