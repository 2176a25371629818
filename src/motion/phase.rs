//! Swing phase indices from the motion-energy series.
//!
//! Address, Top and Finish are the stillest samples in their windows, Impact
//! is the busiest. A flat or too-short clip falls back to fixed time ratios.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::energy::MotionEnergySample;
use crate::config::PhaseConfig;

/// Named swing events, in temporal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingEvent {
    Address,
    Top,
    Downswing,
    Impact,
    Finish,
}

impl SwingEvent {
    pub const ALL: [SwingEvent; 5] = [
        SwingEvent::Address,
        SwingEvent::Top,
        SwingEvent::Downswing,
        SwingEvent::Impact,
        SwingEvent::Finish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SwingEvent::Address => "address",
            SwingEvent::Top => "top",
            SwingEvent::Downswing => "downswing",
            SwingEvent::Impact => "impact",
            SwingEvent::Finish => "finish",
        }
    }

    /// Share of the clip duration used when the energy signal is uninformative.
    pub fn fallback_ratio(&self) -> f64 {
        match self {
            SwingEvent::Address => 0.05,
            SwingEvent::Top => 0.35,
            SwingEvent::Downswing => 0.55,
            SwingEvent::Impact => 0.75,
            SwingEvent::Finish => 0.95,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseIndices {
    pub address: usize,
    pub top: usize,
    pub downswing: usize,
    pub impact: usize,
    pub finish: usize,
}

impl PhaseIndices {
    pub fn get(&self, event: SwingEvent) -> usize {
        match event {
            SwingEvent::Address => self.address,
            SwingEvent::Top => self.top,
            SwingEvent::Downswing => self.downswing,
            SwingEvent::Impact => self.impact,
            SwingEvent::Finish => self.finish,
        }
    }

    /// Indices in `SwingEvent::ALL` order.
    pub fn as_array(&self) -> [usize; 5] {
        SwingEvent::ALL.map(|e| self.get(e))
    }

    /// Timestamp of each phase sample, 0 where the index is out of range.
    pub fn timestamps(&self, samples: &[MotionEnergySample]) -> [f64; 5] {
        self.as_array()
            .map(|i| samples.get(i).map_or(0.0, |s| s.timestamp_sec))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStrategy {
    Extrema,
    FixedRatio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDetection {
    pub indices: PhaseIndices,
    pub strategy: PhaseStrategy,
}

/// Inclusive `[floor(a·n), ceil(b·n)]`, clamped to `[0, n-1]`. Requires `n > 0`.
fn window(n: usize, a: f64, b: f64) -> (usize, usize) {
    let last = n - 1;
    let start = ((a * n as f64).floor().max(0.0) as usize).min(last);
    let end = ((b * n as f64).ceil().max(0.0) as usize).min(last);
    (start, end.max(start))
}

/// First index of the extremum within the window; `better(candidate, best)`
/// must be strict so ties keep the earliest sample.
fn scan(energy: &[f64], (start, end): (usize, usize), better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = start;
    for i in start + 1..=end {
        if better(energy[i], energy[best]) {
            best = i;
        }
    }
    best
}

fn argmin(energy: &[f64], w: (usize, usize)) -> usize {
    scan(energy, w, |c, b| c < b)
}

fn argmax(energy: &[f64], w: (usize, usize)) -> usize {
    scan(energy, w, |c, b| c > b)
}

fn energy_range(energy: &[f64]) -> f64 {
    let (lo, hi) = energy
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &e| (lo.min(e), hi.max(e)));
    hi - lo
}

/// Windowed extrema search over a non-empty series.
pub fn extrema_indices(energy: &[f64]) -> PhaseIndices {
    let n = energy.len();
    if n == 0 {
        return PhaseIndices::default();
    }
    let address = argmin(energy, window(n, 0.0, 0.20));
    let top = argmin(energy, window(n, 0.35, 0.60));
    let impact = argmax(energy, window(n, 0.40, 0.80));
    let finish = argmin(energy, window(n, 0.80, 1.0));

    let lo = top.min(impact);
    let hi = top.max(impact);
    let downswing = (((top + impact) as f64) / 2.0).round() as usize;

    PhaseIndices {
        address,
        top,
        downswing: downswing.clamp(lo, hi),
        impact,
        finish,
    }
}

/// Sample whose timestamp is nearest `t`; ties go to the earlier sample.
fn nearest_sample(samples: &[MotionEnergySample], t: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, s) in samples.iter().enumerate() {
        let dist = (s.timestamp_sec - t).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

/// Fixed ratios of `duration_sec`, each mapped to the nearest sample.
pub fn fixed_ratio_indices(samples: &[MotionEnergySample], duration_sec: f64) -> PhaseIndices {
    if samples.is_empty() {
        return PhaseIndices::default();
    }
    let duration = if duration_sec.is_finite() { duration_sec.max(0.0) } else { 0.0 };
    let at = |e: SwingEvent| nearest_sample(samples, e.fallback_ratio() * duration);
    PhaseIndices {
        address: at(SwingEvent::Address),
        top: at(SwingEvent::Top),
        downswing: at(SwingEvent::Downswing),
        impact: at(SwingEvent::Impact),
        finish: at(SwingEvent::Finish),
    }
}

/// Never fails; `strategy` records which path produced the indices.
pub fn detect_phases(
    samples: &[MotionEnergySample],
    duration_sec: f64,
    config: &PhaseConfig,
) -> PhaseDetection {
    let energy: Vec<f64> = samples.iter().map(|s| s.energy).collect();
    let degenerate = energy.is_empty()
        || !(duration_sec >= config.min_duration_sec)
        || !(energy_range(&energy) >= config.min_energy_range);

    let detection = if degenerate {
        PhaseDetection {
            indices: fixed_ratio_indices(samples, duration_sec),
            strategy: PhaseStrategy::FixedRatio,
        }
    } else {
        PhaseDetection {
            indices: extrema_indices(&energy),
            strategy: PhaseStrategy::Extrema,
        }
    };

    debug!(
        samples = samples.len(),
        duration_sec,
        strategy = ?detection.strategy,
        indices = ?detection.indices.as_array(),
        "phases detected"
    );
    detection
}
