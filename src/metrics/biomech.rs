use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::geometry::{
    angle_change_deg, line_angle_deg, tilt_from_vertical_deg, Displacement, Point2,
};
use crate::config::MetricsConfig;
use crate::error::PipelineError;
use crate::motion::PhaseIndices;
use crate::pose::{Joint, Landmarks, PoseFrame};

/// 打者の利き手
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// リード側（ターゲット側）の手首。右打ちは左手首。
    pub fn lead_wrist(&self) -> Joint {
        match self {
            Handedness::Right => Joint::LeftWrist,
            Handedness::Left => Joint::RightWrist,
        }
    }
}

impl FromStr for Handedness {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Handedness::Left),
            "right" => Ok(Handedness::Right),
            other => Err(PipelineError::invalid_input(format!(
                "handedness must be \"left\" or \"right\", got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lead {
    LowerBody,
    Chest,
    Unclear,
}

/// ダウンスイングで腰と胸のどちらが先に動き出したか
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowerBodyLead {
    pub hip_start_index: Option<usize>,
    pub chest_start_index: Option<usize>,
    pub threshold: f64,
    pub lead: Lead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandPathClass {
    HandFirst,
    TorsoFirst,
    Mixed,
    Unclear,
}

/// トップ→インパクトの手の移動量と肩の回転量の比
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandVsChest {
    pub hand_advance_norm: Option<f64>,
    pub shoulder_rotation_deg: Option<f64>,
    pub ratio: Option<f64>,
    pub classification: HandPathClass,
}

/// フェーズ時点のランドマークから求めた指標（欠損は null）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BiomechanicalMetrics {
    pub norm_scale: Option<f64>,
    pub lower_body_lead: LowerBodyLead,
    pub hand_vs_chest: HandVsChest,
    pub chest_rotation_deg: Option<f64>,
    pub head_sway: Option<Displacement>,
    pub knee_sway: Option<Displacement>,
    pub spine_tilt_address_deg: Option<f64>,
    pub spine_tilt_top_deg: Option<f64>,
    pub spine_tilt_delta_deg: Option<f64>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn landmarks_at(frames: &[PoseFrame], index: usize) -> Option<&Landmarks> {
    frames.get(index).map(|f| &f.landmarks)
}

fn point<F>(frames: &[PoseFrame], index: usize, f: F) -> Option<Point2>
where
    F: Fn(&Landmarks) -> Option<crate::pose::LandmarkPoint>,
{
    landmarks_at(frames, index).and_then(f).map(Point2::from)
}

/// 正規化スケール: アドレス時の肩幅（無ければトップ時）
fn norm_scale(frames: &[PoseFrame], phases: &PhaseIndices) -> Option<f64> {
    [phases.address, phases.top]
        .iter()
        .filter_map(|&i| landmarks_at(frames, i).and_then(Landmarks::shoulder_width))
        .map(|w| w as f64)
        .find(|w| w.is_finite() && *w > 0.0)
}

/// `baseline` から `threshold` を超えて離れた最初のフレーム
fn first_departure<F>(frames: &[PoseFrame], from: usize, to: usize, threshold: f64, center: F) -> Option<usize>
where
    F: Fn(&Landmarks) -> Option<crate::pose::LandmarkPoint>,
{
    let baseline = point(frames, from, &center)?;
    (from..=to).find(|&i| {
        point(frames, i, &center).is_some_and(|p| p.distance(&baseline) > threshold)
    })
}

fn lower_body_lead(
    frames: &[PoseFrame],
    phases: &PhaseIndices,
    scale: Option<f64>,
    config: &MetricsConfig,
) -> LowerBodyLead {
    let threshold = scale.map_or(config.min_motion_threshold, |s| {
        config.min_motion_threshold.max(s * config.motion_threshold_scale)
    });

    let (hip_start_index, chest_start_index) = if phases.top <= phases.impact {
        (
            first_departure(frames, phases.top, phases.impact, threshold, Landmarks::hip_center),
            first_departure(frames, phases.top, phases.impact, threshold, Landmarks::shoulder_center),
        )
    } else {
        (None, None)
    };

    let lead = match (hip_start_index, chest_start_index) {
        (Some(h), Some(c)) if h <= c => Lead::LowerBody,
        (Some(_), Some(_)) => Lead::Chest,
        _ => Lead::Unclear,
    };

    LowerBodyLead {
        hip_start_index,
        chest_start_index,
        threshold,
        lead,
    }
}

/// リード手首、無ければ検出できた手首の平均
fn hand_point(lm: &Landmarks, handedness: Handedness) -> Option<Point2> {
    if let Some(p) = lm.get(handedness.lead_wrist()) {
        return Some(p.into());
    }
    let wrists: Vec<Point2> = [Joint::LeftWrist, Joint::RightWrist]
        .iter()
        .filter_map(|&j| lm.get(j))
        .map(Point2::from)
        .collect();
    if wrists.is_empty() {
        return None;
    }
    let n = wrists.len() as f64;
    Some(Point2::new(
        wrists.iter().map(|p| p.x).sum::<f64>() / n,
        wrists.iter().map(|p| p.y).sum::<f64>() / n,
    ))
}

fn shoulder_angle(lm: &Landmarks) -> Option<f64> {
    let l = lm.get(Joint::LeftShoulder)?;
    let r = lm.get(Joint::RightShoulder)?;
    finite(line_angle_deg(l.into(), r.into()))
}

fn shoulder_rotation(frames: &[PoseFrame], phases: &PhaseIndices) -> Option<f64> {
    let top = shoulder_angle(landmarks_at(frames, phases.top)?)?;
    let impact = shoulder_angle(landmarks_at(frames, phases.impact)?)?;
    finite(angle_change_deg(top, impact))
}

fn hand_vs_chest(
    frames: &[PoseFrame],
    phases: &PhaseIndices,
    handedness: Handedness,
    scale: Option<f64>,
    rotation: Option<f64>,
    config: &MetricsConfig,
) -> HandVsChest {
    let hand_advance_norm = (|| {
        let top = hand_point(landmarks_at(frames, phases.top)?, handedness)?;
        let impact = hand_point(landmarks_at(frames, phases.impact)?, handedness)?;
        finite(top.distance(&impact) / scale?)
    })();

    let ratio = match (hand_advance_norm, rotation) {
        (Some(hand), Some(rot)) => {
            finite(hand / (rot / config.rotation_reference_deg).max(0.001))
        }
        _ => None,
    };

    HandVsChest {
        hand_advance_norm,
        shoulder_rotation_deg: rotation,
        ratio,
        classification: classify_hand_path(ratio, config),
    }
}

fn classify_hand_path(ratio: Option<f64>, config: &MetricsConfig) -> HandPathClass {
    match ratio {
        Some(r) if r >= config.hand_first_ratio => HandPathClass::HandFirst,
        Some(r) if r <= config.torso_first_ratio => HandPathClass::TorsoFirst,
        Some(_) => HandPathClass::Mixed,
        None => HandPathClass::Unclear,
    }
}

fn sway<F>(frames: &[PoseFrame], phases: &PhaseIndices, scale: Option<f64>, center: F) -> Option<Displacement>
where
    F: Fn(&Landmarks) -> Option<crate::pose::LandmarkPoint>,
{
    let from = point(frames, phases.address, &center)?;
    let to = point(frames, phases.top, &center)?;
    Some(Displacement::between(from, to, scale))
}

/// 腰中心→肩中心ベクトルの鉛直からの傾き
fn spine_tilt(frames: &[PoseFrame], index: usize) -> Option<f64> {
    let lm = landmarks_at(frames, index)?;
    let hip = Point2::from(lm.hip_center()?);
    let shoulder = Point2::from(lm.shoulder_center()?);
    finite(tilt_from_vertical_deg(hip, shoulder))
}

/// フェーズインデックスとフレーム列から指標を算出する
///
/// `frames[i]` がサンプル `i` に対応する前提。欠けた関節に依存する指標だけが
/// null になり、他の指標は通常通り計算される。
pub fn derive_metrics(
    phases: &PhaseIndices,
    frames: &[PoseFrame],
    handedness: Handedness,
    config: &MetricsConfig,
) -> BiomechanicalMetrics {
    let scale = norm_scale(frames, phases);
    let rotation = shoulder_rotation(frames, phases);
    let tilt_address = spine_tilt(frames, phases.address);
    let tilt_top = spine_tilt(frames, phases.top);

    let metrics = BiomechanicalMetrics {
        norm_scale: scale,
        lower_body_lead: lower_body_lead(frames, phases, scale, config),
        hand_vs_chest: hand_vs_chest(frames, phases, handedness, scale, rotation, config),
        chest_rotation_deg: rotation,
        head_sway: sway(frames, phases, scale, Landmarks::shoulder_center),
        knee_sway: sway(frames, phases, scale, Landmarks::knee_center),
        spine_tilt_address_deg: tilt_address,
        spine_tilt_top_deg: tilt_top,
        spine_tilt_delta_deg: match (tilt_address, tilt_top) {
            (Some(a), Some(t)) => finite(angle_change_deg(a, t)),
            _ => None,
        },
    };

    debug!(
        norm_scale = ?metrics.norm_scale,
        lead = ?metrics.lower_body_lead.lead,
        hand_path = ?metrics.hand_vs_chest.classification,
        "metrics derived"
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: usize, lm: Landmarks) -> PoseFrame {
        PoseFrame::new(index, index as f64 * 0.1, lm)
    }

    /// 肩・腰・膝・手首を指定オフセットで配置した姿勢
    fn body(hip_dx: f32, chest_dx: f32, shoulder_tilt: f32, wrist: (f32, f32)) -> Landmarks {
        Landmarks::empty()
            .with(Joint::LeftShoulder, 0.40 + chest_dx, 0.30 - shoulder_tilt)
            .with(Joint::RightShoulder, 0.60 + chest_dx, 0.30 + shoulder_tilt)
            .with(Joint::LeftHip, 0.45 + hip_dx, 0.55)
            .with(Joint::RightHip, 0.55 + hip_dx, 0.55)
            .with(Joint::LeftKnee, 0.45, 0.72)
            .with(Joint::RightKnee, 0.55, 0.72)
            .with(Joint::LeftWrist, wrist.0, wrist.1)
            .with(Joint::RightWrist, wrist.0 + 0.02, wrist.1)
    }

    fn phases() -> PhaseIndices {
        PhaseIndices {
            address: 0,
            top: 1,
            downswing: 2,
            impact: 4,
            finish: 5,
        }
    }

    fn swing() -> Vec<PoseFrame> {
        vec![
            frame(0, body(0.0, 0.0, 0.0, (0.50, 0.50))),
            frame(1, body(0.0, 0.0, 0.05, (0.30, 0.20))),
            frame(2, body(0.05, 0.0, 0.05, (0.35, 0.30))),
            frame(3, body(0.06, 0.04, 0.02, (0.45, 0.45))),
            frame(4, body(0.07, 0.05, 0.0, (0.50, 0.50))),
            frame(5, body(0.07, 0.05, 0.0, (0.60, 0.20))),
        ]
    }

    #[test]
    fn test_handedness_parse() {
        assert_eq!("LEFT".parse::<Handedness>().unwrap(), Handedness::Left);
        assert_eq!(" right ".parse::<Handedness>().unwrap(), Handedness::Right);
        let err = "ambi".parse::<Handedness>().unwrap_err();
        assert_eq!(err.reason_code(), "invalid_input");
        assert_eq!(Handedness::Right.lead_wrist(), Joint::LeftWrist);
    }

    #[test]
    fn test_norm_scale_is_address_shoulder_width() {
        let m = derive_metrics(&phases(), &swing(), Handedness::Right, &MetricsConfig::default());
        assert!((m.norm_scale.unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_norm_scale_falls_back_to_top() {
        let mut frames = swing();
        frames[0].landmarks.set(Joint::RightShoulder, None);
        let m = derive_metrics(&phases(), &frames, Handedness::Right, &MetricsConfig::default());
        assert!(m.norm_scale.is_some());
    }

    #[test]
    fn test_lower_body_leads() {
        let m = derive_metrics(&phases(), &swing(), Handedness::Right, &MetricsConfig::default());
        let lead = m.lower_body_lead;
        // 閾値 = max(0.012, 0.2 * 0.12) = 0.024
        assert!((lead.threshold - 0.024).abs() < 1e-6);
        assert_eq!(lead.hip_start_index, Some(2));
        assert_eq!(lead.chest_start_index, Some(3));
        assert_eq!(lead.lead, Lead::LowerBody);
    }

    /// 腰・胸の横ずれをフレームごとに与えた6フレーム
    fn shifted(hip_dx: [f32; 6], chest_dx: [f32; 6]) -> Vec<PoseFrame> {
        (0..6)
            .map(|i| frame(i, body(hip_dx[i], chest_dx[i], 0.0, (0.5, 0.5))))
            .collect()
    }

    #[test]
    fn test_lower_body_lead_cases() {
        let reversed = PhaseIndices {
            top: 4,
            impact: 1,
            ..phases()
        };
        let cases = [
            // 腰が先
            ([0.0, 0.0, 0.05, 0.05, 0.05, 0.05], [0.0, 0.0, 0.0, 0.05, 0.05, 0.05], phases(), Some(2), Some(3), Lead::LowerBody),
            // 胸が先
            ([0.0, 0.0, 0.0, 0.05, 0.05, 0.05], [0.0, 0.0, 0.05, 0.05, 0.05, 0.05], phases(), Some(3), Some(2), Lead::Chest),
            // 同時は腰リード
            ([0.0, 0.0, 0.05, 0.05, 0.05, 0.05], [0.0, 0.0, 0.05, 0.05, 0.05, 0.05], phases(), Some(2), Some(2), Lead::LowerBody),
            // 胸が動かない
            ([0.0, 0.0, 0.05, 0.05, 0.05, 0.05], [0.0; 6], phases(), Some(2), None, Lead::Unclear),
            // 閾値 0.024 以下の動きは開始とみなさない
            ([0.0, 0.0, 0.02, 0.02, 0.02, 0.02], [0.0, 0.0, 0.05, 0.05, 0.05, 0.05], phases(), None, Some(2), Lead::Unclear),
            // トップがインパクトより後
            ([0.0, 0.0, 0.05, 0.05, 0.05, 0.05], [0.0, 0.0, 0.0, 0.05, 0.05, 0.05], reversed, None, None, Lead::Unclear),
        ];

        for (i, (hip, chest, ph, hip_start, chest_start, lead)) in cases.into_iter().enumerate() {
            let m = derive_metrics(&ph, &shifted(hip, chest), Handedness::Right, &MetricsConfig::default());
            let got = m.lower_body_lead;
            assert_eq!(got.hip_start_index, hip_start, "case {i}");
            assert_eq!(got.chest_start_index, chest_start, "case {i}");
            assert_eq!(got.lead, lead, "case {i}");
        }
    }

    #[test]
    fn test_hand_path_thresholds() {
        let cfg = MetricsConfig::default();
        for (ratio, expected) in [
            (Some(3.0), HandPathClass::HandFirst),
            (Some(1.25), HandPathClass::HandFirst),
            (Some(1.2499), HandPathClass::Mixed),
            (Some(1.0), HandPathClass::Mixed),
            (Some(0.8501), HandPathClass::Mixed),
            (Some(0.85), HandPathClass::TorsoFirst),
            (Some(0.1), HandPathClass::TorsoFirst),
            (None, HandPathClass::Unclear),
        ] {
            assert_eq!(classify_hand_path(ratio, &cfg), expected, "ratio={ratio:?}");
        }
    }

    #[test]
    fn test_hand_path_from_swing() {
        // 肩の回転は swing() と同じ約26.6°、手首の移動量だけ変える
        let with_impact_wrist = |x: f32| {
            let mut frames = swing();
            frames[1] = frame(1, body(0.0, 0.0, 0.05, (0.50, 0.50)));
            frames[4] = frame(4, body(0.07, 0.05, 0.0, (x, 0.50)));
            derive_metrics(&phases(), &frames, Handedness::Right, &MetricsConfig::default()).hand_vs_chest
        };

        // 0.02 / 0.2 = 0.1 → 比 ≈ 0.17
        let torso = with_impact_wrist(0.52);
        assert_eq!(torso.classification, HandPathClass::TorsoFirst);
        assert!(torso.ratio.unwrap() < 0.85);

        // 0.118 / 0.2 = 0.59 → 比 ≈ 1.0
        let mixed = with_impact_wrist(0.618);
        assert_eq!(mixed.classification, HandPathClass::Mixed);
        let r = mixed.ratio.unwrap();
        assert!(r > 0.85 && r < 1.25);
    }

    #[test]
    fn test_hand_vs_chest_ratio() {
        let m = derive_metrics(&phases(), &swing(), Handedness::Right, &MetricsConfig::default());
        let hvc = m.hand_vs_chest;

        // 手首 (0.30,0.20)→(0.50,0.50): 距離 ≈ 0.3606 / 肩幅 0.2
        let hand = hvc.hand_advance_norm.unwrap();
        assert!((hand - 1.8028).abs() < 1e-3);
        let rot = hvc.shoulder_rotation_deg.unwrap();
        assert!(rot > 20.0 && rot < 30.0);
        assert_eq!(m.chest_rotation_deg, Some(rot));
        let ratio = hvc.ratio.unwrap();
        assert!((ratio - hand / (rot / 45.0)).abs() < 1e-9);
        assert_eq!(hvc.classification, HandPathClass::HandFirst);
    }

    #[test]
    fn test_no_rotation_uses_floor() {
        let frames: Vec<PoseFrame> = (0..6)
            .map(|i| frame(i, body(0.0, 0.0, 0.0, (0.5, 0.5 - i as f32 * 0.0001))))
            .collect();
        let m = derive_metrics(&phases(), &frames, Handedness::Right, &MetricsConfig::default());
        assert_eq!(m.hand_vs_chest.shoulder_rotation_deg, Some(0.0));
        // 0.0003 / 0.2 / 0.001
        assert!((m.hand_vs_chest.ratio.unwrap() - 1.5).abs() < 1e-2);
    }

    #[test]
    fn test_lead_wrist_falls_back_to_average() {
        let full = derive_metrics(&phases(), &swing(), Handedness::Right, &MetricsConfig::default());

        let mut frames = swing();
        frames[1].landmarks.set(Joint::LeftWrist, None);
        let m = derive_metrics(&phases(), &frames, Handedness::Right, &MetricsConfig::default());
        // トップは右手首 (0.32, 0.20) で代用
        let hand = m.hand_vs_chest.hand_advance_norm.unwrap();
        assert!((hand - full.hand_vs_chest.hand_advance_norm.unwrap()).abs() > 1e-3);

        let mut frames = swing();
        for f in frames.iter_mut() {
            f.landmarks.set(Joint::LeftWrist, None);
            f.landmarks.set(Joint::RightWrist, None);
        }
        let m = derive_metrics(&phases(), &frames, Handedness::Left, &MetricsConfig::default());
        assert!(m.hand_vs_chest.hand_advance_norm.is_none());
        assert_eq!(m.hand_vs_chest.classification, HandPathClass::Unclear);
        assert!(m.chest_rotation_deg.is_some());
    }

    #[test]
    fn test_sway_and_spine_tilt() {
        let m = derive_metrics(&phases(), &swing(), Handedness::Right, &MetricsConfig::default());
        let head = m.head_sway.unwrap();
        assert!(head.dist.abs() < 1e-6);
        let knee = m.knee_sway.unwrap();
        assert_eq!(knee.dist_norm, Some(0.0));
        assert!(m.spine_tilt_address_deg.unwrap().abs() < 1e-3);
        assert!(m.spine_tilt_delta_deg.unwrap() < 1e-3);
    }

    #[test]
    fn test_missing_hips_degrade_gracefully() {
        let mut frames = swing();
        for f in frames.iter_mut() {
            f.landmarks.set(Joint::LeftHip, None);
            f.landmarks.set(Joint::RightHip, None);
        }
        let m = derive_metrics(&phases(), &frames, Handedness::Right, &MetricsConfig::default());

        assert_eq!(m.lower_body_lead.lead, Lead::Unclear);
        assert!(m.lower_body_lead.hip_start_index.is_none());
        assert!(m.spine_tilt_delta_deg.is_none());
        assert!(m.chest_rotation_deg.is_some());
        assert!(m.head_sway.is_some());
    }

    #[test]
    fn test_empty_frames_are_all_null() {
        let m = derive_metrics(&phases(), &[], Handedness::Right, &MetricsConfig::default());
        assert!(m.norm_scale.is_none());
        assert_eq!(m.lower_body_lead.lead, Lead::Unclear);
        assert!((m.lower_body_lead.threshold - 0.012).abs() < 1e-12);
        assert_eq!(m.hand_vs_chest.classification, HandPathClass::Unclear);
        assert!(m.head_sway.is_none());

        let json = serde_json::to_value(m).unwrap();
        assert!(json["normScale"].is_null());
        assert_eq!(json["lowerBodyLead"]["lead"], "unclear");
        assert_eq!(json["handVsChest"]["classification"], "unclear");
        assert!(json["spineTiltDeltaDeg"].is_null());
    }
}
