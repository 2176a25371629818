use anyhow::Result;
use image::RgbImage;

use super::keypoint::{Joint, Landmarks};
use super::preprocess::LetterboxInfo;

/// 1枚の画像から12関節を推定する検出器
///
/// 返す座標は渡された画像に対する正規化座標。姿勢が見つからなければ `Ok(None)`。
pub trait LandmarkDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<Landmarks>>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<Landmarks>> {
        (**self).detect(image)
    }
}

/// カスケードで使うモデルの段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// 動画モード（ROI追跡と組み合わせる）
    Primary,
    /// 単画像モード
    Secondary,
    /// 閾値を緩めた最終手段
    Relaxed,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Primary => "primary",
            ModelTier::Secondary => "secondary",
            ModelTier::Relaxed => "relaxed",
        }
    }
}

/// 1回の実行で使う3段の検出器
pub struct DetectorSet<'a> {
    pub primary: &'a mut dyn LandmarkDetector,
    pub secondary: &'a mut dyn LandmarkDetector,
    pub relaxed: &'a mut dyn LandmarkDetector,
}

impl<'a> DetectorSet<'a> {
    pub fn new(
        primary: &'a mut dyn LandmarkDetector,
        secondary: &'a mut dyn LandmarkDetector,
        relaxed: &'a mut dyn LandmarkDetector,
    ) -> Self {
        Self {
            primary,
            secondary,
            relaxed,
        }
    }

    pub fn get(&mut self, tier: ModelTier) -> &mut (dyn LandmarkDetector + 'a) {
        match tier {
            ModelTier::Primary => &mut *self.primary,
            ModelTier::Secondary => &mut *self.secondary,
            ModelTier::Relaxed => &mut *self.relaxed,
        }
    }
}

/// BlazePose 出力: 39点 × (x, y, z, visibility, presence)
const BLAZEPOSE_POINTS: usize = 39;
const BLAZEPOSE_STRIDE: usize = 5;

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// BlazePose の生出力を12関節に変換する
///
/// `pose_flag` はモデル内でシグモイド済みの確率としてそのまま閾値と比べる。
/// visibility はロジットなのでシグモイドを掛けてから比べる。
pub fn decode_blazepose(
    raw: &[f32],
    pose_flag: Option<f32>,
    letterbox: &LetterboxInfo,
    min_detection_confidence: f32,
    min_landmark_confidence: f32,
) -> Result<Option<Landmarks>> {
    if raw.len() < BLAZEPOSE_POINTS * BLAZEPOSE_STRIDE {
        anyhow::bail!("unexpected landmark tensor length {}", raw.len());
    }

    let pose_score = pose_flag.filter(|v| v.is_finite()).unwrap_or(0.0);
    if pose_score < min_detection_confidence {
        return Ok(None);
    }

    let mut landmarks = Landmarks::empty();
    for joint in Joint::ALL {
        let base = joint.blazepose_index() * BLAZEPOSE_STRIDE;
        if sigmoid(raw[base + 3]) < min_landmark_confidence {
            continue;
        }
        landmarks.set(joint, Some(letterbox.to_source(raw[base], raw[base + 1])));
    }

    if landmarks.is_empty() {
        return Ok(None);
    }
    Ok(Some(landmarks))
}

#[cfg(feature = "desktop")]
pub use onnx::OnnxPoseModel;

#[cfg(feature = "desktop")]
mod onnx {
    use anyhow::{Context, Result};
    use image::RgbImage;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;

    use crate::config::ModelSpec;
    use crate::pose::keypoint::Landmarks;
    use crate::pose::preprocess::preprocess_for_landmarks;

    use super::{decode_blazepose, LandmarkDetector};

    fn build_session(model_path: &Path) -> Result<Session> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?;

        #[cfg(feature = "cuda")]
        let builder = {
            tracing::info!("attempting CUDA execution provider");
            builder.with_execution_providers([
                ort::execution_providers::CUDAExecutionProvider::default().build(),
            ])?
        };

        builder
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ONNX model {}", model_path.display()))
    }

    /// BlazePose系ランドマークモデル
    pub struct OnnxPoseModel {
        session: Session,
        input_size: u32,
        min_detection_confidence: f32,
        min_landmark_confidence: f32,
    }

    impl OnnxPoseModel {
        pub fn new<P: AsRef<Path>>(model_path: P, spec: &ModelSpec) -> Result<Self> {
            if spec.input_size == 0 {
                anyhow::bail!("{}: input_size must be positive", spec.file);
            }
            let session = build_session(model_path.as_ref())?;
            Ok(Self {
                session,
                input_size: spec.input_size,
                min_detection_confidence: spec.min_detection_confidence,
                min_landmark_confidence: spec.min_landmark_confidence,
            })
        }
    }

    impl LandmarkDetector for OnnxPoseModel {
        fn detect(&mut self, image: &RgbImage) -> Result<Option<Landmarks>> {
            let (input, letterbox) = preprocess_for_landmarks(image, self.input_size);
            let input_tensor = Tensor::from_array(input)?;
            let outputs = self
                .session
                .run(ort::inputs![input_tensor])
                .context("Inference failed")?;

            let raw: ndarray::ArrayViewD<f32> = outputs[0]
                .try_extract_array()
                .context("Failed to extract landmark tensor")?;
            let presence: ndarray::ArrayViewD<f32> = outputs[1]
                .try_extract_array()
                .context("Failed to extract pose flag")?;

            let flat: Vec<f32> = raw.iter().copied().collect();
            decode_blazepose(
                &flat,
                presence.iter().next().copied(),
                &letterbox,
                self.min_detection_confidence,
                self.min_landmark_confidence,
            )
        }
    }
}
