use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub phase: PhaseConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

/// 一様サンプリングとキーフレームキャプチャ
#[derive(Debug, Deserialize, Clone)]
pub struct SamplerConfig {
    /// 位相検出用サンプル数
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    /// モーションエネルギー計算用の縮小幅（px）
    #[serde(default = "default_energy_width")]
    pub energy_width: u32,
    /// ランドマーク推定に渡すフレーム幅（px）
    #[serde(default = "default_pose_width")]
    pub pose_width: u32,
    /// キーフレームJPEGの幅（px）
    #[serde(default = "default_capture_width")]
    pub capture_width: u32,
    /// JPEG品質 (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_sample_count() -> usize { 40 }
fn default_energy_width() -> u32 { 160 }
fn default_pose_width() -> u32 { 640 }
fn default_capture_width() -> u32 { 480 }
fn default_jpeg_quality() -> u8 { 70 }

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            energy_width: default_energy_width(),
            pose_width: default_pose_width(),
            capture_width: default_capture_width(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// 位相検出のフォールバック条件
#[derive(Debug, Deserialize, Clone)]
pub struct PhaseConfig {
    /// これより短い動画は固定比率で位相を決める（秒）
    #[serde(default = "default_min_duration_sec")]
    pub min_duration_sec: f64,
    /// エネルギーのレンジがこれ未満なら信号なしとみなす
    #[serde(default = "default_min_energy_range")]
    pub min_energy_range: f64,
}

fn default_min_duration_sec() -> f64 { 1.0 }
fn default_min_energy_range() -> f64 { 1e-3 }

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            min_duration_sec: default_min_duration_sec(),
            min_energy_range: default_min_energy_range(),
        }
    }
}

/// ROI追跡とフォールバックカスケード
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractorConfig {
    /// 推論前の拡大率（小さい被写体向け）
    #[serde(default = "default_upscale")]
    pub upscale: f32,
    /// 「弱い」結果とみなす検出点数の下限
    #[serde(default = "default_min_points")]
    pub min_points: usize,
    /// 連続ミスがこの回数に達したらROIを破棄
    #[serde(default = "default_max_miss_streak")]
    pub max_miss_streak: u32,
    /// パディング倍率
    #[serde(default = "default_pad_multiplier")]
    pub pad_multiplier: f32,
    /// ROI最小幅（肩幅の倍数）
    #[serde(default = "default_min_width_multiplier")]
    pub min_width_multiplier: f32,
    /// ROI最小高さ（肩幅の倍数）
    #[serde(default = "default_min_height_multiplier")]
    pub min_height_multiplier: f32,
}

fn default_upscale() -> f32 { 1.5 }
fn default_min_points() -> usize { 8 }
fn default_max_miss_streak() -> u32 { 2 }
fn default_pad_multiplier() -> f32 { 1.0 }
fn default_min_width_multiplier() -> f32 { 2.8 }
fn default_min_height_multiplier() -> f32 { 3.4 }

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            upscale: default_upscale(),
            min_points: default_min_points(),
            max_miss_streak: default_max_miss_streak(),
            pad_multiplier: default_pad_multiplier(),
            min_width_multiplier: default_min_width_multiplier(),
            min_height_multiplier: default_min_height_multiplier(),
        }
    }
}

/// 1つのランドマークモデル
#[derive(Debug, Deserialize, Clone)]
pub struct ModelSpec {
    /// cache_dir からの相対ファイル名
    pub file: String,
    /// ファイルが無いときのダウンロード元
    #[serde(default)]
    pub url: Option<String>,
    /// 入力サイズ（正方形）
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// 姿勢存在スコアの閾値
    #[serde(default = "default_detection_confidence")]
    pub min_detection_confidence: f32,
    /// 関節ごとの可視性閾値
    #[serde(default = "default_landmark_confidence")]
    pub min_landmark_confidence: f32,
}

fn default_input_size() -> u32 { 256 }
fn default_detection_confidence() -> f32 { 0.5 }
fn default_landmark_confidence() -> f32 { 0.5 }

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    /// モデルファイルのキャッシュ先
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// 動画モード（ROI追跡）用
    #[serde(default = "default_primary_model")]
    pub primary: ModelSpec,
    /// 単画像モード用
    #[serde(default = "default_secondary_model")]
    pub secondary: ModelSpec,
    /// 閾値を大きく緩めた最終手段
    #[serde(default = "default_relaxed_model")]
    pub relaxed: ModelSpec,
}

fn default_cache_dir() -> PathBuf { PathBuf::from("models") }

fn default_primary_model() -> ModelSpec {
    ModelSpec {
        file: "pose_landmark_full.onnx".to_string(),
        url: None,
        input_size: default_input_size(),
        min_detection_confidence: 0.5,
        min_landmark_confidence: 0.5,
    }
}

fn default_secondary_model() -> ModelSpec {
    ModelSpec {
        file: "pose_landmark_heavy.onnx".to_string(),
        url: None,
        input_size: default_input_size(),
        min_detection_confidence: 0.3,
        min_landmark_confidence: 0.3,
    }
}

fn default_relaxed_model() -> ModelSpec {
    ModelSpec {
        file: "pose_landmark_heavy.onnx".to_string(),
        url: None,
        input_size: default_input_size(),
        min_detection_confidence: 0.1,
        min_landmark_confidence: 0.1,
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            primary: default_primary_model(),
            secondary: default_secondary_model(),
            relaxed: default_relaxed_model(),
        }
    }
}

/// 生体力学メトリクスの閾値
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    /// 動き出し判定の最小閾値（正規化座標）
    #[serde(default = "default_min_motion_threshold")]
    pub min_motion_threshold: f64,
    /// 肩幅に対する動き出し閾値の比率
    #[serde(default = "default_motion_threshold_scale")]
    pub motion_threshold_scale: f64,
    /// hand_first とみなす比率
    #[serde(default = "default_hand_first_ratio")]
    pub hand_first_ratio: f64,
    /// torso_first とみなす比率
    #[serde(default = "default_torso_first_ratio")]
    pub torso_first_ratio: f64,
    /// 肩回転の基準角（度）
    #[serde(default = "default_rotation_reference_deg")]
    pub rotation_reference_deg: f64,
}

fn default_min_motion_threshold() -> f64 { 0.012 }
fn default_motion_threshold_scale() -> f64 { 0.12 }
fn default_hand_first_ratio() -> f64 { 1.25 }
fn default_torso_first_ratio() -> f64 { 0.85 }
fn default_rotation_reference_deg() -> f64 { 45.0 }

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            min_motion_threshold: default_min_motion_threshold(),
            motion_threshold_scale: default_motion_threshold_scale(),
            hand_first_ratio: default_hand_first_ratio(),
            torso_first_ratio: default_torso_first_ratio(),
            rotation_reference_deg: default_rotation_reference_deg(),
        }
    }
}

/// ffmpegによる区間抽出
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    /// ffmpeg 実行ファイル
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// プロセスのタイムアウト（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_min_fps")]
    pub min_fps: f64,
    #[serde(default = "default_max_fps")]
    pub max_fps: f64,
    /// 1回の抽出で返す最大フレーム数
    #[serde(default = "default_max_frames_cap")]
    pub max_frames_cap: usize,
    /// 抽出フレームの幅（px）
    #[serde(default = "default_pose_width")]
    pub width: u32,
}

fn default_ffmpeg_path() -> String { "ffmpeg".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_min_fps() -> f64 { 5.0 }
fn default_max_fps() -> f64 { 30.0 }
fn default_max_frames_cap() -> usize { 120 }

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            timeout_secs: default_timeout_secs(),
            min_fps: default_min_fps(),
            max_fps: default_max_fps(),
            max_frames_cap: default_max_frames_cap(),
            width: default_pose_width(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// 読めなければデフォルト設定
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}; using default config", e);
                Self::default()
            }
        }
    }
}
