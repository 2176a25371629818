//! End-to-end swing analysis over one clip.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{info, info_span, Instrument};

use crate::config::Config;
use crate::error::Result;
use crate::metrics::{derive_metrics, BiomechanicalMetrics, Handedness};
use crate::motion::{detect_phases, energy_series, MotionEnergySample, PhaseIndices, PhaseStrategy, SwingEvent};
use crate::pose::{DetectorSet, ExtractionSummary, LandmarkExtractor, PoseFrame};
use crate::video::{
    capture_frame, encode_jpeg, extract_window, sample_uniform, EncodedFrame, FrameSample, FrameSource,
    VideoInput, WindowRequest,
};

/// Key frame rendered for one swing event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedFrame {
    pub event: SwingEvent,
    pub index: usize,
    #[serde(flatten)]
    pub frame: EncodedFrame,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwingAnalysis {
    pub run_id: String,
    pub handedness: Handedness,
    pub duration_sec: f64,
    pub phases: PhaseIndices,
    pub phase_strategy: PhaseStrategy,
    /// Timestamps of `phases`, in event order.
    pub phase_timestamps: [f64; 5],
    pub energy: Vec<MotionEnergySample>,
    pub pose_frames: Vec<PoseFrame>,
    pub extraction: ExtractionSummary,
    pub metrics: BiomechanicalMetrics,
    pub key_frames: Vec<CapturedFrame>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowAnalysis {
    pub run_id: String,
    pub frames: Vec<PoseFrame>,
    pub jpegs: Vec<EncodedFrame>,
    pub extraction: ExtractionSummary,
}

static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_run_id() -> String {
    let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{seq}", chrono::Local::now().format("%Y%m%d-%H%M%S%.3f"))
}

pub struct SwingPipeline {
    config: Config,
    extractor: LandmarkExtractor,
}

impl SwingPipeline {
    pub fn new(config: Config) -> Self {
        let extractor = LandmarkExtractor::new(config.extractor.clone());
        Self { config, extractor }
    }

    /// Sample, detect phases, track landmarks, derive metrics and capture the
    /// five key frames. Blocking; frames are read and processed in order.
    pub fn run<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        detectors: &mut DetectorSet<'_>,
        handedness: Handedness,
    ) -> Result<SwingAnalysis> {
        let run_id = next_run_id();
        let span = info_span!("swing_run", run_id = %run_id, %handedness);
        let _enter = span.enter();

        let sampler = &self.config.sampler;
        let duration_sec = source.duration_sec();
        let frames = sample_uniform(source, sampler.sample_count, sampler.pose_width)?;
        info!(frames = frames.len(), duration_sec, "frames sampled");

        let energy = energy_series(&frames, sampler.energy_width);
        let detection = detect_phases(&energy, duration_sec, &self.config.phase);
        let phase_timestamps = detection.indices.timestamps(&energy);

        let (pose_frames, extraction) = self.extractor.extract(&frames, detectors);
        drop(frames);

        let metrics = derive_metrics(&detection.indices, &pose_frames, handedness, &self.config.metrics);

        let key_frames = SwingEvent::ALL
            .iter()
            .zip(phase_timestamps)
            .map(|(&event, t)| {
                let frame = capture_frame(source, t, sampler.capture_width, sampler.jpeg_quality)?;
                Ok(CapturedFrame {
                    event,
                    index: detection.indices.get(event),
                    frame,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            strategy = ?detection.strategy,
            phases = ?detection.indices.as_array(),
            with_landmarks = extraction.frames_with_landmarks,
            "swing analyzed"
        );

        Ok(SwingAnalysis {
            run_id,
            handedness,
            duration_sec,
            phases: detection.indices,
            phase_strategy: detection.strategy,
            phase_timestamps,
            energy,
            pose_frames,
            extraction,
            metrics,
            key_frames,
        })
    }

    /// Landmarks and JPEGs for an explicit time window, extracted by ffmpeg.
    pub async fn extract_window_poses(
        &self,
        input: &VideoInput,
        request: &WindowRequest,
        detectors: &mut DetectorSet<'_>,
    ) -> Result<WindowAnalysis> {
        let run_id = next_run_id();
        let span = info_span!("window_run", run_id = %run_id);

        let frames = async {
            let local = input.materialize().await?;
            extract_window(local.path(), request, &self.config.extract).await
        }
        .instrument(span.clone())
        .await?;

        span.in_scope(|| self.analyze_window_frames(run_id, &frames, detectors))
    }

    fn analyze_window_frames(
        &self,
        run_id: String,
        frames: &[FrameSample],
        detectors: &mut DetectorSet<'_>,
    ) -> Result<WindowAnalysis> {
        let (poses, extraction) = self.extractor.extract(frames, detectors);
        let jpegs = frames
            .iter()
            .map(|f| {
                Ok(EncodedFrame {
                    timestamp_sec: f.timestamp_sec,
                    width: f.pixels.width(),
                    height: f.pixels.height(),
                    jpeg: encode_jpeg(&f.pixels, self.config.sampler.jpeg_quality)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(frames = poses.len(), "window analyzed");
        Ok(WindowAnalysis {
            run_id,
            frames: poses,
            jpegs,
            extraction,
        })
    }

    /// Full analysis with the OpenCV decoder and the process-wide models.
    ///
    /// Must be called from a multi-threaded tokio runtime.
    #[cfg(feature = "desktop")]
    pub async fn analyze_video(&self, input: &VideoInput, handedness: Handedness) -> Result<SwingAnalysis> {
        use crate::pose::ModelRegistry;
        use crate::video::OpenCvVideo;

        let local = input.materialize().await?;
        let registry = ModelRegistry::global(&self.config.models);
        let [mut primary, mut secondary, mut relaxed] = registry.load_all().await?;

        tokio::task::block_in_place(|| {
            let mut video = OpenCvVideo::open(local.path())?;
            let mut detectors = DetectorSet::new(&mut primary, &mut secondary, &mut relaxed);
            self.run(&mut video, &mut detectors, handedness)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::detector::fakes::ScriptedDetector;
    use crate::pose::{Joint, Landmarks};
    use crate::video::sampler::fakes::SyntheticVideo;
    use image::RgbImage;

    fn body() -> Landmarks {
        Landmarks::empty()
            .with(Joint::LeftShoulder, 0.45, 0.35)
            .with(Joint::RightShoulder, 0.55, 0.35)
            .with(Joint::LeftElbow, 0.44, 0.45)
            .with(Joint::RightElbow, 0.56, 0.45)
            .with(Joint::LeftWrist, 0.49, 0.52)
            .with(Joint::RightWrist, 0.51, 0.52)
            .with(Joint::LeftHip, 0.46, 0.55)
            .with(Joint::RightHip, 0.54, 0.55)
            .with(Joint::LeftKnee, 0.46, 0.7)
            .with(Joint::RightKnee, 0.54, 0.7)
            .with(Joint::LeftAnkle, 0.46, 0.85)
            .with(Joint::RightAnkle, 0.54, 0.85)
    }

    /// Still, slow backswing, fast downswing, still.
    fn swing_brightness(t: f64) -> u8 {
        let v = if t < 0.8 {
            20.0
        } else if t < 2.0 {
            20.0 + (t - 0.8) * 30.0
        } else if t < 2.6 {
            56.0 + (t - 2.0) * 300.0
        } else {
            236.0
        };
        v as u8
    }

    fn pipeline() -> SwingPipeline {
        SwingPipeline::new(Config::default())
    }

    #[test]
    fn test_run_end_to_end() {
        let mut video = SyntheticVideo::new(3.9, swing_brightness);
        let mut primary = ScriptedDetector::new((0..40).map(|_| Ok(Some(body()))).collect());
        let mut secondary = ScriptedDetector::default();
        let mut relaxed = ScriptedDetector::default();

        let analysis = {
            let mut set = DetectorSet::new(&mut primary, &mut secondary, &mut relaxed);
            pipeline().run(&mut video, &mut set, Handedness::Right).unwrap()
        };

        assert_eq!(analysis.phase_strategy, PhaseStrategy::Extrema);
        assert_eq!(analysis.energy.len(), 40);
        assert_eq!(analysis.pose_frames.len(), 40);
        assert_eq!(analysis.extraction.frames_with_landmarks, 40);
        assert!(analysis.phases.as_array().iter().all(|&i| i < 40));

        let p = analysis.phases;
        assert!(p.downswing >= p.top.min(p.impact) && p.downswing <= p.top.max(p.impact));

        assert_eq!(analysis.key_frames.len(), 5);
        for (captured, event) in analysis.key_frames.iter().zip(SwingEvent::ALL) {
            assert_eq!(captured.event, event);
            assert_eq!(captured.frame.width, 480);
            assert_eq!(captured.index, p.get(event));
        }
        // 40 samples, then one re-seek per key frame
        assert_eq!(video.seeks.len(), 45);
        assert_eq!(&video.seeks[40..], &analysis.phase_timestamps[..]);

        assert!(analysis.metrics.norm_scale.is_some());
        assert_eq!(analysis.metrics.chest_rotation_deg, Some(0.0));
    }

    #[test]
    fn test_flat_clip_uses_fixed_ratio() {
        let mut video = SyntheticVideo::new(3.9, |_| 90);
        let mut primary = ScriptedDetector::default();
        let mut secondary = ScriptedDetector::default();
        let mut relaxed = ScriptedDetector::default();

        let analysis = {
            let mut set = DetectorSet::new(&mut primary, &mut secondary, &mut relaxed);
            pipeline().run(&mut video, &mut set, Handedness::Left).unwrap()
        };

        assert_eq!(analysis.phase_strategy, PhaseStrategy::FixedRatio);
        assert_eq!(analysis.extraction.frames_with_landmarks, 0);
        assert!(analysis.pose_frames.iter().all(|f| f.landmarks.is_empty()));
        assert!(analysis.metrics.norm_scale.is_none());
        assert_eq!(analysis.key_frames.len(), 5);
    }

    #[test]
    fn test_decode_failure_aborts_run() {
        let mut video = SyntheticVideo::new(3.9, swing_brightness);
        video.fail_after = Some(12);
        let mut primary = ScriptedDetector::default();
        let mut secondary = ScriptedDetector::default();
        let mut relaxed = ScriptedDetector::default();

        let mut set = DetectorSet::new(&mut primary, &mut secondary, &mut relaxed);
        let err = pipeline().run(&mut video, &mut set, Handedness::Right).unwrap_err();
        assert_eq!(err.reason_code(), "decode_error");
    }

    #[test]
    fn test_analysis_serializes_camel_case() {
        let mut video = SyntheticVideo::new(2.0, swing_brightness);
        let mut primary = ScriptedDetector::default();
        let mut secondary = ScriptedDetector::default();
        let mut relaxed = ScriptedDetector::default();

        let analysis = {
            let mut set = DetectorSet::new(&mut primary, &mut secondary, &mut relaxed);
            pipeline().run(&mut video, &mut set, Handedness::Right).unwrap()
        };
        let json = serde_json::to_value(&analysis).unwrap();

        assert_eq!(json["handedness"], "right");
        assert!(json["phaseTimestamps"].is_array());
        assert_eq!(json["keyFrames"][0]["event"], "address");
        assert!(json["keyFrames"][0]["jpegBase64"].as_str().unwrap().starts_with("/9j/"));
        assert!(json["poseFrames"][0]["pose"]["leftShoulder"].is_null());
        assert!(json["poseFrames"][0]["idx"].is_number());
    }

    #[test]
    fn test_window_frames_get_poses_and_jpegs() {
        let frames: Vec<FrameSample> = (0..3)
            .map(|i| FrameSample::new(i, 1.0 + i as f64 * 0.1, RgbImage::new(64, 48)))
            .collect();
        let mut primary = ScriptedDetector::new(vec![Ok(Some(body()))]);
        let mut secondary = ScriptedDetector::default();
        let mut relaxed = ScriptedDetector::default();

        let window = {
            let mut set = DetectorSet::new(&mut primary, &mut secondary, &mut relaxed);
            pipeline()
                .analyze_window_frames("w".to_string(), &frames, &mut set)
                .unwrap()
        };

        assert_eq!(window.frames.len(), 3);
        assert_eq!(window.jpegs.len(), 3);
        assert_eq!(window.frames[0].landmarks.count(), 12);
        assert!((window.jpegs[2].timestamp_sec - 1.2).abs() < 1e-9);
        assert_eq!(window.jpegs[0].width, 64);
        assert_eq!(window.extraction.frames, 3);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(next_run_id(), next_run_id());
    }
}
