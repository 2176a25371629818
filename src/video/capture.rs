use image::RgbImage;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use std::path::Path;

use super::sampler::FrameSource;
use crate::error::{PipelineError, Result};

fn cv_err(context: &str) -> impl Fn(opencv::Error) -> PipelineError + '_ {
    move |e| PipelineError::decode(format!("{context}: {e}"))
}

/// OpenCVを使用した動画ファイルのデコード
pub struct OpenCvVideo {
    capture: VideoCapture,
    width: u32,
    height: u32,
    fps: f64,
    duration_sec: f64,
}

impl OpenCvVideo {
    /// 動画ファイルを開く
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| PipelineError::decode(format!("non UTF-8 path {}", path.display())))?;

        let mut capture = VideoCapture::from_file(path_str, VideoCaptureAPIs::CAP_ANY as i32)
            .map_err(cv_err("failed to open video"))?;
        if !capture.is_opened().map_err(cv_err("failed to open video"))? {
            return Err(PipelineError::decode(format!("cannot open {}", path.display())));
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(cv_err("metadata"))? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(cv_err("metadata"))? as u32;
        let fps = capture.get(videoio::CAP_PROP_FPS).map_err(cv_err("metadata"))?;
        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT).map_err(cv_err("metadata"))?;

        let mut duration_sec = if fps > 0.0 && frame_count > 0.0 { frame_count / fps } else { 0.0 };
        if !duration_sec.is_finite() || duration_sec <= 0.0 {
            duration_sec = probe_duration(&mut capture)?;
        }
        if width == 0 || height == 0 || duration_sec <= 0.0 {
            return Err(PipelineError::decode(format!(
                "{} has no decodable video stream",
                path.display()
            )));
        }

        tracing::debug!(width, height, fps, duration_sec, "video opened");
        Ok(Self {
            capture,
            width,
            height,
            fps,
            duration_sec,
        })
    }

    /// 解像度を取得
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 指定時刻にシークして1フレーム読む（BGR形式）
    fn read_at(&mut self, timestamp_sec: f64) -> Result<Mat> {
        // 終端ちょうどへのシークは読めないコンテナがある
        let frame_sec = if self.fps > 0.0 { 1.0 / self.fps } else { 0.04 };
        let t = timestamp_sec.clamp(0.0, (self.duration_sec - frame_sec).max(0.0));

        self.capture
            .set(videoio::CAP_PROP_POS_MSEC, t * 1000.0)
            .map_err(cv_err("seek failed"))?;

        let mut frame = Mat::default();
        let ok = self.capture.read(&mut frame).map_err(cv_err("read failed"))?;
        if !ok || frame.empty() {
            return Err(PipelineError::decode(format!("no frame at {t:.3}s")));
        }
        Ok(frame)
    }
}

/// メタデータに長さが無いとき、末尾へシークして位置から求める
fn probe_duration(capture: &mut VideoCapture) -> Result<f64> {
    capture
        .set(videoio::CAP_PROP_POS_AVI_RATIO, 1.0)
        .map_err(cv_err("seek to end"))?;
    let end_ms = capture.get(videoio::CAP_PROP_POS_MSEC).map_err(cv_err("seek to end"))?;
    capture
        .set(videoio::CAP_PROP_POS_AVI_RATIO, 0.0)
        .map_err(cv_err("rewind"))?;
    Ok((end_ms / 1000.0).max(0.0))
}

/// BGR Mat → RgbImage（幅指定でアスペクト比維持リサイズ）
fn mat_to_rgb(frame: &Mat, width: u32) -> Result<RgbImage> {
    let src_w = frame.cols();
    let src_h = frame.rows();

    let mut resized = Mat::default();
    let target = if width > 0 && width as i32 != src_w {
        let h = ((src_h as f64 * width as f64) / src_w.max(1) as f64).round().max(1.0) as i32;
        imgproc::resize(
            frame,
            &mut resized,
            Size::new(width as i32, h),
            0.0,
            0.0,
            imgproc::INTER_AREA,
        )
        .map_err(cv_err("resize"))?;
        &resized
    } else {
        frame
    };

    let mut rgb = Mat::default();
    imgproc::cvt_color_def(target, &mut rgb, imgproc::COLOR_BGR2RGB).map_err(cv_err("color conversion"))?;

    let w = rgb.cols() as u32;
    let h = rgb.rows() as u32;
    let data = if rgb.is_continuous() {
        rgb.data_bytes().map_err(cv_err("frame buffer"))?.to_vec()
    } else {
        rgb.try_clone()
            .map_err(cv_err("frame buffer"))?
            .data_bytes()
            .map_err(cv_err("frame buffer"))?
            .to_vec()
    };

    RgbImage::from_raw(w, h, data)
        .ok_or_else(|| PipelineError::decode(format!("frame buffer size mismatch for {w}x{h}")))
}

impl FrameSource for OpenCvVideo {
    fn duration_sec(&self) -> f64 {
        self.duration_sec
    }

    fn frame_size(&self) -> (u32, u32) {
        self.resolution()
    }

    fn frame_at(&mut self, timestamp_sec: f64, width: u32) -> Result<RgbImage> {
        let frame = self.read_at(timestamp_sec)?;
        mat_to_rgb(&frame, width)
    }
}
