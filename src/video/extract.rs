//! Windowed frame extraction through an external `ffmpeg` process.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::frame::FrameSample;
use crate::config::ExtractConfig;
use crate::error::{PipelineError, Result};

/// A `[start_sec, end_sec]` slice of the clip to extract at `fps`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRequest {
    pub start_sec: f64,
    pub end_sec: f64,
    pub fps: f64,
    pub max_frames: usize,
}

/// A validated request with fps and frame count clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionPlan {
    pub start_sec: f64,
    pub end_sec: f64,
    pub fps: f64,
    pub max_frames: usize,
}

impl ExtractionPlan {
    pub fn span_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

impl WindowRequest {
    pub fn new(start_sec: f64, end_sec: f64, fps: f64, max_frames: usize) -> Self {
        Self {
            start_sec,
            end_sec,
            fps,
            max_frames,
        }
    }

    pub fn plan(&self, config: &ExtractConfig) -> Result<ExtractionPlan> {
        let finite = [self.start_sec, self.end_sec, self.fps]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(PipelineError::invalid_input(format!(
                "window parameters must be finite: {self:?}"
            )));
        }
        if self.start_sec < 0.0 {
            return Err(PipelineError::invalid_input(format!(
                "window start {} is negative",
                self.start_sec
            )));
        }
        if self.end_sec <= self.start_sec {
            return Err(PipelineError::invalid_input(format!(
                "window end {} must be after start {}",
                self.end_sec, self.start_sec
            )));
        }
        Ok(ExtractionPlan {
            start_sec: self.start_sec,
            end_sec: self.end_sec,
            fps: self.fps.clamp(config.min_fps, config.max_fps),
            max_frames: self.max_frames.clamp(1, config.max_frames_cap.max(1)),
        })
    }
}

/// `start + i / fps` for each extracted frame.
pub fn window_timestamps(plan: &ExtractionPlan, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| plan.start_sec + i as f64 / plan.fps)
        .collect()
}

const FRAME_PATTERN: &str = "frame_%05d.jpg";

pub fn ffmpeg_args(input: &Path, output_dir: &Path, plan: &ExtractionPlan, width: u32) -> Vec<OsString> {
    let filter = if width > 0 {
        format!("fps={},scale={}:-2", plan.fps, width)
    } else {
        format!("fps={}", plan.fps)
    };
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-nostdin",
        "-y",
        "-ss",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(format!("{:.3}", plan.start_sec).into());
    args.push("-t".into());
    args.push(format!("{:.3}", plan.span_sec()).into());
    args.push("-i".into());
    args.push(input.as_os_str().to_owned());
    args.push("-vf".into());
    args.push(filter.into());
    args.push("-frames:v".into());
    args.push(plan.max_frames.to_string().into());
    args.push("-q:v".into());
    args.push("3".into());
    args.push(output_dir.join(FRAME_PATTERN).into_os_string());
    args
}

/// Extract the window as timestamped RGB frames.
///
/// Output files live in a temporary directory removed on every return path;
/// the child process is killed if the deadline passes.
pub async fn extract_window(
    input: &Path,
    request: &WindowRequest,
    config: &ExtractConfig,
) -> Result<Vec<FrameSample>> {
    let plan = request.plan(config)?;
    let workdir = tempfile::Builder::new().prefix("swing-window-").tempdir()?;
    let args = ffmpeg_args(input, workdir.path(), &plan, config.width);
    debug!(ffmpeg = %config.ffmpeg_path, ?plan, "starting frame extraction");

    let child = tokio::process::Command::new(&config.ffmpeg_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let deadline = Duration::from_secs(config.timeout_secs);
    let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(timeout_secs = config.timeout_secs, "ffmpeg timed out, killing");
            return Err(PipelineError::ExtractionTimeout(deadline));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::decode(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let frames = read_frames(workdir.path(), &plan).await?;
    info!(
        frames = frames.len(),
        start_sec = plan.start_sec,
        end_sec = plan.end_sec,
        fps = plan.fps,
        "window extracted"
    );
    Ok(frames)
}

async fn read_frames(dir: &Path, plan: &ExtractionPlan) -> Result<Vec<FrameSample>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "jpg") {
            paths.push(path);
        }
    }
    paths.sort();
    paths.truncate(plan.max_frames);

    let timestamps = window_timestamps(plan, paths.len());
    let mut frames = Vec::with_capacity(paths.len());
    for (index, (path, t)) in paths.iter().zip(timestamps).enumerate() {
        let bytes = tokio::fs::read(path).await?;
        let pixels = image::load_from_memory(&bytes)
            .map_err(|e| PipelineError::decode(format!("bad frame {}: {e}", path.display())))?
            .to_rgb8();
        frames.push(FrameSample::new(index, t, pixels));
    }
    Ok(frames)
}
