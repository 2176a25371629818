use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Serialize, Serializer};
use tracing::debug;

use super::frame::FrameSample;
use crate::error::{PipelineError, Result};

/// Seekable decoded video.
///
/// Each `frame_at` call seeks, waits for the decoder and returns one frame,
/// so callers get strictly ordered, deterministic reads.
pub trait FrameSource {
    /// Clip length in seconds.
    fn duration_sec(&self) -> f64;

    /// Native `(width, height)` of the decoded stream.
    fn frame_size(&self) -> (u32, u32);

    /// Frame nearest `timestamp_sec`, resized to `width` keeping aspect ratio
    /// (`width == 0` keeps the native size).
    fn frame_at(&mut self, timestamp_sec: f64, width: u32) -> Result<RgbImage>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn duration_sec(&self) -> f64 {
        (**self).duration_sec()
    }

    fn frame_size(&self) -> (u32, u32) {
        (**self).frame_size()
    }

    fn frame_at(&mut self, timestamp_sec: f64, width: u32) -> Result<RgbImage> {
        (**self).frame_at(timestamp_sec, width)
    }
}

/// Timestamps `i / (count - 1) * duration` for `i in 0..count`.
pub fn uniform_timestamps(duration_sec: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..count)
            .map(|i| i as f64 / (count - 1) as f64 * duration_sec)
            .collect(),
    }
}

fn checked_duration<S: FrameSource + ?Sized>(source: &S) -> Result<f64> {
    let duration = source.duration_sec();
    if !duration.is_finite() || duration <= 0.0 {
        return Err(PipelineError::decode(format!("video reports no usable duration ({duration})")));
    }
    Ok(duration)
}

/// Uniform sampling over the whole clip.
pub fn sample_uniform<S: FrameSource + ?Sized>(
    source: &mut S,
    count: usize,
    width: u32,
) -> Result<Vec<FrameSample>> {
    let duration = checked_duration(source)?;
    let mut frames = Vec::with_capacity(count);
    for (index, t) in uniform_timestamps(duration, count).into_iter().enumerate() {
        let pixels = source.frame_at(t, width)?;
        frames.push(FrameSample::new(index, t, pixels));
    }
    debug!(count = frames.len(), duration, width, "uniform sampling done");
    Ok(frames)
}

/// JPEG-encoded frame handed to the calling application.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedFrame {
    pub timestamp_sec: f64,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "jpegBase64", serialize_with = "serialize_base64")]
    pub jpeg: Vec<u8>,
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| PipelineError::decode(format!("failed to encode JPEG: {e}")))?;
    Ok(buf)
}

/// Re-seek and render a presentation frame.
pub fn capture_frame<S: FrameSource + ?Sized>(
    source: &mut S,
    timestamp_sec: f64,
    width: u32,
    quality: u8,
) -> Result<EncodedFrame> {
    let image = source.frame_at(timestamp_sec, width)?;
    let jpeg = encode_jpeg(&image, quality)?;
    Ok(EncodedFrame {
        timestamp_sec,
        width: image.width(),
        height: image.height(),
        jpeg,
    })
}
