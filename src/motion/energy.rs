use image::RgbImage;
use serde::Serialize;

use crate::pose::preprocess::resize_to_width;
use crate::video::FrameSample;

/// Frame-to-frame change at one sampled timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionEnergySample {
    pub timestamp_sec: f64,
    pub energy: f64,
}

#[inline]
fn luma(p: &image::Rgb<u8>) -> f64 {
    (p[0] as f64 + p[1] as f64 + p[2] as f64) / 3.0
}

/// Mean absolute luma difference over the shared top-left region.
fn frame_difference(prev: &RgbImage, cur: &RgbImage) -> f64 {
    let w = prev.width().min(cur.width());
    let h = prev.height().min(cur.height());
    if w == 0 || h == 0 {
        return 0.0;
    }
    let mut sum = 0.0;
    for y in 0..h {
        for x in 0..w {
            sum += (luma(cur.get_pixel(x, y)) - luma(prev.get_pixel(x, y))).abs();
        }
    }
    sum / (w as f64 * h as f64)
}

/// One value per frame; the first frame has no predecessor and scores 0.
pub fn motion_energy<'a, I>(frames: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a RgbImage>,
{
    let mut out = Vec::new();
    let mut prev: Option<&RgbImage> = None;
    for frame in frames {
        out.push(prev.map_or(0.0, |p| frame_difference(p, frame)));
        prev = Some(frame);
    }
    out
}

/// Downsample to `width` for the energy pass.
pub fn thumbnails(frames: &[FrameSample], width: u32) -> Vec<RgbImage> {
    frames.iter().map(|f| resize_to_width(&f.pixels, width)).collect()
}

/// Energy of each frame paired with its timestamp, computed at `width`.
pub fn energy_series(frames: &[FrameSample], width: u32) -> Vec<MotionEnergySample> {
    let thumbs = thumbnails(frames, width);
    motion_energy(&thumbs)
        .into_iter()
        .zip(frames)
        .map(|(energy, f)| MotionEnergySample {
            timestamp_sec: f.timestamp_sec,
            energy,
        })
        .collect()
}
