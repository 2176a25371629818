use image::RgbImage;

/// One decoded frame, timestamped against the start of the clip.
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub index: usize,
    pub timestamp_sec: f64,
    pub pixels: RgbImage,
}

impl FrameSample {
    pub fn new(index: usize, timestamp_sec: f64, pixels: RgbImage) -> Self {
        Self {
            index,
            timestamp_sec,
            pixels,
        }
    }
}
