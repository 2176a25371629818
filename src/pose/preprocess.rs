use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use ndarray::Array4;

use super::keypoint::LandmarkPoint;

/// 推論前の拡大。factor <= 1.0 ならそのままコピー
pub fn upscale(image: &RgbImage, factor: f32) -> RgbImage {
    if factor <= 1.0 || !factor.is_finite() {
        return image.clone();
    }
    let w = ((image.width() as f32 * factor).round() as u32).max(1);
    let h = ((image.height() as f32 * factor).round() as u32).max(1);
    imageops::resize(image, w, h, FilterType::Triangle)
}

/// アスペクト比を保って幅を揃える
pub fn resize_to_width(image: &RgbImage, width: u32) -> RgbImage {
    if width == 0 || image.width() == width {
        return image.clone();
    }
    let height = ((image.height() as u64 * width as u64) as f64 / image.width().max(1) as f64)
        .round()
        .max(1.0) as u32;
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// レターボックス変換の情報（入力テンソル座標 → 元画像座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub src_width: u32,
    pub src_height: u32,
    pub input_size: u32,
}

/// RGB画像をBlazePose系ランドマークモデルの入力テンソルに変換
///
/// - アスペクト比を保って input_size×input_size にレターボックス
/// - [1, S, S, 3] の f32 テンソル (0.0-1.0)
pub fn preprocess_for_landmarks(image: &RgbImage, input_size: u32) -> (Array4<f32>, LetterboxInfo) {
    let src_w = image.width().max(1);
    let src_h = image.height().max(1);
    let scale = input_size as f32 / src_w.max(src_h) as f32;
    let new_w = ((src_w as f32 * scale).round() as u32).clamp(1, input_size);
    let new_h = ((src_h as f32 * scale).round() as u32).clamp(1, input_size);
    let pad_x = (input_size - new_w) / 2;
    let pad_y = (input_size - new_h) / 2;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([0, 0, 0]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let s = input_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, s, s, 3));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = f32::from(pixel[c]) / 255.0;
        }
    }

    let info = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        src_width: src_w,
        src_height: src_h,
        input_size,
    };
    (tensor, info)
}

impl LetterboxInfo {
    /// 入力テンソル上のピクセル座標を元画像の正規化座標へ
    pub fn to_source(&self, tx: f32, ty: f32) -> LandmarkPoint {
        let sx = (tx - self.pad_x) / self.scale;
        let sy = (ty - self.pad_y) / self.scale;
        LandmarkPoint::clamped(sx / self.src_width as f32, sy / self.src_height as f32)
    }
}
