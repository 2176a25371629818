use image::{imageops, RgbImage};

use super::keypoint::{Joint, LandmarkPoint, Landmarks};
use crate::config::ExtractorConfig;

/// 肩が見えないときの肩幅推定（BBox長辺に対する比率）
const FALLBACK_SHOULDER_RATIO: f32 = 0.25;
/// パディングの肩幅倍率
const PAD_SHOULDER_RATIO: f32 = 0.8;
/// パディングのBBox長辺倍率
const PAD_BBOX_RATIO: f32 = 0.35;

/// BBox（ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// 検出済み関節のmin/maxからBBoxを返す
///
/// 有効な関節が2個未満ならNone。
pub fn bbox_from_landmarks(landmarks: &Landmarks, frame_w: u32, frame_h: u32) -> Option<BBox> {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    let mut count = 0u32;

    for (_, point) in landmarks.iter() {
        let (px, py) = point.to_pixel(frame_w, frame_h);
        min_x = min_x.min(px);
        min_y = min_y.min(py);
        max_x = max_x.max(px);
        max_y = max_y.max(py);
        count += 1;
    }

    if count < 2 {
        return None;
    }

    Some(BBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

/// 関心領域（フルフレームのピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub full_width: u32,
    pub full_height: u32,
}

impl Roi {
    /// フレーム全体
    pub fn full(full_width: u32, full_height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: full_width as f32,
            height: full_height as f32,
            full_width,
            full_height,
        }
    }

    pub fn is_full(&self) -> bool {
        self.x <= 0.0
            && self.y <= 0.0
            && self.width >= self.full_width as f32
            && self.height >= self.full_height as f32
    }

    /// 前フレームの関節からROIを作る
    ///
    /// - BBox中心を保持
    /// - pad = max(肩幅·0.8, 長辺·0.35) · pad_multiplier
    /// - 幅・高さは肩幅の倍数を下限とする
    /// - フレーム内に収める
    pub fn from_landmarks(
        landmarks: &Landmarks,
        full_width: u32,
        full_height: u32,
        config: &ExtractorConfig,
    ) -> Option<Self> {
        let bbox = bbox_from_landmarks(landmarks, full_width, full_height)?;
        let longest = bbox.width.max(bbox.height);
        let shoulder = shoulder_width_px(landmarks, full_width, full_height)
            .unwrap_or(longest * FALLBACK_SHOULDER_RATIO);

        let pad = (shoulder * PAD_SHOULDER_RATIO).max(longest * PAD_BBOX_RATIO) * config.pad_multiplier;
        let fw = full_width as f32;
        let fh = full_height as f32;

        let w = (bbox.width + 2.0 * pad)
            .max(shoulder * config.min_width_multiplier)
            .max(1.0)
            .min(fw);
        let h = (bbox.height + 2.0 * pad)
            .max(shoulder * config.min_height_multiplier)
            .max(1.0)
            .min(fh);

        let (cx, cy) = bbox.center();
        let x = (cx - w / 2.0).clamp(0.0, fw - w);
        let y = (cy - h / 2.0).clamp(0.0, fh - h);

        Some(Self {
            x,
            y,
            width: w,
            height: h,
            full_width,
            full_height,
        })
    }

    /// 整数ピクセル矩形 (x, y, w, h)。常にフレーム内、幅・高さは1以上
    pub fn pixel_rect(&self) -> (u32, u32, u32, u32) {
        let x0 = (self.x.max(0.0).floor() as u32).min(self.full_width.saturating_sub(1));
        let y0 = (self.y.max(0.0).floor() as u32).min(self.full_height.saturating_sub(1));
        let x1 = ((self.x + self.width).ceil() as u32).min(self.full_width);
        let y1 = ((self.y + self.height).ceil() as u32).min(self.full_height);
        (x0, y0, x1.saturating_sub(x0).max(1), y1.saturating_sub(y0).max(1))
    }

    /// フレームからROIを切り出す
    pub fn crop(&self, frame: &RgbImage) -> RgbImage {
        let (x, y, w, h) = self.pixel_rect();
        imageops::crop_imm(frame, x, y, w, h).to_image()
    }

    /// ROI内の正規化座標をフレーム全体の正規化座標に変換
    pub fn remap(&self, local: &Landmarks) -> Landmarks {
        let (x, y, w, h) = self.pixel_rect();
        let fw = self.full_width.max(1) as f32;
        let fh = self.full_height.max(1) as f32;
        let mut out = Landmarks::empty();
        for (joint, p) in local.iter() {
            out.set(
                joint,
                Some(LandmarkPoint::clamped(
                    (x as f32 + p.x * w as f32) / fw,
                    (y as f32 + p.y * h as f32) / fh,
                )),
            );
        }
        out
    }
}

/// 肩幅（ピクセル）
fn shoulder_width_px(landmarks: &Landmarks, frame_w: u32, frame_h: u32) -> Option<f32> {
    let (lx, ly) = landmarks.get(Joint::LeftShoulder)?.to_pixel(frame_w, frame_h);
    let (rx, ry) = landmarks.get(Joint::RightShoulder)?.to_pixel(frame_w, frame_h);
    Some(((lx - rx).powi(2) + (ly - ry).powi(2)).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn golfer(cx: f32, cy: f32, scale: f32) -> Landmarks {
        // 正面から見たアドレス姿勢
        Landmarks::empty()
            .with(Joint::LeftShoulder, cx - 0.05 * scale, cy - 0.15 * scale)
            .with(Joint::RightShoulder, cx + 0.05 * scale, cy - 0.15 * scale)
            .with(Joint::LeftWrist, cx - 0.01 * scale, cy + 0.02 * scale)
            .with(Joint::RightWrist, cx + 0.01 * scale, cy + 0.02 * scale)
            .with(Joint::LeftHip, cx - 0.04 * scale, cy)
            .with(Joint::RightHip, cx + 0.04 * scale, cy)
            .with(Joint::LeftAnkle, cx - 0.05 * scale, cy + 0.2 * scale)
            .with(Joint::RightAnkle, cx + 0.05 * scale, cy + 0.2 * scale)
    }

    fn assert_contained(roi: &Roi) {
        assert!(roi.x >= 0.0, "x={}", roi.x);
        assert!(roi.y >= 0.0, "y={}", roi.y);
        assert!(roi.x + roi.width <= roi.full_width as f32 + 1e-3);
        assert!(roi.y + roi.height <= roi.full_height as f32 + 1e-3);
    }

    #[test]
    fn test_roi_full() {
        let roi = Roi::full(640, 480);
        assert!(roi.is_full());
        assert_eq!(roi.pixel_rect(), (0, 0, 640, 480));
    }

    #[test]
    fn test_bbox_spans_shoulders_to_ankles() {
        let lm = golfer(0.5, 0.5, 1.0);
        let bbox = bbox_from_landmarks(&lm, 1920, 1080).unwrap();
        // 横は足首 0.45..0.55、縦は肩 0.35 から足首 0.70 まで
        assert!((bbox.x - 864.0).abs() < 0.5);
        assert!((bbox.width - 192.0).abs() < 0.5);
        assert!((bbox.y - 378.0).abs() < 0.5);
        assert!((bbox.height - 378.0).abs() < 0.5);

        let mut upper = lm;
        upper.set(Joint::LeftAnkle, None);
        upper.set(Joint::RightAnkle, None);
        let bbox = bbox_from_landmarks(&upper, 1920, 1080).unwrap();
        // 足首が無ければ手首 0.52 が下端、横幅は肩で決まる
        assert!((bbox.y + bbox.height - 561.6).abs() < 0.5);
        assert!((bbox.width - 192.0).abs() < 0.5);
    }

    #[test]
    fn test_bbox_needs_two_points() {
        let lm = Landmarks::empty().with(Joint::LeftKnee, 0.5, 0.5);
        assert!(bbox_from_landmarks(&lm, 640, 480).is_none());
        assert!(Roi::from_landmarks(&lm, 640, 480, &ExtractorConfig::default()).is_none());
    }

    #[test]
    fn test_roi_respects_shoulder_floor() {
        let config = ExtractorConfig::default();
        let lm = golfer(0.5, 0.5, 0.5);
        let roi = Roi::from_landmarks(&lm, 1920, 1080, &config).unwrap();

        let shoulder = shoulder_width_px(&lm, 1920, 1080).unwrap();
        assert!(roi.width >= shoulder * config.min_width_multiplier - 1e-3);
        assert!(roi.height >= shoulder * config.min_height_multiplier - 1e-3);
        assert_contained(&roi);
    }

    #[test]
    fn test_roi_contained_near_edges() {
        let config = ExtractorConfig::default();
        for &(cx, cy) in &[(0.02, 0.02), (0.98, 0.05), (0.03, 0.97), (0.97, 0.95), (0.5, 0.5)] {
            let lm = golfer(cx, cy, 0.6);
            let roi = Roi::from_landmarks(&lm, 1280, 720, &config).unwrap();
            assert_contained(&roi);
            let (x, y, w, h) = roi.pixel_rect();
            assert!(x + w <= 1280);
            assert!(y + h <= 720);
        }
    }

    #[test]
    fn test_roi_clamps_to_frame_when_subject_is_large() {
        let config = ExtractorConfig::default();
        let lm = golfer(0.5, 0.5, 4.0);
        let roi = Roi::from_landmarks(&lm, 320, 240, &config).unwrap();
        assert_contained(&roi);
        assert!((roi.width - 320.0).abs() < 1e-3);
        assert!((roi.height - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_roi_without_shoulders_uses_bbox_fallback() {
        let config = ExtractorConfig::default();
        let lm = Landmarks::empty()
            .with(Joint::LeftHip, 0.45, 0.5)
            .with(Joint::RightAnkle, 0.55, 0.7);
        let roi = Roi::from_landmarks(&lm, 1000, 1000, &config).unwrap();
        // bbox 100x200, fallback shoulder 50, pad = max(40, 70) = 70
        assert!((roi.width - (100.0 + 140.0)).abs() < 1e-2);
        assert!((roi.height - (200.0 + 140.0)).abs() < 1e-2);
        assert_contained(&roi);
    }

    #[test]
    fn test_remap_to_full_frame() {
        let roi = Roi {
            x: 160.0,
            y: 48.0,
            width: 320.0,
            height: 384.0,
            full_width: 640,
            full_height: 480,
        };
        let local = Landmarks::empty().with(Joint::LeftKnee, 0.5, 0.5);
        let remapped = roi.remap(&local);

        let knee = remapped.get(Joint::LeftKnee).unwrap();
        // (160 + 0.5 * 320) / 640 = 0.5
        assert!((knee.x - 0.5).abs() < 1e-6);
        // (48 + 0.5 * 384) / 480 = 0.5
        assert!((knee.y - 0.5).abs() < 1e-6);
        assert!(remapped.get(Joint::LeftHip).is_none());
    }

    #[test]
    fn test_crop_matches_pixel_rect() {
        let frame = RgbImage::from_fn(64, 48, |x, y| image::Rgb([x as u8, y as u8, 0]));
        let roi = Roi {
            x: 10.4,
            y: 5.0,
            width: 20.0,
            height: 30.0,
            full_width: 64,
            full_height: 48,
        };
        let cropped = roi.crop(&frame);
        let (x, y, w, h) = roi.pixel_rect();
        assert_eq!((cropped.width(), cropped.height()), (w, h));
        assert_eq!(cropped.get_pixel(0, 0).0, [x as u8, y as u8, 0]);
    }
}
