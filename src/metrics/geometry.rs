//! 2D正規化座標上の幾何ヘルパー（y軸は下向き）

use serde::Serialize;

use crate::pose::LandmarkPoint;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl From<LandmarkPoint> for Point2 {
    fn from(p: LandmarkPoint) -> Self {
        Self {
            x: p.x as f64,
            y: p.y as f64,
        }
    }
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// 角度を (-180, 180] に正規化
pub fn wrap_deg(deg: f64) -> f64 {
    let mut d = deg % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d <= -180.0 {
        d += 360.0;
    }
    d
}

/// a→b の線分の角度（度、x軸基準）
pub fn line_angle_deg(a: Point2, b: Point2) -> f64 {
    (b.y - a.y).atan2(b.x - a.x).to_degrees()
}

/// 2本の線分角の差の絶対値（折り返し済み）
pub fn angle_change_deg(from: f64, to: f64) -> f64 {
    wrap_deg(to - from).abs()
}

/// 下端→上端ベクトルの鉛直からの傾き（度）。右傾きが正。
pub fn tilt_from_vertical_deg(bottom: Point2, top: Point2) -> f64 {
    let dx = top.x - bottom.x;
    let up = bottom.y - top.y;
    dx.atan2(up).to_degrees()
}

/// 2フレーム間の変位
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Displacement {
    pub dx: f64,
    pub dy: f64,
    pub dist: f64,
    /// 肩幅で割った距離（肩幅が無ければ null）
    pub dist_norm: Option<f64>,
}

impl Displacement {
    pub fn between(from: Point2, to: Point2, norm_scale: Option<f64>) -> Self {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let dist = dx.hypot(dy);
        Self {
            dx,
            dy,
            dist,
            dist_norm: norm_scale.map(|s| dist / s).filter(|v| v.is_finite()),
        }
    }
}
