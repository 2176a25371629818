use serde::ser::{Serialize, SerializeMap, Serializer};

/// 追跡する12関節（肩・肘・手首・腰・膝・足首 × 左右）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Joint {
    LeftShoulder = 0,
    RightShoulder = 1,
    LeftElbow = 2,
    RightElbow = 3,
    LeftWrist = 4,
    RightWrist = 5,
    LeftHip = 6,
    RightHip = 7,
    LeftKnee = 8,
    RightKnee = 9,
    LeftAnkle = 10,
    RightAnkle = 11,
}

impl Joint {
    pub const COUNT: usize = 12;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// 出力JSONのキー名
    pub fn as_str(&self) -> &'static str {
        match self {
            Joint::LeftShoulder => "leftShoulder",
            Joint::RightShoulder => "rightShoulder",
            Joint::LeftElbow => "leftElbow",
            Joint::RightElbow => "rightElbow",
            Joint::LeftWrist => "leftWrist",
            Joint::RightWrist => "rightWrist",
            Joint::LeftHip => "leftHip",
            Joint::RightHip => "rightHip",
            Joint::LeftKnee => "leftKnee",
            Joint::RightKnee => "rightKnee",
            Joint::LeftAnkle => "leftAnkle",
            Joint::RightAnkle => "rightAnkle",
        }
    }

    /// BlazePose 33点トポロジーでのインデックス
    pub fn blazepose_index(&self) -> usize {
        match self {
            Joint::LeftShoulder => 11,
            Joint::RightShoulder => 12,
            Joint::LeftElbow => 13,
            Joint::RightElbow => 14,
            Joint::LeftWrist => 15,
            Joint::RightWrist => 16,
            Joint::LeftHip => 23,
            Joint::RightHip => 24,
            Joint::LeftKnee => 25,
            Joint::RightKnee => 26,
            Joint::LeftAnkle => 27,
            Joint::RightAnkle => 28,
        }
    }
}

/// フレーム全体に対する正規化座標 (0.0〜1.0)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 範囲外の値を [0, 1] に丸める
    pub fn clamped(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }

    pub fn distance(&self, other: &LandmarkPoint) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn midpoint(&self, other: &LandmarkPoint) -> LandmarkPoint {
        LandmarkPoint::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// 12関節の検出結果。未検出の関節は None
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Landmarks {
    pub points: [Option<LandmarkPoint>; Joint::COUNT],
}

impl Landmarks {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, joint: Joint) -> Option<LandmarkPoint> {
        self.points[joint as usize]
    }

    pub fn set(&mut self, joint: Joint, point: Option<LandmarkPoint>) {
        self.points[joint as usize] = point;
    }

    pub fn with(mut self, joint: Joint, x: f32, y: f32) -> Self {
        self.set(joint, Some(LandmarkPoint::new(x, y)));
        self
    }

    /// 検出された関節数
    pub fn count(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, LandmarkPoint)> + '_ {
        Joint::ALL
            .iter()
            .filter_map(move |&j| self.get(j).map(|p| (j, p)))
    }

    /// 姿勢品質スコア
    ///
    /// 検出関節数 + 両肩ボーナス3 + 手首ボーナス2
    pub fn quality(&self) -> u32 {
        let mut score = self.count() as u32;
        if self.get(Joint::LeftShoulder).is_some() && self.get(Joint::RightShoulder).is_some() {
            score += 3;
        }
        if self.get(Joint::LeftWrist).is_some() || self.get(Joint::RightWrist).is_some() {
            score += 2;
        }
        score
    }

    /// 左右の中点。どちらか欠けていれば None
    pub fn center(&self, left: Joint, right: Joint) -> Option<LandmarkPoint> {
        Some(self.get(left)?.midpoint(&self.get(right)?))
    }

    pub fn shoulder_center(&self) -> Option<LandmarkPoint> {
        self.center(Joint::LeftShoulder, Joint::RightShoulder)
    }

    pub fn hip_center(&self) -> Option<LandmarkPoint> {
        self.center(Joint::LeftHip, Joint::RightHip)
    }

    pub fn knee_center(&self) -> Option<LandmarkPoint> {
        self.center(Joint::LeftKnee, Joint::RightKnee)
    }

    /// 肩幅（正規化座標）
    pub fn shoulder_width(&self) -> Option<f32> {
        Some(self.get(Joint::LeftShoulder)?.distance(&self.get(Joint::RightShoulder)?))
    }
}

impl Serialize for Landmarks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Joint::COUNT))?;
        for joint in Joint::ALL {
            map.serialize_entry(joint.as_str(), &self.get(joint))?;
        }
        map.end()
    }
}

/// サンプリングされた1フレーム分の姿勢
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PoseFrame {
    #[serde(rename = "idx")]
    pub index: usize,
    #[serde(rename = "timestampSec")]
    pub timestamp_sec: f64,
    #[serde(rename = "pose")]
    pub landmarks: Landmarks,
}

impl PoseFrame {
    pub fn new(index: usize, timestamp_sec: f64, landmarks: Landmarks) -> Self {
        Self {
            index,
            timestamp_sec,
            landmarks,
        }
    }
}
