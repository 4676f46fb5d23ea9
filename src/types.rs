/// Up to six candidate skeletons per acquisition; slot indices line up with
/// the values in the player-index segmentation buffer.
pub const BODY_SLOTS: usize = 6;

/// Player-index value meaning "no body at this pixel".
pub const NO_PLAYER: u8 = 0xFF;

/// A point in 3D camera space (meters, sensor at the origin).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl CameraPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance from the sensor origin.
    pub fn distance_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }
}

/// A point in color-image space (pixels).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ColorPoint {
    pub x: f32,
    pub y: f32,
}

/// A point in depth-image space (pixels). Unmappable pixels carry the
/// negative-infinity sentinel in both coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthPoint {
    pub x: f32,
    pub y: f32,
}

impl DepthPoint {
    pub const INVALID: DepthPoint = DepthPoint {
        x: f32::NEG_INFINITY,
        y: f32::NEG_INFINITY,
    };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_valid(&self) -> bool {
        self.x != f32::NEG_INFINITY && self.y != f32::NEG_INFINITY
    }
}

impl Default for DepthPoint {
    fn default() -> Self {
        Self::INVALID
    }
}

/// The four skeletal joints this pipeline extracts. The enum doubles as the
/// key into the fixed observation and polling arrays; single-user only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointKind {
    HandLeft,
    HandRight,
    Head,
    SpineBase,
}

impl JointKind {
    pub const COUNT: usize = 4;

    pub const ALL: [JointKind; Self::COUNT] = [
        JointKind::HandLeft,
        JointKind::HandRight,
        JointKind::Head,
        JointKind::SpineBase,
    ];

    pub fn index(self) -> usize {
        match self {
            JointKind::HandLeft => 0,
            JointKind::HandRight => 1,
            JointKind::Head => 2,
            JointKind::SpineBase => 3,
        }
    }
}

/// Per-joint tracking confidence reported by the sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrackingConfidence {
    #[default]
    NotTracked,
    Inferred,
    Tracked,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Joint {
    pub position: CameraPoint,
    pub confidence: TrackingConfidence,
}

/// One candidate skeleton.
#[derive(Clone, Debug)]
pub struct Body {
    pub tracked: bool,
    pub tracking_id: u64,
    pub joints: [Joint; JointKind::COUNT],
}

impl Body {
    pub fn joint(&self, kind: JointKind) -> &Joint {
        &self.joints[kind.index()]
    }
}

/// The body sub-frame: one fixed slot per candidate skeleton.
#[derive(Clone, Debug, Default)]
pub struct BodyFrame {
    pub bodies: [Option<Body>; BODY_SLOTS],
}

/// Snapshot of the active-user state machine, refreshed once per tick by the
/// tracker and pulled by downstream stages. `active_body_index`,
/// `active_tracking_id` and `latest_distance_sq` are meaningful only while
/// `has_active_user` is true. `session` increments on every engagement so
/// the joint stage can detect a new user without a cross-stage call.
#[derive(Clone, Copy, Debug)]
pub struct ActiveUserState {
    pub has_active_user: bool,
    pub active_body_index: usize,
    pub active_tracking_id: u64,
    pub latest_distance_sq: f32,
    pub session: u64,
}

impl Default for ActiveUserState {
    fn default() -> Self {
        Self {
            has_active_user: false,
            active_body_index: 0,
            active_tracking_id: 0,
            latest_distance_sq: f32::MAX,
            session: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceEvent {
    UserNew,
    UserLost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointEventKind {
    Appear,
    Move,
    Disappear,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointEvent {
    pub kind: JointEventKind,
    pub joint: JointKind,
    pub position: ColorPoint,
}

/// Smoothed frame-rate estimate. `elapsed_time` is the latest frame
/// timestamp relative to the first observed one, in the device's 100 ns
/// relative-time ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceSample {
    pub fps: f64,
    pub elapsed_time: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Bgra8,
    Gray8,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Bgra8 => 4,
            TextureFormat::Gray8 => 1,
        }
    }
}

/// Consumer-side pixel buffer, filled by the publish pass from whichever
/// shared buffer was last written. Stands in for the GPU texture upload,
/// which is outside this crate's contract.
#[derive(Clone, Debug)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32, format: TextureFormat, fill: u8) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            pixels: vec![fill; len],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_sq_is_squared_norm() {
        let p = CameraPoint::new(1.0, 2.0, 2.0);
        assert_eq!(p.distance_sq(), 9.0);
    }

    #[test]
    fn invalid_depth_point_sentinel() {
        assert!(!DepthPoint::INVALID.is_valid());
        assert!(DepthPoint::new(0.0, 0.0).is_valid());
        assert!(!DepthPoint::new(f32::NEG_INFINITY, 3.0).is_valid());
    }

    #[test]
    fn joint_kind_indices_are_dense() {
        for (i, kind) in JointKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
