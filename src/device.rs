use std::sync::Arc;

use thiserror::Error;

use crate::types::{BodyFrame, CameraPoint, ColorPoint, DepthPoint};

/// Opening the device or creating its frame reader failed. Fatal: the
/// pipeline cannot start without a device and never retries this.
#[derive(Debug, Error)]
#[error("sensor device unavailable: {0}")]
pub struct DeviceError(pub String);

/// The device had no new frame ready. Routine: the acquisition loop backs
/// off briefly and polls again.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("no frame available")]
    NotReady,
}

/// A coordinate-mapping call failed for this tick. Downgrades mask and joint
/// production for the tick, nothing more.
#[derive(Debug, Error)]
#[error("coordinate mapping failed")]
pub struct MappingError;

/// Raw color sub-frame. The reference device delivers YUY2 natively and
/// BGRA only on request, so both arrive here unconverted.
#[derive(Clone, Debug)]
pub struct ColorData {
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    pub bytes: Vec<u8>,
    /// Device relative time in 100 ns ticks, when the frame carries one.
    pub timestamp: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorFormat {
    Bgra,
    Yuy2,
}

/// Depth sub-frame, millimeters per pixel.
#[derive(Clone, Debug)]
pub struct DepthData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u16>,
}

/// Player-index sub-frame: per depth pixel, the body slot (0..5) it belongs
/// to, or `NO_PLAYER`.
#[derive(Clone, Debug)]
pub struct PlayerIndexData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One acquisition bundling the four sub-frames. A `None` sub-frame failed
/// to acquire this tick; dependent stages skip their contribution. The
/// bundle lives for exactly one tick and releases everything when it drops.
#[derive(Debug, Default)]
pub struct MultiFrame {
    pub color: Option<ColorData>,
    pub depth: Option<DepthData>,
    pub player_index: Option<PlayerIndexData>,
    pub bodies: Option<BodyFrame>,
}

/// Translates between camera space, depth-image space and color-image space.
/// Stateless per tick; shared read-only by all stages.
pub trait CoordinateMapper: Send + Sync {
    fn camera_to_color(&self, point: CameraPoint) -> ColorPoint;

    fn camera_to_depth(&self, point: CameraPoint) -> DepthPoint;

    /// Bulk mapping: one depth-space coordinate per color pixel, written into
    /// `out` (length = color area). Pixels with no depth correspondence get
    /// `DepthPoint::INVALID`.
    fn color_frame_to_depth_space(
        &self,
        depth: &DepthData,
        out: &mut [DepthPoint],
    ) -> Result<(), MappingError>;
}

/// The opaque frame producer. Implementations wrap the vendor SDK; the
/// pipeline only sequences calls and handles their failures.
pub trait FrameSource: Send {
    /// Opens the physical device. Runs on the caller thread before the
    /// acquisition worker spawns so failures surface as startup errors.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Non-blocking: returns the latest acquisition or `NotReady`.
    fn acquire_latest(&mut self) -> Result<MultiFrame, AcquireError>;

    /// Valid only while the device is open.
    fn mapper(&self) -> Arc<dyn CoordinateMapper>;

    fn close(&mut self) {}
}
