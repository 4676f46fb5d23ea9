use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::FrameGeometry;
use crate::device::{
    AcquireError, ColorData, ColorFormat, CoordinateMapper, DepthData, DeviceError, FrameSource,
    MappingError, MultiFrame, PlayerIndexData,
};
use crate::types::{
    Body, BodyFrame, CameraPoint, ColorPoint, DepthPoint, Joint, JointKind, NO_PLAYER,
    TrackingConfidence,
};

/// Pinhole-style mapper with intrinsics derived from the frame geometry.
/// Good enough to stand in for the device's calibrated mapper when no
/// hardware is attached.
pub struct SyntheticMapper {
    geometry: FrameGeometry,
}

impl SyntheticMapper {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self { geometry }
    }
}

impl CoordinateMapper for SyntheticMapper {
    fn camera_to_color(&self, point: CameraPoint) -> ColorPoint {
        let center_x = self.geometry.color_width as f32 / 2.0;
        let center_y = self.geometry.color_height as f32 / 2.0;
        if point.z <= 0.0 {
            // behind the sensor: collapse to the image center
            return ColorPoint {
                x: center_x,
                y: center_y,
            };
        }
        let focal = self.geometry.color_height as f32;
        ColorPoint {
            x: center_x + point.x / point.z * focal,
            y: center_y - point.y / point.z * focal,
        }
    }

    fn camera_to_depth(&self, point: CameraPoint) -> DepthPoint {
        if point.z <= 0.0 {
            return DepthPoint::INVALID;
        }
        let focal = self.geometry.depth_height as f32;
        DepthPoint::new(
            self.geometry.depth_width as f32 / 2.0 + point.x / point.z * focal,
            self.geometry.depth_height as f32 / 2.0 - point.y / point.z * focal,
        )
    }

    fn color_frame_to_depth_space(
        &self,
        depth: &DepthData,
        out: &mut [DepthPoint],
    ) -> Result<(), MappingError> {
        let depth_width = depth.width as usize;
        let depth_height = depth.height as usize;
        if depth.pixels.len() != depth_width * depth_height {
            return Err(MappingError);
        }
        if out.len() != self.geometry.color_area() {
            return Err(MappingError);
        }

        // uniform pixel-center grid scale; the real mapper consults the
        // depth plane for parallax, which a synthetic source has none of
        let scale_x = depth.width as f32 / self.geometry.color_width as f32;
        let scale_y = depth.height as f32 / self.geometry.color_height as f32;
        let center_of = |index: usize, scale: f32| (index as f32 + 0.5) * scale - 0.5;

        for color_y in 0..self.geometry.color_height as usize {
            let mapped_y = center_of(color_y, scale_y);
            let depth_y = (mapped_y.round().max(0.0) as usize).min(depth_height - 1);
            let row = &mut out[color_y * self.geometry.color_width as usize..]
                [..self.geometry.color_width as usize];
            for (color_x, slot) in row.iter_mut().enumerate() {
                let mapped_x = center_of(color_x, scale_x);
                let depth_x = (mapped_x.round().max(0.0) as usize).min(depth_width - 1);
                *slot = if depth.pixels[depth_y * depth_width + depth_x] == 0 {
                    DepthPoint::INVALID
                } else {
                    DepthPoint::new(mapped_x, mapped_y)
                };
            }
        }
        Ok(())
    }
}

/// Procedural stand-in for the physical sensor: one body walking toward and
/// away from the camera across the engagement threshold, with matching
/// depth, segmentation and color planes, delivered at device cadence.
pub struct DemoSource {
    geometry: FrameGeometry,
    mapper: Arc<SyntheticMapper>,
    tick: u64,
    last_frame: Option<Instant>,
    interval: Duration,
}

impl DemoSource {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            mapper: Arc::new(SyntheticMapper::new(geometry)),
            tick: 0,
            last_frame: None,
            interval: Duration::from_millis(33),
        }
    }

    fn walker(&self) -> Body {
        let t = self.tick as f32 / 30.0;
        let z = 2.2 + 0.8 * (t * 0.35).sin();
        let sway = 0.15 * t.sin();

        let joint = |x: f32, y: f32, z: f32| Joint {
            position: CameraPoint::new(x, y, z),
            confidence: TrackingConfidence::Tracked,
        };
        Body {
            tracked: true,
            tracking_id: 1,
            joints: [
                joint(-0.4 + sway, 0.1, z),
                joint(0.4 + sway, 0.1, z),
                joint(0.0, 0.6, z),
                joint(0.0, 0.0, z),
            ],
        }
    }

    fn planes(&self, z: f32) -> (DepthData, PlayerIndexData, ColorData) {
        let g = &self.geometry;
        let depth_mm = (z * 1000.0) as u16;

        let depth = DepthData {
            width: g.depth_width,
            height: g.depth_height,
            pixels: vec![depth_mm; g.depth_area()],
        };

        // the walker occupies the middle third of the segmentation plane
        let mut player = vec![NO_PLAYER; g.depth_area()];
        let (w, h) = (g.depth_width as usize, g.depth_height as usize);
        for y in h / 3..2 * h / 3 {
            for x in w / 3..2 * w / 3 {
                player[y * w + x] = 0;
            }
        }
        let player = PlayerIndexData {
            width: g.depth_width,
            height: g.depth_height,
            pixels: player,
        };

        let shade = (self.tick % 255) as u8;
        let mut bytes = vec![0u8; g.color_area() * 4];
        for pixel in bytes.chunks_exact_mut(4) {
            pixel[0] = shade;
            pixel[1] = 128;
            pixel[2] = 255 - shade;
            pixel[3] = 255;
        }
        let color = ColorData {
            width: g.color_width,
            height: g.color_height,
            format: ColorFormat::Bgra,
            bytes,
            timestamp: Some(self.tick as i64 * 333_333),
        };

        (depth, player, color)
    }
}

impl FrameSource for DemoSource {
    fn open(&mut self) -> Result<(), DeviceError> {
        log::info!("synthetic demo sensor open ({:?})", self.geometry);
        Ok(())
    }

    fn acquire_latest(&mut self) -> Result<MultiFrame, AcquireError> {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            if now.duration_since(last) < self.interval {
                return Err(AcquireError::NotReady);
            }
        }
        self.last_frame = Some(now);
        self.tick += 1;

        let body = self.walker();
        let z = body.joint(JointKind::SpineBase).position.z;
        let (depth, player_index, color) = self.planes(z);

        let mut bodies = BodyFrame::default();
        bodies.bodies[0] = Some(body);

        Ok(MultiFrame {
            color: Some(color),
            depth: Some(depth),
            player_index: Some(player_index),
            bodies: Some(bodies),
        })
    }

    fn mapper(&self) -> Arc<dyn CoordinateMapper> {
        self.mapper.clone()
    }

    fn close(&mut self) {
        log::info!("synthetic demo sensor closed");
    }
}

/// Replays a fixed frame queue, then reports `NotReady` forever. Test-only.
#[cfg(test)]
pub struct ScriptedSource {
    frames: std::collections::VecDeque<MultiFrame>,
    mapper: Arc<SyntheticMapper>,
    fail_open: bool,
}

#[cfg(test)]
impl ScriptedSource {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            frames: std::collections::VecDeque::new(),
            mapper: Arc::new(SyntheticMapper::new(geometry)),
            fail_open: false,
        }
    }

    pub fn failing(geometry: FrameGeometry) -> Self {
        Self {
            fail_open: true,
            ..Self::new(geometry)
        }
    }

    pub fn push_frame(&mut self, frame: MultiFrame) {
        self.frames.push_back(frame);
    }
}

#[cfg(test)]
impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<(), DeviceError> {
        if self.fail_open {
            return Err(DeviceError("scripted open failure".into()));
        }
        Ok(())
    }

    fn acquire_latest(&mut self) -> Result<MultiFrame, AcquireError> {
        self.frames.pop_front().ok_or(AcquireError::NotReady)
    }

    fn mapper(&self) -> Arc<dyn CoordinateMapper> {
        self.mapper.clone()
    }
}

#[cfg(test)]
pub mod test_fixtures {
    use super::*;
    use crate::types::BODY_SLOTS;

    /// A fully tracked body with its spine base at (0, 0, z), so its
    /// engagement distance is exactly z².
    pub fn body_at(tracking_id: u64, z: f32) -> Body {
        let joint = |x: f32, y: f32| Joint {
            position: CameraPoint::new(x, y, z),
            confidence: TrackingConfidence::Tracked,
        };
        Body {
            tracked: true,
            tracking_id,
            joints: [
                joint(-0.4, 0.1),
                joint(0.4, 0.1),
                joint(0.0, 0.6),
                joint(0.0, 0.0),
            ],
        }
    }

    pub fn frame_with_bodies(slots: Vec<(usize, Body)>) -> MultiFrame {
        let mut bodies: [Option<Body>; BODY_SLOTS] = Default::default();
        for (slot, body) in slots {
            bodies[slot] = Some(body);
        }
        MultiFrame {
            bodies: Some(BodyFrame { bodies }),
            ..MultiFrame::default()
        }
    }

    pub fn frame_with_body(
        _geometry: &FrameGeometry,
        tracking_id: u64,
        slot: usize,
        z: f32,
    ) -> MultiFrame {
        frame_with_bodies(vec![(slot, body_at(tracking_id, z))])
    }

    pub fn frame_without_bodies(_geometry: &FrameGeometry) -> MultiFrame {
        MultiFrame {
            bodies: Some(BodyFrame::default()),
            ..MultiFrame::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> FrameGeometry {
        FrameGeometry {
            color_width: 8,
            color_height: 8,
            depth_width: 4,
            depth_height: 4,
        }
    }

    #[test]
    fn camera_to_color_centers_the_optical_axis() {
        let mapper = SyntheticMapper::new(geometry());
        let center = mapper.camera_to_color(CameraPoint::new(0.0, 0.0, 2.0));
        assert_eq!(center, ColorPoint { x: 4.0, y: 4.0 });

        let right = mapper.camera_to_color(CameraPoint::new(0.5, 0.0, 2.0));
        assert!(right.x > center.x);
    }

    #[test]
    fn bulk_mapping_stays_in_depth_bounds() {
        let mapper = SyntheticMapper::new(geometry());
        let depth = DepthData {
            width: 4,
            height: 4,
            pixels: vec![2000; 16],
        };
        let mut out = vec![DepthPoint::INVALID; geometry().color_area()];
        mapper.color_frame_to_depth_space(&depth, &mut out).unwrap();

        // pixel-center mapping may land half a pixel outside the grid, but
        // never beyond what rounding pulls back in bounds
        for point in &out {
            assert!(point.is_valid());
            assert!(point.x >= -0.5 && point.x < 3.5);
            assert!(point.y >= -0.5 && point.y < 3.5);
            let rounded_x = (point.x + 0.5) as i64;
            let rounded_y = (point.y + 0.5) as i64;
            assert!((0..4).contains(&rounded_x));
            assert!((0..4).contains(&rounded_y));
        }
    }

    #[test]
    fn zero_depth_maps_to_the_invalid_sentinel() {
        let mapper = SyntheticMapper::new(geometry());
        let depth = DepthData {
            width: 4,
            height: 4,
            pixels: vec![0; 16],
        };
        let mut out = vec![DepthPoint::INVALID; geometry().color_area()];
        mapper.color_frame_to_depth_space(&depth, &mut out).unwrap();
        assert!(out.iter().all(|p| !p.is_valid()));
    }

    #[test]
    fn wrong_output_length_is_a_mapping_error() {
        let mapper = SyntheticMapper::new(geometry());
        let depth = DepthData {
            width: 4,
            height: 4,
            pixels: vec![2000; 16],
        };
        let mut out = vec![DepthPoint::INVALID; 3];
        assert!(mapper.color_frame_to_depth_space(&depth, &mut out).is_err());
    }

    #[test]
    fn demo_source_paces_its_frames() {
        let mut source = DemoSource::new(geometry());
        source.open().unwrap();
        assert!(source.acquire_latest().is_ok());
        // immediately polling again lands inside the frame interval
        assert!(matches!(
            source.acquire_latest(),
            Err(AcquireError::NotReady)
        ));
    }

    #[test]
    fn demo_frames_carry_all_sub_frames() {
        let mut source = DemoSource::new(geometry());
        source.open().unwrap();
        let frame = source.acquire_latest().unwrap();
        assert!(frame.color.is_some());
        assert!(frame.depth.is_some());
        assert!(frame.player_index.is_some());
        assert!(frame.bodies.is_some());
    }
}
