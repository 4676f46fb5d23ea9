use std::time::Duration;

/// Native frame dimensions of the reference sensor generation. Carried as
/// configuration rather than constants so a different device revision only
/// has to change one struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameGeometry {
    pub color_width: u32,
    pub color_height: u32,
    pub depth_width: u32,
    pub depth_height: u32,
}

impl FrameGeometry {
    pub fn color_area(&self) -> usize {
        self.color_width as usize * self.color_height as usize
    }

    pub fn depth_area(&self) -> usize {
        self.depth_width as usize * self.depth_height as usize
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            color_width: 1920,
            color_height: 1080,
            depth_width: 512,
            depth_height: 424,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    /// Squared distance (m²) within which a tracked body becomes the active
    /// user. 6.25 = 2.5 m.
    pub engaged_threshold_sq: f32,
    /// Squared distance (m²) beyond which the active user counts as lost.
    /// Independent of the engagement threshold even though the defaults
    /// coincide.
    pub lost_threshold_sq: f32,
    /// Accept joints the sensor reports as inferred, not just fully tracked.
    pub track_inferred: bool,
    /// Back-off when the device has no new frame ready.
    pub retry_sleep: Duration,
    /// Run the morphological opening + blur pass over the raw mask.
    pub refine_mask: bool,
    pub geometry: FrameGeometry,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engaged_threshold_sq: 6.25,
            lost_threshold_sq: 6.25,
            track_inferred: true,
            retry_sleep: Duration::from_millis(30),
            refine_mask: true,
            geometry: FrameGeometry::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_reference_device() {
        let config = PipelineConfig::default();
        assert_eq!(config.engaged_threshold_sq, 6.25);
        assert_eq!(config.lost_threshold_sq, 6.25);
        assert!(config.track_inferred);
        assert_eq!(config.retry_sleep, Duration::from_millis(30));
    }

    #[test]
    fn default_geometry_areas() {
        let geometry = FrameGeometry::default();
        assert_eq!(geometry.color_area(), 1920 * 1080);
        assert_eq!(geometry.depth_area(), 512 * 424);
    }
}
