use std::sync::Arc;

use rayon::prelude::*;

use crate::config::{FrameGeometry, PipelineConfig};
use crate::device::{CoordinateMapper, MultiFrame};
use crate::types::DepthPoint;

use super::{MaskSlot, StateCell, TickError, mask_filter};

/// Builds the color-resolution foreground mask for the active user: every
/// color pixel is mapped into depth space and compared against the player
/// segmentation at the active body slot.
pub(crate) struct MaskStage {
    state: Arc<StateCell>,
    slot: Arc<MaskSlot>,
    geometry: FrameGeometry,
    refine: bool,
    // one depth-space coordinate per color pixel, reused every tick
    depth_coords: Vec<DepthPoint>,
}

impl MaskStage {
    pub(crate) fn new(config: &PipelineConfig, state: Arc<StateCell>, slot: Arc<MaskSlot>) -> Self {
        Self {
            state,
            slot,
            geometry: config.geometry,
            refine: config.refine_mask,
            depth_coords: vec![DepthPoint::INVALID; config.geometry.color_area()],
        }
    }

    pub(crate) fn process(
        &mut self,
        frame: &MultiFrame,
        mapper: &dyn CoordinateMapper,
    ) -> Result<(), TickError> {
        let snapshot = self.state.get();
        if !snapshot.has_active_user {
            // no user, no mask; downstream compositing falls back to
            // unmasked color
            self.slot.set_valid(false);
            return Err(TickError::NoActiveUser);
        }

        // a sub-frame dropout keeps the previous mask on screen
        let depth = frame.depth.as_ref().ok_or(TickError::SubFrame("depth"))?;
        let player = frame
            .player_index
            .as_ref()
            .ok_or(TickError::SubFrame("player-index"))?;

        let depth_width = player.width as usize;
        let depth_height = player.height as usize;
        if player.pixels.len() != depth_width * depth_height {
            return Err(TickError::SubFrame("player-index"));
        }

        mapper.color_frame_to_depth_space(depth, &mut self.depth_coords)?;

        let active_slot = snapshot.active_body_index as u8;
        let color_width = self.geometry.color_width as usize;
        let player_pixels = &player.pixels;
        let depth_coords = &self.depth_coords;

        {
            let mut pixels = self.slot.pixels.lock_pixels();
            pixels
                .par_chunks_mut(color_width)
                .zip(depth_coords.par_chunks(color_width))
                .for_each(|(row, coords)| {
                    for (dst, point) in row.iter_mut().zip(coords) {
                        *dst = 0;
                        if !point.is_valid() {
                            continue;
                        }
                        let depth_x = (point.x + 0.5) as i64;
                        let depth_y = (point.y + 0.5) as i64;
                        if depth_x < 0
                            || depth_y < 0
                            || depth_x >= depth_width as i64
                            || depth_y >= depth_height as i64
                        {
                            continue;
                        }
                        let index = depth_y as usize * depth_width + depth_x as usize;
                        if player_pixels[index] == active_slot {
                            *dst = 255;
                        }
                    }
                });

            if self.refine {
                mask_filter::refine(
                    &mut pixels,
                    self.geometry.color_width,
                    self.geometry.color_height,
                );
            }
        }

        self.slot.pixels.mark_new();
        self.slot.set_valid(true);
        Ok(())
    }
}
