use std::sync::Arc;

use crate::device::MultiFrame;

use super::{PixelSlot, TickError, TimeCell, bgra};

/// Produces the display-ready BGRA buffer and captures the frame timestamp
/// the telemetry stage runs on.
pub(crate) struct ColorStage {
    slot: Arc<PixelSlot>,
    time: Arc<TimeCell>,
}

impl ColorStage {
    pub(crate) fn new(slot: Arc<PixelSlot>, time: Arc<TimeCell>) -> Self {
        Self { slot, time }
    }

    pub(crate) fn process(&mut self, frame: &MultiFrame) -> Result<(), TickError> {
        let color = frame.color.as_ref().ok_or(TickError::SubFrame("color"))?;

        // frames without a timestamp leave telemetry untouched
        if let Some(timestamp) = color.timestamp {
            self.time.set(timestamp);
        }

        let written = {
            let mut pixels = self.slot.lock_pixels();
            bgra::write_bgra(color, &mut pixels)
        };

        match written {
            Ok(()) => {
                self.slot.mark_new();
                Ok(())
            }
            Err(err) => {
                log::warn!("color conversion failed: {err:?}");
                Err(TickError::Convert)
            }
        }
    }
}
