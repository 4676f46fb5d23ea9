use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::device::MultiFrame;
use crate::types::{ActiveUserState, JointKind, PresenceEvent, TrackingConfidence};

use super::{DistanceCell, EventBuffer, StateCell, TickError};

/// The active-user selection state machine: Idle until a tracked body's
/// spine base comes within the engagement threshold, Engaged until that
/// body's tracking id vanishes or its distance test fails. Exactly one or
/// zero active users; at most one presence event per tick.
pub(crate) struct ActiveUserStage {
    state: Arc<StateCell>,
    distance: Arc<DistanceCell>,
    events: Arc<EventBuffer<PresenceEvent>>,
    engaged_threshold_sq: f32,
    lost_threshold_sq: f32,
    current: ActiveUserState,
}

impl ActiveUserStage {
    pub(crate) fn new(
        config: &PipelineConfig,
        state: Arc<StateCell>,
        distance: Arc<DistanceCell>,
        events: Arc<EventBuffer<PresenceEvent>>,
    ) -> Self {
        Self {
            state,
            distance,
            events,
            engaged_threshold_sq: config.engaged_threshold_sq,
            lost_threshold_sq: config.lost_threshold_sq,
            current: ActiveUserState::default(),
        }
    }

    pub(crate) fn process(&mut self, frame: &MultiFrame) -> Result<(), TickError> {
        // no body sub-frame: state stays frozen, no loss event
        let body_frame = frame.bodies.as_ref().ok_or(TickError::SubFrame("body"))?;

        let mut seen = false;

        for (slot, candidate) in body_frame.bodies.iter().enumerate() {
            let Some(body) = candidate else { continue };
            if !body.tracked {
                continue;
            }

            if self.current.has_active_user {
                if body.tracking_id == self.current.active_tracking_id {
                    // the body may have been reassigned to a new slot
                    self.current.active_body_index = slot;
                    // one tick stale: the joint stage writes this after us
                    self.current.latest_distance_sq = self.distance.get();
                    if self.current.latest_distance_sq <= self.lost_threshold_sq {
                        seen = true;
                        break;
                    }
                }
            } else {
                let spine = body.joint(JointKind::SpineBase);
                if spine.confidence != TrackingConfidence::Tracked {
                    continue;
                }
                let distance_sq = spine.position.distance_sq();
                if distance_sq <= self.engaged_threshold_sq {
                    self.current.has_active_user = true;
                    self.current.active_tracking_id = body.tracking_id;
                    self.current.active_body_index = slot;
                    self.current.latest_distance_sq = distance_sq;
                    self.current.session += 1;
                    self.events.push(PresenceEvent::UserNew);
                    log::debug!(
                        "active user engaged: id {} at slot {slot}",
                        body.tracking_id
                    );
                    seen = true;
                    break;
                }
            }
        }

        if self.current.has_active_user && !seen {
            self.current.has_active_user = false;
            self.current.active_body_index = 0;
            self.current.active_tracking_id = 0;
            // session only marks engagements; a loss does not bump it
            self.events.push(PresenceEvent::UserLost);
            log::debug!("active user lost");
        }

        self.state.set(self.current);
        Ok(())
    }

    #[cfg(test)]
    fn latest(&self) -> ActiveUserState {
        self.current
    }
}
