use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::device::{CoordinateMapper, MultiFrame};
use crate::types::{
    Body, ColorPoint, JointEvent, JointEventKind, JointKind, TrackingConfidence,
};

use super::{DistanceCell, EventBuffer, StateCell, TickError};

#[derive(Clone, Copy, Debug)]
struct Observation {
    kind: JointKind,
    position: ColorPoint,
    is_valid: bool,
    seen: bool,
}

impl Observation {
    fn new(kind: JointKind) -> Self {
        Self {
            kind,
            position: ColorPoint::default(),
            is_valid: false,
            seen: false,
        }
    }
}

/// Watches the active user's joints of interest and debounces them into
/// Appear/Move/Disappear events. Observations live in a fixed four-entry
/// array, reset and reused across ticks. The spine-base distance is fed
/// back to the tracker through the distance cell; the tracker reads it one
/// tick later.
pub(crate) struct JointStage {
    state: Arc<StateCell>,
    distance: Arc<DistanceCell>,
    events: Arc<EventBuffer<JointEvent>>,
    observations: [Observation; JointKind::COUNT],
    track_inferred: bool,
    last_session: u64,
}

impl JointStage {
    pub(crate) fn new(
        config: &PipelineConfig,
        state: Arc<StateCell>,
        distance: Arc<DistanceCell>,
        events: Arc<EventBuffer<JointEvent>>,
    ) -> Self {
        Self {
            state,
            distance,
            events,
            observations: [
                Observation::new(JointKind::HandLeft),
                Observation::new(JointKind::HandRight),
                Observation::new(JointKind::Head),
                Observation::new(JointKind::SpineBase),
            ],
            track_inferred: config.track_inferred,
            last_session: 0,
        }
    }

    pub(crate) fn process(
        &mut self,
        frame: &MultiFrame,
        mapper: &dyn CoordinateMapper,
    ) -> Result<(), TickError> {
        let snapshot = self.state.get();

        let result = if !snapshot.has_active_user {
            self.mark_unseen();
            Err(TickError::NoActiveUser)
        } else {
            if snapshot.session != self.last_session {
                // new user: observations from the previous session are stale
                self.reset_observations();
                self.last_session = snapshot.session;
            }
            match frame
                .bodies
                .as_ref()
                .and_then(|body_frame| body_frame.bodies[snapshot.active_body_index].as_ref())
            {
                // source frame missing: keep observations as they are so a
                // dropout does not read as the joints disappearing
                None => Err(TickError::SubFrame("body")),
                Some(body) => {
                    self.observe(body, mapper);
                    Ok(())
                }
            }
        };

        self.sweep_unseen();
        result
    }

    fn observe(&mut self, body: &Body, mapper: &dyn CoordinateMapper) {
        // Appear vs Move compares against the previous sweep's visibility
        let mut previously_seen = [false; JointKind::COUNT];
        for (slot, observation) in self.observations.iter().enumerate() {
            previously_seen[slot] = observation.seen;
        }
        self.mark_unseen();

        for kind in JointKind::ALL {
            let joint = body.joint(kind);
            let accepted = match joint.confidence {
                TrackingConfidence::Tracked => true,
                TrackingConfidence::Inferred => self.track_inferred,
                TrackingConfidence::NotTracked => false,
            };
            if !accepted {
                continue;
            }

            let position = mapper.camera_to_color(joint.position);
            let observation = &mut self.observations[kind.index()];
            observation.position = position;

            let event_kind = if previously_seen[kind.index()] {
                JointEventKind::Move
            } else {
                JointEventKind::Appear
            };
            self.events.push(JointEvent {
                kind: event_kind,
                joint: kind,
                position,
            });

            observation.is_valid = true;
            observation.seen = true;

            if kind == JointKind::SpineBase {
                self.distance.set(joint.position.distance_sq());
            }
        }
    }

    fn mark_unseen(&mut self) {
        for observation in &mut self.observations {
            observation.seen = false;
        }
    }

    fn reset_observations(&mut self) {
        for observation in &mut self.observations {
            observation.position = ColorPoint::default();
            observation.is_valid = false;
            observation.seen = false;
        }
    }

    /// Valid-but-unseen observations disappeared this tick; the event keeps
    /// the last mapped position.
    fn sweep_unseen(&mut self) {
        for observation in &mut self.observations {
            if observation.is_valid && !observation.seen {
                self.events.push(JointEvent {
                    kind: JointEventKind::Disappear,
                    joint: observation.kind,
                    position: observation.position,
                });
                observation.is_valid = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameGeometry;
    use crate::synthetic::SyntheticMapper;
    use crate::synthetic::test_fixtures::{body_at, frame_with_bodies};
    use crate::types::ActiveUserState;

    fn engaged_state(slot: usize, session: u64) -> ActiveUserState {
        ActiveUserState {
            has_active_user: true,
            active_body_index: slot,
            active_tracking_id: 1,
            latest_distance_sq: 4.0,
            session,
        }
    }

    fn stage() -> (JointStage, SyntheticMapper) {
        let stage = JointStage::new(
            &PipelineConfig::default(),
            Arc::new(StateCell::new()),
            Arc::new(DistanceCell::new()),
            Arc::new(EventBuffer::new()),
        );
        (stage, SyntheticMapper::new(FrameGeometry::default()))
    }

    fn kinds(events: &[JointEvent]) -> Vec<(JointEventKind, JointKind)> {
        events.iter().map(|e| (e.kind, e.joint)).collect()
    }

    #[test]
    fn first_sighting_appears_then_moves() {
        let (mut stage, mapper) = stage();
        stage.state.set(engaged_state(0, 1));
        let frame = frame_with_bodies(vec![(0, body_at(1, 2.0))]);

        stage.process(&frame, &mapper).unwrap();
        let first = stage.events.drain();
        assert_eq!(first.len(), JointKind::COUNT);
        assert!(first.iter().all(|e| e.kind == JointEventKind::Appear));

        stage.process(&frame, &mapper).unwrap();
        let second = stage.events.drain();
        assert_eq!(second.len(), JointKind::COUNT);
        assert!(second.iter().all(|e| e.kind == JointEventKind::Move));
    }

    #[test]
    fn rejected_joint_disappears_once() {
        let (mut stage, mapper) = stage();
        stage.state.set(engaged_state(0, 1));

        let full = frame_with_bodies(vec![(0, body_at(1, 2.0))]);
        stage.process(&full, &mapper).unwrap();
        stage.events.drain();

        let mut maimed = body_at(1, 2.0);
        maimed.joints[JointKind::HandLeft.index()].confidence = TrackingConfidence::NotTracked;
        let frame = frame_with_bodies(vec![(0, maimed)]);

        stage.process(&frame, &mapper).unwrap();
        let events = stage.events.drain();
        assert!(
            kinds(&events).contains(&(JointEventKind::Disappear, JointKind::HandLeft))
        );
        assert_eq!(
            events
                .iter()
                .filter(|e| e.kind == JointEventKind::Disappear)
                .count(),
            1
        );

        // already invalid: no second disappear
        stage.process(&frame, &mapper).unwrap();
        let again = stage.events.drain();
        assert!(
            !kinds(&again).contains(&(JointEventKind::Disappear, JointKind::HandLeft))
        );
    }

    #[test]
    fn inferred_joints_follow_the_config_flag() {
        let (mut stage, mapper) = stage();
        stage.state.set(engaged_state(0, 1));
        let mut body = body_at(1, 2.0);
        body.joints[JointKind::Head.index()].confidence = TrackingConfidence::Inferred;

        stage
            .process(&frame_with_bodies(vec![(0, body.clone())]), &mapper)
            .unwrap();
        assert!(
            kinds(&stage.events.drain()).contains(&(JointEventKind::Appear, JointKind::Head))
        );

        let config = PipelineConfig {
            track_inferred: false,
            ..PipelineConfig::default()
        };
        let mut strict = JointStage::new(
            &config,
            Arc::new(StateCell::new()),
            Arc::new(DistanceCell::new()),
            Arc::new(EventBuffer::new()),
        );
        strict.state.set(engaged_state(0, 1));
        strict
            .process(&frame_with_bodies(vec![(0, body)]), &mapper)
            .unwrap();
        assert!(
            !kinds(&strict.events.drain()).contains(&(JointEventKind::Appear, JointKind::Head))
        );
    }

    #[test]
    fn losing_the_user_invalidates_all_observations() {
        let (mut stage, mapper) = stage();
        stage.state.set(engaged_state(0, 1));
        let frame = frame_with_bodies(vec![(0, body_at(1, 2.0))]);
        stage.process(&frame, &mapper).unwrap();
        stage.events.drain();

        stage.state.set(ActiveUserState::default());
        assert!(stage.process(&frame, &mapper).is_err());
        let events = stage.events.drain();
        assert_eq!(events.len(), JointKind::COUNT);
        assert!(events.iter().all(|e| e.kind == JointEventKind::Disappear));
    }

    #[test]
    fn missing_body_frame_does_not_fake_disappearance() {
        let (mut stage, mapper) = stage();
        stage.state.set(engaged_state(0, 1));
        let frame = frame_with_bodies(vec![(0, body_at(1, 2.0))]);
        stage.process(&frame, &mapper).unwrap();
        stage.events.drain();

        let empty = MultiFrame::default();
        assert!(stage.process(&empty, &mapper).is_err());
        assert!(stage.events.drain().is_empty());

        // and the joints resume as moves, not re-appears
        stage.process(&frame, &mapper).unwrap();
        assert!(
            stage
                .events
                .drain()
                .iter()
                .all(|e| e.kind == JointEventKind::Move)
        );
    }

    #[test]
    fn session_change_resets_observations_silently() {
        let (mut stage, mapper) = stage();
        stage.state.set(engaged_state(0, 1));
        let frame = frame_with_bodies(vec![(0, body_at(1, 2.0))]);
        stage.process(&frame, &mapper).unwrap();
        stage.events.drain();

        // new engagement: same slot, new session
        stage.state.set(engaged_state(0, 2));
        stage.process(&frame, &mapper).unwrap();
        let events = stage.events.drain();
        // fresh session: everything appears again, nothing disappears
        assert!(events.iter().all(|e| e.kind == JointEventKind::Appear));
        assert_eq!(events.len(), JointKind::COUNT);
    }

    #[test]
    fn spine_base_feeds_the_distance_cell() {
        let (mut stage, mapper) = stage();
        stage.state.set(engaged_state(0, 1));
        assert_eq!(stage.distance.get(), 0.0);

        stage
            .process(&frame_with_bodies(vec![(0, body_at(1, 2.0))]), &mapper)
            .unwrap();
        assert_eq!(stage.distance.get(), 4.0);
    }

    #[test]
    fn no_active_user_reports_failure_without_active_history() {
        let (mut stage, mapper) = stage();
        let frame = frame_with_bodies(vec![(0, body_at(1, 2.0))]);
        assert!(stage.process(&frame, &mapper).is_err());
        assert!(stage.events.drain().is_empty());
    }
}
