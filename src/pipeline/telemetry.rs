use std::sync::Arc;
use std::time::Instant;

use crate::types::PerformanceSample;

use super::{PerfCell, TimeCell};

/// Derives the FPS estimate from consumed frame timestamps. The time cell
/// invalidates after one read, so the computation fires once per new frame
/// regardless of how often the loop spins.
pub(crate) struct TelemetryStage {
    time: Arc<TimeCell>,
    perf: Arc<PerfCell>,
    start_time: Option<i64>,
    last_counter: Option<Instant>,
    frames_since_update: u32,
}

impl TelemetryStage {
    pub(crate) fn new(time: Arc<TimeCell>, perf: Arc<PerfCell>) -> Self {
        Self {
            time,
            perf,
            start_time: None,
            last_counter: None,
            frames_since_update: 0,
        }
    }

    pub(crate) fn process(&mut self) {
        let Some(timestamp) = self.time.take() else {
            return;
        };

        let start = *self.start_time.get_or_insert(timestamp);
        let now = Instant::now();
        let mut sample = self.perf.get();

        if let Some(last) = self.last_counter {
            self.frames_since_update += 1;
            let elapsed = now.duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                sample.fps = self.frames_since_update as f64 / elapsed;
            }
        }

        sample.elapsed_time = timestamp - start;
        self.perf.set(sample);

        self.last_counter = Some(now);
        self.frames_since_update = 0;
    }
}
