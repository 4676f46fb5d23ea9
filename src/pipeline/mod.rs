pub mod active_user;
pub mod bgra;
pub mod color;
pub mod joints;
pub mod mask;
pub mod mask_filter;
pub mod telemetry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::device::{AcquireError, CoordinateMapper, DeviceError, FrameSource, MappingError};
use crate::events::EventHub;
use crate::types::{
    ActiveUserState, JointEvent, JointEventKind, JointKind, PerformanceSample, PresenceEvent,
    Texture, TextureFormat,
};

use active_user::ActiveUserStage;
use color::ColorStage;
use joints::JointStage;
use mask::MaskStage;
use telemetry::TelemetryStage;

/// Tick-local stage failure. Routine: the scheduler logs it at trace level
/// and moves on; nothing here ever stops the acquisition loop.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("no active user")]
    NoActiveUser,
    #[error("{0} sub-frame unavailable")]
    SubFrame(&'static str),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("color conversion failed")]
    Convert,
}

/// Cross-thread event hand-off: the background thread pushes, the publish
/// pass drains. The flag keeps the drain path lock-free when nothing is new.
pub(crate) struct EventBuffer<T> {
    events: Mutex<Vec<T>>,
    has_new: AtomicBool,
}

impl<T> EventBuffer<T> {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            has_new: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, event: T) {
        self.events.lock().unwrap().push(event);
        self.has_new.store(true, Ordering::Release);
    }

    pub(crate) fn drain(&self) -> Vec<T> {
        if self.has_new.swap(false, Ordering::Acquire) {
            std::mem::take(&mut *self.events.lock().unwrap())
        } else {
            Vec::new()
        }
    }
}

/// Double-buffer hand-off for a pixel plane: the background thread writes
/// under the lock and raises the flag; the publish pass copies out once per
/// raise. The lock is held only for the write or the copy, never across
/// stage computation.
pub(crate) struct PixelSlot {
    pixels: Mutex<Vec<u8>>,
    has_new: AtomicBool,
}

impl PixelSlot {
    pub(crate) fn new(len: usize, fill: u8) -> Self {
        Self {
            pixels: Mutex::new(vec![fill; len]),
            has_new: AtomicBool::new(false),
        }
    }

    pub(crate) fn lock_pixels(&self) -> MutexGuard<'_, Vec<u8>> {
        self.pixels.lock().unwrap()
    }

    pub(crate) fn mark_new(&self) {
        self.has_new.store(true, Ordering::Release);
    }

    pub(crate) fn copy_if_new(&self, dst: &mut [u8]) -> bool {
        if !self.has_new.swap(false, Ordering::Acquire) {
            return false;
        }
        let pixels = self.pixels.lock().unwrap();
        if pixels.len() != dst.len() {
            return false;
        }
        dst.copy_from_slice(&pixels);
        true
    }
}

/// The mask plane plus its validity. `valid` answers "is there currently a
/// mask at all" (false whenever no active user), independent of `has_new`
/// which only gates the next copy.
pub(crate) struct MaskSlot {
    pub(crate) pixels: PixelSlot,
    valid: AtomicBool,
}

impl MaskSlot {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            pixels: PixelSlot::new(len, 0),
            valid: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// Latest tracker snapshot, written once per tick, pulled by sibling stages
/// and by the consumer. Readers tolerate one tick of staleness.
pub(crate) struct StateCell {
    state: Mutex<ActiveUserState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ActiveUserState::default()),
        }
    }

    pub(crate) fn get(&self) -> ActiveUserState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set(&self, state: ActiveUserState) {
        *self.state.lock().unwrap() = state;
    }
}

/// The joint stage's spine-base distance feed, read back by the tracker on
/// the next tick. Starts at 0.0 so an engaged user with no measurement yet
/// always passes the lost test.
pub(crate) struct DistanceCell {
    distance_sq: Mutex<f32>,
}

impl DistanceCell {
    pub(crate) fn new() -> Self {
        Self {
            distance_sq: Mutex::new(0.0),
        }
    }

    pub(crate) fn get(&self) -> f32 {
        *self.distance_sq.lock().unwrap()
    }

    pub(crate) fn set(&self, distance_sq: f32) {
        *self.distance_sq.lock().unwrap() = distance_sq;
    }
}

/// Consume-once frame timestamp: the color stage sets it, telemetry takes
/// it, so the FPS computation fires at most once per new frame.
pub(crate) struct TimeCell {
    slot: Mutex<(i64, bool)>,
}

impl TimeCell {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new((0, false)),
        }
    }

    pub(crate) fn set(&self, timestamp: i64) {
        *self.slot.lock().unwrap() = (timestamp, true);
    }

    pub(crate) fn take(&self) -> Option<i64> {
        let mut slot = self.slot.lock().unwrap();
        if slot.1 {
            slot.1 = false;
            Some(slot.0)
        } else {
            None
        }
    }
}

pub(crate) struct PerfCell {
    sample: Mutex<PerformanceSample>,
}

impl PerfCell {
    pub(crate) fn new() -> Self {
        Self {
            sample: Mutex::new(PerformanceSample::default()),
        }
    }

    pub(crate) fn get(&self) -> PerformanceSample {
        *self.sample.lock().unwrap()
    }

    pub(crate) fn set(&self, sample: PerformanceSample) {
        *self.sample.lock().unwrap() = sample;
    }
}

/// The five processing stages in their fixed tick order. The tracker runs
/// first, so it reads the distance cell as written on the previous tick.
struct StageSet {
    tracker: ActiveUserStage,
    joints: JointStage,
    mask: MaskStage,
    color: ColorStage,
    telemetry: TelemetryStage,
}

impl StageSet {
    fn run_tick(&mut self, frame: &crate::device::MultiFrame, mapper: &dyn CoordinateMapper) {
        if let Err(err) = self.tracker.process(frame) {
            log::trace!("tracker skipped: {err}");
        }
        if let Err(err) = self.joints.process(frame, mapper) {
            log::trace!("joints skipped: {err}");
        }
        if let Err(err) = self.mask.process(frame, mapper) {
            log::trace!("mask skipped: {err}");
        }
        if let Err(err) = self.color.process(frame) {
            log::trace!("color skipped: {err}");
        }
        self.telemetry.process();
    }
}

fn acquisition_loop(
    mut device: Box<dyn FrameSource>,
    mut stages: StageSet,
    running: Arc<AtomicBool>,
    retry_sleep: Duration,
) {
    while running.load(Ordering::Relaxed) {
        let frame = match device.acquire_latest() {
            Ok(frame) => frame,
            Err(AcquireError::NotReady) => {
                thread::sleep(retry_sleep);
                continue;
            }
        };

        let mapper = device.mapper();
        stages.run_tick(&frame, mapper.as_ref());
        // frame drops here, releasing the whole acquisition
    }

    device.close();
    log::debug!("acquisition worker stopped");
}

/// Handle to the background acquisition thread. Stopping is cooperative:
/// the flag is cleared and the worker observed at the top of its loop, so
/// callers wait at most one retry sleep plus one stage sequence.
pub struct PipelineWorker {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PipelineWorker {
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.halt();
    }
}

/// The consumer half of the pipeline. Lives on the display-cadence thread;
/// `publish` drains event buffers, refreshes the textures from whichever
/// buffers were last written, and snapshots telemetry.
pub struct PipelineOutput {
    state: Arc<StateCell>,
    presence_buffer: Arc<EventBuffer<PresenceEvent>>,
    presence_hub: EventHub<PresenceEvent>,
    joint_buffer: Arc<EventBuffer<JointEvent>>,
    joint_hub: EventHub<JointEvent>,
    polling: [Option<JointEvent>; JointKind::COUNT],
    color_slot: Arc<PixelSlot>,
    color_texture: Texture,
    mask_slot: Arc<MaskSlot>,
    mask_texture: Texture,
    perf: Arc<PerfCell>,
    performance: PerformanceSample,
}

impl PipelineOutput {
    #[allow(clippy::too_many_arguments)]
    fn new(
        geometry: crate::config::FrameGeometry,
        state: Arc<StateCell>,
        presence_buffer: Arc<EventBuffer<PresenceEvent>>,
        joint_buffer: Arc<EventBuffer<JointEvent>>,
        color_slot: Arc<PixelSlot>,
        mask_slot: Arc<MaskSlot>,
        perf: Arc<PerfCell>,
    ) -> Self {
        Self {
            state,
            presence_buffer,
            presence_hub: EventHub::new(),
            joint_buffer,
            joint_hub: EventHub::new(),
            polling: [None; JointKind::COUNT],
            color_slot,
            color_texture: Texture::new(
                geometry.color_width,
                geometry.color_height,
                TextureFormat::Bgra8,
                255,
            ),
            mask_slot,
            mask_texture: Texture::new(
                geometry.color_width,
                geometry.color_height,
                TextureFormat::Gray8,
                0,
            ),
            perf,
            performance: PerformanceSample::default(),
        }
    }

    /// One publish pass, run once per display tick.
    pub fn publish(&mut self) {
        for event in self.presence_buffer.drain() {
            self.presence_hub.emit(event);
        }

        for event in self.joint_buffer.drain() {
            let entry = &mut self.polling[event.joint.index()];
            match event.kind {
                JointEventKind::Disappear => {
                    self.joint_hub.emit(event);
                    *entry = None;
                }
                JointEventKind::Appear => {
                    *entry = Some(JointEvent {
                        kind: JointEventKind::Appear,
                        ..event
                    });
                }
                JointEventKind::Move => match entry {
                    // a Move with no retained entry means the consumer never
                    // saw this joint appear; promote it
                    None => {
                        *entry = Some(JointEvent {
                            kind: JointEventKind::Appear,
                            ..event
                        });
                    }
                    Some(retained) => {
                        retained.kind = JointEventKind::Move;
                        retained.position = event.position;
                    }
                },
            }
        }

        // steady redelivery: the polling table turns the edge-triggered
        // internal stream into a level-triggered one at display cadence
        for entry in self.polling.iter().flatten() {
            self.joint_hub.emit(*entry);
        }

        self.color_slot.copy_if_new(&mut self.color_texture.pixels);
        self.mask_slot
            .pixels
            .copy_if_new(&mut self.mask_texture.pixels);
        self.performance = self.perf.get();
    }

    pub fn subscribe_presence(&mut self) -> Receiver<PresenceEvent> {
        self.presence_hub.subscribe()
    }

    pub fn subscribe_joints(&mut self) -> Receiver<JointEvent> {
        self.joint_hub.subscribe()
    }

    pub fn color_texture(&self) -> &Texture {
        &self.color_texture
    }

    /// None while no mask is currently valid (no active user).
    pub fn mask_texture(&self) -> Option<&Texture> {
        self.mask_slot.is_valid().then_some(&self.mask_texture)
    }

    pub fn performance(&self) -> PerformanceSample {
        self.performance
    }

    pub fn active_user(&self) -> ActiveUserState {
        self.state.get()
    }
}

/// Opens the device, allocates the shared buffers, and spawns the
/// acquisition worker. Device failures surface here, before any thread
/// exists; nothing past this point is fatal.
pub fn start_pipeline(
    mut device: Box<dyn FrameSource>,
    config: PipelineConfig,
) -> Result<(PipelineWorker, PipelineOutput), DeviceError> {
    device.open()?;

    let geometry = config.geometry;
    let state = Arc::new(StateCell::new());
    let distance = Arc::new(DistanceCell::new());
    let presence_buffer = Arc::new(EventBuffer::new());
    let joint_buffer = Arc::new(EventBuffer::new());
    let color_slot = Arc::new(PixelSlot::new(geometry.color_area() * 4, 255));
    let mask_slot = Arc::new(MaskSlot::new(geometry.color_area()));
    let time = Arc::new(TimeCell::new());
    let perf = Arc::new(PerfCell::new());

    let stages = StageSet {
        tracker: ActiveUserStage::new(
            &config,
            state.clone(),
            distance.clone(),
            presence_buffer.clone(),
        ),
        joints: JointStage::new(&config, state.clone(), distance.clone(), joint_buffer.clone()),
        mask: MaskStage::new(&config, state.clone(), mask_slot.clone()),
        color: ColorStage::new(color_slot.clone(), time.clone()),
        telemetry: TelemetryStage::new(time.clone(), perf.clone()),
    };

    let running = Arc::new(AtomicBool::new(true));
    let run_flag = running.clone();
    let retry_sleep = config.retry_sleep;
    let handle = thread::spawn(move || {
        acquisition_loop(device, stages, run_flag, retry_sleep);
    });

    let output = PipelineOutput::new(
        geometry,
        state,
        presence_buffer,
        joint_buffer,
        color_slot,
        mask_slot,
        perf,
    );

    Ok((
        PipelineWorker {
            running,
            handle: Some(handle),
        },
        output,
    ))
}
