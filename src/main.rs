mod config;
mod device;
mod events;
mod pipeline;
mod synthetic;
mod types;

use std::thread;
use std::time::Duration;

use anyhow::Result;

use config::PipelineConfig;
use pipeline::start_pipeline;
use synthetic::DemoSource;

fn main() -> Result<()> {
    env_logger::init();

    let config = PipelineConfig::default();
    let device = Box::new(DemoSource::new(config.geometry));

    let (worker, mut output) = start_pipeline(device, config)?;
    let presence = output.subscribe_presence();
    let joints = output.subscribe_joints();

    // Display-cadence consumer: the acquisition thread runs at sensor rate,
    // this loop publishes at ~60 Hz for a bounded demo run.
    for frame in 0u32..600 {
        output.publish();

        for event in presence.try_iter() {
            log::info!("presence: {event:?}");
        }
        for event in joints.try_iter() {
            log::debug!(
                "joint {:?} {:?} at ({:.0}, {:.0})",
                event.joint,
                event.kind,
                event.position.x,
                event.position.y
            );
        }

        if frame % 60 == 0 {
            let perf = output.performance();
            log::info!(
                "fps {:.1}, active user: {}, mask: {}",
                perf.fps,
                output.active_user().has_active_user,
                if output.mask_texture().is_some() {
                    "valid"
                } else {
                    "none"
                }
            );
        }

        thread::sleep(Duration::from_millis(16));
    }

    worker.stop();
    Ok(())
}
