//! # Basalt
//!
//! Runs the lava simulation over an in-memory demo world.
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    clippy::unwrap_used
)]
#![allow(
    clippy::single_call_fn,
    clippy::multiple_inherent_impl,
    clippy::shadow_unrelated,
    clippy::missing_errors_doc,
    clippy::needless_pass_by_value
)]
use std::fs;
use std::path::Path;
use std::time::Duration;

use basalt_core::voxel::VoxelClassifier;
use basalt_core::{LavaSimulator, SimulationConfig, TickReport};
use tokio::runtime::Builder;
use tokio::{select, signal, time};
use tokio_util::sync::CancellationToken;

use crate::demo::DemoWorld;

mod demo;
mod logger;

const CONFIG_PATH: &str = "config/basalt_config.json5";
const PARTICLES_PATH: &str = "config/particles.bin";
const TICK_INTERVAL: Duration = Duration::from_millis(50);
const VENT_UNITS_PER_TICK: i64 = 1_500;
const VENT_TICKS: u64 = 400;

fn main() -> anyhow::Result<()> {
    logger::init()?;
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    log::info!("Starting Basalt lava simulation");
    let config = SimulationConfig::load_or_create(Path::new(CONFIG_PATH))?;
    let classifier = VoxelClassifier::new(&config);
    let mut sim = LavaSimulator::new(config)?;

    let particles_path = Path::new(PARTICLES_PATH);
    if particles_path.exists() {
        let bytes = fs::read(particles_path)?;
        let loaded = sim.load_particles(&bytes);
        log::info!("Restored {loaded} particle buckets");
    }

    let demo = DemoWorld::build();
    for &chunk in &demo.chunks {
        sim.notify_chunk_changed(chunk);
    }

    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            log::info!("Shutdown requested");
        }
        shutdown.cancel();
    });

    let mut interval = time::interval(TICK_INTERVAL);
    loop {
        select! {
            () = cancel_token.cancelled() => break,
            _ = interval.tick() => {
                let tick = sim.tick_count() + 1;
                tracing::info_span!("tick", tick).in_scope(|| step(&mut sim, &demo, &classifier));
            }
        }
    }

    let bytes = sim.save_particles();
    if let Some(parent) = particles_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(particles_path, bytes)?;
    log::info!(
        "Stopped after {} ticks with {} lava units in cells",
        sim.tick_count(),
        sim.total_fluid()
    );
    Ok(())
}

fn step(sim: &mut LavaSimulator, demo: &DemoWorld, classifier: &VoxelClassifier) {
    if sim.tick_count() < VENT_TICKS {
        sim.add_lava(demo.vent, VENT_UNITS_PER_TICK);
    }

    let report = tracing::debug_span!("simulate").in_scope(|| sim.tick(&demo.world));
    tracing::debug_span!("flush").in_scope(|| match sim.flush(&demo.world) {
        Ok(written) => log::trace!("Flushed {written} blocks"),
        Err(error) => log::warn!("Flush failed, retrying next tick: {error}"),
    });

    land_particles(sim, demo, classifier, &report);
    if !report.crusted.is_empty() {
        log::debug!("{} blocks crusted over", report.crusted.len());
    }
    if report.tick.is_multiple_of(100) {
        log::info!(
            "Tick {}: {} units in cells, {} pending particle buckets",
            report.tick,
            sim.total_fluid(),
            sim.blobs().len()
        );
    }
}

/// Emitted particles fall straight down and rejoin the model where they land.
fn land_particles(
    sim: &LavaSimulator,
    demo: &DemoWorld,
    classifier: &VoxelClassifier,
    report: &TickReport,
) {
    for &(pos, units) in &report.particles {
        match demo.landing(classifier, pos) {
            Some(landed) => sim.add_lava(landed, i64::from(units)),
            None => log::debug!("Particle of {units} units from {pos} left the world"),
        }
    }
}
