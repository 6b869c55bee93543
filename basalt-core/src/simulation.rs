//! The tick driver.
//!
//! [`LavaSimulator`] owns every piece of simulation state and advances it one
//! tick at a time. Chunk notifications and lava injections may arrive from any
//! thread; [`LavaSimulator::tick`] runs on one thread and never blocks on the
//! host. World writes stay buffered until [`LavaSimulator::flush`].

use basalt_utils::{BlockPos, ChunkPos};
use crossbeam::queue::SegQueue;
use rustc_hash::FxHashSet;

use crate::cell::{CellWorld, FlowParams};
use crate::config::{ConfigError, SimulationConfig};
use crate::loader::ChunkSnapshotLoader;
use crate::particle::LavaBlobManager;
use crate::terrain::VisibilityTable;
use crate::voxel::{VoxelClassifier, VoxelState};
use crate::world::WorldAccess;
use crate::world_buffer::{FlushError, WorldStateBuffer};

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    /// The tick number, starting at 1.
    pub tick: u64,
    /// Chunks whose cells were rebuilt.
    pub rebuilt: usize,
    /// Fluid units moved between cells.
    pub moved: i64,
    /// Fluid units dripped over edges or run off fresh crusts.
    pub dripped: i64,
    /// Blocks buffered by write-back and the adjustment sweep.
    pub written: usize,
    /// Blocks that crusted over, with their new state.
    pub crusted: Vec<(BlockPos, VoxelState)>,
    /// Emitted particles as source position and fluid units.
    pub particles: Vec<(BlockPos, i32)>,
}

/// Drives the lava simulation.
pub struct LavaSimulator {
    config: SimulationConfig,
    world_buffer: WorldStateBuffer,
    loader: ChunkSnapshotLoader,
    cells: CellWorld,
    visibility: VisibilityTable,
    blobs: LavaBlobManager,
    rebuild_requests: SegQueue<ChunkPos>,
    unload_requests: SegQueue<ChunkPos>,
    injections: SegQueue<(BlockPos, i64)>,
    waiting: FxHashSet<ChunkPos>,
    tick: u64,
}

impl LavaSimulator {
    /// Creates a simulator after validating `config`.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let world_buffer =
            WorldStateBuffer::new(VoxelClassifier::new(&config), config.voxel_palette());
        Ok(Self {
            world_buffer,
            loader: ChunkSnapshotLoader::new(config.max_free_snapshots),
            cells: CellWorld::new(FlowParams::from_config(&config)),
            visibility: VisibilityTable::new(config.visibility_radius),
            blobs: LavaBlobManager::new(&config),
            rebuild_requests: SegQueue::new(),
            unload_requests: SegQueue::new(),
            injections: SegQueue::new(),
            waiting: FxHashSet::default(),
            tick: 0,
            config,
        })
    }

    /// Asks for the cells of `chunk` to be rebuilt on a following tick.
    pub fn notify_chunk_changed(&self, chunk: ChunkPos) {
        self.rebuild_requests.push(chunk);
    }

    /// Drops every piece of state held for `chunk` on the next tick.
    pub fn notify_chunk_unloaded(&self, chunk: ChunkPos) {
        self.unload_requests.push(chunk);
    }

    /// Injects `units` of lava at `pos` on the next tick. If the chunk has no
    /// cells yet it is requested and the injection waits for it.
    pub fn add_lava(&self, pos: BlockPos, units: i64) {
        if units > 0 {
            self.injections.push((pos, units));
        }
    }

    /// Advances the simulation by one tick.
    pub fn tick(&mut self, world: &(impl WorldAccess + ?Sized)) -> TickReport {
        self.tick += 1;
        let tick = i64::try_from(self.tick).unwrap_or(i64::MAX);
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        self.apply_unloads();
        self.queue_requested(world);
        report.rebuilt = self.rebuild_snapshots(world);
        self.apply_injections();

        let outcome = self.cells.redistribute(&self.blobs, tick);
        report.moved = outcome.moved;
        report.dripped = outcome.dripped;
        self.waiting.extend(outcome.requested);
        for chunk in outcome.released {
            log::debug!("Released idle cells of chunk {chunk}");
        }

        let probe = self.world_buffer.terrain(world);
        let solidified = self
            .cells
            .solidify(&self.visibility, &probe, &self.blobs, tick);
        report.dripped += solidified.runoff;
        report.crusted = solidified.crusted;
        for &(pos, state) in &report.crusted {
            self.world_buffer.set(pos, state);
        }

        report.written = self.cells.write_back(&self.world_buffer, world);
        report.written += self.sweep_adjustments(world);

        report.particles = self
            .blobs
            .poll_eligible(tick, self.config.max_particles_per_tick)
            .into_iter()
            .map(|particle| (particle.pos(), particle.fluid_units))
            .collect();

        log::trace!(
            "Tick {}: rebuilt {}, moved {}, wrote {}, crusted {}, emitted {}",
            report.tick,
            report.rebuilt,
            report.moved,
            report.written,
            report.crusted.len(),
            report.particles.len()
        );
        report
    }

    fn apply_unloads(&mut self) {
        while let Some(chunk) = self.unload_requests.pop() {
            self.cells.remove_chunk(chunk);
            self.world_buffer.discard_chunk(chunk);
            self.waiting.remove(&chunk);
            log::debug!("Dropped lava state of unloaded chunk {chunk}");
        }
    }

    fn queue_requested(&mut self, world: &(impl WorldAccess + ?Sized)) {
        while let Some(chunk) = self.rebuild_requests.pop() {
            self.waiting.insert(chunk);
        }
        let loader = &self.loader;
        let world_buffer = &self.world_buffer;
        // chunks the host has not loaded stay requested
        self.waiting
            .retain(|&chunk| !loader.queue_chunk(world_buffer, world, chunk));
    }

    fn rebuild_snapshots(&mut self, world: &(impl WorldAccess + ?Sized)) -> usize {
        let mut rebuilt = 0;
        for _ in 0..self.loader.len() {
            let Some(snapshot) = self.loader.poll() else {
                break;
            };
            if world.is_chunk_loaded(snapshot.chunk_pos()) {
                self.cells.rebuild_chunk(&snapshot);
                rebuilt += 1;
            } else {
                log::debug!(
                    "Discarding snapshot of chunk {} unloaded before rebuild",
                    snapshot.chunk_pos()
                );
            }
            self.loader.return_used_buffer(snapshot);
        }
        rebuilt
    }

    fn apply_injections(&mut self) {
        for _ in 0..self.injections.len() {
            let Some((pos, units)) = self.injections.pop() else {
                break;
            };
            let chunk = pos.chunk_pos();
            if !self.cells.contains_chunk(chunk) {
                self.waiting.insert(chunk);
                self.injections.push((pos, units));
                continue;
            }
            let left = self.cells.add_fluid(pos, units);
            if left > 0 {
                log::debug!("{left} lava units did not fit at {pos}");
            }
        }
    }

    /// Re-checks every flagged position against the model and corrects the
    /// ones that disagree.
    fn sweep_adjustments(&self, world: &(impl WorldAccess + ?Sized)) -> usize {
        let tracker = self.world_buffer.adjustments();
        let mut corrected = 0;
        for chunk in tracker.chunks_needing_adjustment() {
            for pos in tracker.adjustment_positions(chunk) {
                if let Some(expected) = self.cells.expected_state(pos)
                    && self.world_buffer.get(world, pos) != expected
                {
                    self.world_buffer.set(pos, expected);
                    corrected += 1;
                }
                tracker.exclude_adjustment_needed_at(pos);
            }
        }
        corrected
    }

    /// Applies buffered writes to the host. Must run in the host's mutation
    /// context.
    pub fn flush(&self, world: &(impl WorldAccess + ?Sized)) -> Result<usize, FlushError> {
        self.world_buffer.flush(world)
    }

    /// The particle buckets in their persisted byte form.
    #[must_use]
    pub fn save_particles(&self) -> Vec<u8> {
        self.blobs.to_bytes()
    }

    /// Loads persisted particle buckets and returns how many were added.
    pub fn load_particles(&self, bytes: &[u8]) -> usize {
        self.blobs.from_bytes(bytes)
    }

    /// Fluid units held by all cells.
    #[must_use]
    pub fn total_fluid(&self) -> i64 {
        self.cells.total_fluid()
    }

    /// The cell model.
    #[must_use]
    pub fn cell_world(&self) -> &CellWorld {
        &self.cells
    }

    /// The pending write overlay.
    #[must_use]
    pub fn world_buffer(&self) -> &WorldStateBuffer {
        &self.world_buffer
    }

    /// The particle aggregator.
    #[must_use]
    pub fn blobs(&self) -> &LavaBlobManager {
        &self.blobs
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }
}
