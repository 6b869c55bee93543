use basalt_utils::{BlockPos, CHUNK_WIDTH, ChunkPos};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{CellChunk, FlowParams, HEIGHT_UNITS_PER_BLOCK, LavaCell};
use crate::particle::LavaBlobManager;
use crate::snapshot::ChunkSnapshot;
use crate::terrain::{TerrainProbe, VisibilityTable};
use crate::voxel::VoxelState;
use crate::world::WorldAccess;
use crate::world_buffer::WorldStateBuffer;

/// Horizontal directions checked for missing neighbor chunks. Only the first
/// two (+x, +z) form pairs, so every pair is visited once.
const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Locates one cell and the column it stands in.
#[derive(Debug, Clone, Copy)]
struct CellRef {
    chunk: i64,
    handle: u32,
    x: i32,
    z: i32,
}

enum Flow {
    Transfer { from: CellRef, to: CellRef, amount: i64 },
    Drip { from: CellRef, pos: BlockPos, amount: i64 },
}

/// What one redistribution pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RedistributeOutcome {
    /// Units moved between cells.
    pub moved: i64,
    /// Units handed to the particle aggregator.
    pub dripped: i64,
    /// Missing chunks that a cell holding fluid borders.
    pub requested: Vec<ChunkPos>,
    /// Chunks whose cells were released after idling.
    pub released: Vec<ChunkPos>,
}

/// What one solidification pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SolidifyOutcome {
    /// Blocks that crusted over, with their new state.
    pub crusted: Vec<(BlockPos, VoxelState)>,
    /// Units that ran off the new crusts into the particle aggregator.
    pub runoff: i64,
}

/// Owns the cells of every simulated chunk.
pub struct CellWorld {
    params: FlowParams,
    chunks: FxHashMap<i64, CellChunk>,
}

impl CellWorld {
    /// Creates an empty cell world.
    #[must_use]
    pub fn new(params: FlowParams) -> Self {
        Self {
            params,
            chunks: FxHashMap::default(),
        }
    }

    /// The flow constants in use.
    #[must_use]
    pub fn params(&self) -> &FlowParams {
        &self.params
    }

    /// Replaces the cells of the snapshot's chunk, keeping their fluid.
    pub fn rebuild_chunk(&mut self, snapshot: &ChunkSnapshot) {
        let key = snapshot.chunk_pos().as_i64();
        let rebuilt = CellChunk::from_snapshot(snapshot, self.chunks.get(&key), &self.params);
        log::trace!(
            "Rebuilt {} cells of chunk {}",
            rebuilt.cells().len(),
            snapshot.chunk_pos()
        );
        self.chunks.insert(key, rebuilt);
    }

    /// Drops the cells of `chunk`.
    pub fn remove_chunk(&mut self, chunk: ChunkPos) -> Option<CellChunk> {
        self.chunks.remove(&chunk.as_i64())
    }

    /// Returns true if `chunk` has cells.
    #[must_use]
    pub fn contains_chunk(&self, chunk: ChunkPos) -> bool {
        self.chunks.contains_key(&chunk.as_i64())
    }

    /// The cells of `chunk`.
    #[must_use]
    pub fn chunk(&self, chunk: ChunkPos) -> Option<&CellChunk> {
        self.chunks.get(&chunk.as_i64())
    }

    /// Every chunk with cells, in packed-key order.
    #[must_use]
    pub fn chunk_positions(&self) -> Vec<ChunkPos> {
        let mut keys: Vec<i64> = self.chunks.keys().copied().collect();
        keys.sort_unstable();
        keys.into_iter().map(ChunkPos::from_i64).collect()
    }

    /// Number of chunks with cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if no chunk has cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of cells over all chunks.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.chunks.values().map(|chunk| chunk.cells().len()).sum()
    }

    /// Sum of fluid over all cells.
    #[must_use]
    pub fn total_fluid(&self) -> i64 {
        self.chunks.values().map(CellChunk::total_fluid).sum()
    }

    /// The cell whose span reaches into the block at `pos`.
    #[must_use]
    pub fn cell_at(&self, pos: BlockPos) -> Option<&LavaCell> {
        let chunk = self.chunks.get(&pos.chunk_pos().as_i64())?;
        let handle = chunk.cell_at(pos.local_x() as usize, pos.0.y, pos.local_z() as usize)?;
        Some(chunk.cell(handle))
    }

    /// Adds `units` to the cell at `pos` and returns the units that could not
    /// be placed, all of them if no cell is there.
    pub fn add_fluid(&mut self, pos: BlockPos, units: i64) -> i64 {
        let params = self.params;
        let Some(chunk) = self.chunks.get_mut(&pos.chunk_pos().as_i64()) else {
            return units;
        };
        match chunk.cell_at(pos.local_x() as usize, pos.0.y, pos.local_z() as usize) {
            Some(handle) => chunk.cell_mut(handle).add_fluid(units, &params),
            None => units,
        }
    }

    /// What the model says the block at `pos` should show. `None` where no
    /// cell reaches, so the model has no opinion.
    #[must_use]
    pub fn expected_state(&self, pos: BlockPos) -> Option<VoxelState> {
        self.cell_at(pos)
            .map(|cell| cell.expected_state(pos.0.y, &self.params))
    }

    fn cell(&self, cell: CellRef) -> Option<&LavaCell> {
        self.chunks
            .get(&cell.chunk)
            .map(|chunk| chunk.cell(cell.handle))
    }

    fn cell_mut(&mut self, cell: CellRef) -> Option<&mut LavaCell> {
        self.chunks
            .get_mut(&cell.chunk)
            .map(|chunk| chunk.cell_mut(cell.handle))
    }

    /// Collects every horizontally adjacent cell pair with an overlapping
    /// span, along with missing chunks bordered by fluid.
    fn collect_pairs(&self) -> (Vec<(CellRef, CellRef)>, Vec<ChunkPos>) {
        let mut pairs = Vec::new();
        let mut requested = FxHashSet::default();

        let mut keys: Vec<i64> = self.chunks.keys().copied().collect();
        keys.sort_unstable();

        for key in keys {
            let Some(chunk) = self.chunks.get(&key) else {
                continue;
            };
            let origin = chunk.chunk_pos();

            for local_x in 0..CHUNK_WIDTH {
                for local_z in 0..CHUNK_WIDTH {
                    let column = chunk.column(local_x as usize, local_z as usize);
                    if column.is_empty() {
                        continue;
                    }
                    let x = origin.min_block_x() + local_x;
                    let z = origin.min_block_z() + local_z;

                    for (i, (dx, dz)) in DIRECTIONS.into_iter().enumerate() {
                        let neighbor = BlockPos::new(x + dx, 0, z + dz);
                        let neighbor_chunk = neighbor.chunk_pos();
                        let neighbor_key = neighbor_chunk.as_i64();

                        let Some(other) = self.chunks.get(&neighbor_key) else {
                            if column
                                .iter()
                                .any(|&handle| chunk.cell(handle).fluid_units() > 0)
                            {
                                requested.insert(neighbor_chunk);
                            }
                            continue;
                        };
                        // -x and -z pairs are formed from the other side
                        if i >= 2 {
                            continue;
                        }

                        let other_column =
                            other.column(neighbor.local_x() as usize, neighbor.local_z() as usize);
                        for &handle in column {
                            let cell = chunk.cell(handle);
                            for &other_handle in other_column {
                                let other_cell = other.cell(other_handle);
                                if cell.floor().max(other_cell.floor())
                                    < cell.ceiling().min(other_cell.ceiling())
                                {
                                    pairs.push((
                                        CellRef {
                                            chunk: key,
                                            handle,
                                            x,
                                            z,
                                        },
                                        CellRef {
                                            chunk: neighbor_key,
                                            handle: other_handle,
                                            x: x + dx,
                                            z: z + dz,
                                        },
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut requested: Vec<ChunkPos> = requested.into_iter().collect();
        requested.sort_unstable_by_key(|chunk| chunk.as_i64());
        (pairs, requested)
    }

    /// Decides what flows between one pair this pass.
    fn plan_flow(&self, a: CellRef, b: CellRef) -> Option<Flow> {
        let params = &self.params;
        let a_cell = self.cell(a)?;
        let b_cell = self.cell(b)?;
        if a_cell.fluid_units() == 0 && b_cell.fluid_units() == 0 {
            return None;
        }

        let window_floor = a_cell.floor().max(b_cell.floor());
        if window_floor >= a_cell.ceiling().min(b_cell.ceiling()) {
            return None;
        }

        let a_surface = a_cell.surface(params);
        let b_surface = b_cell.surface(params);
        let (high_ref, high, high_surface, low_ref, low, low_surface) = if a_surface >= b_surface {
            (a, a_cell, a_surface, b, b_cell, b_surface)
        } else {
            (b, b_cell, b_surface, a, a_cell, a_surface)
        };

        let window_surface = i64::from(window_floor) * params.units_per_level;
        if high_surface <= window_surface || high_surface == low_surface {
            return None;
        }

        let diff = high_surface - low_surface.max(window_surface);
        let slope = if high.is_pressurized(params) || low.is_pressurized(params) {
            params.pressure_factor
        } else {
            1
        };
        let amount = (diff / (2 * slope))
            .min(high.fluid_units())
            .min(low.free_units(params))
            .min(params.max_transfer);

        let drop_edge = low.floor() < high.floor() - HEIGHT_UNITS_PER_BLOCK
            && low_surface < window_surface;
        if drop_edge && amount < params.min_flow {
            let amount = high.fluid_units().min(params.min_flow);
            if amount <= 0 {
                return None;
            }
            return Some(Flow::Drip {
                from: high_ref,
                pos: BlockPos::new(low_ref.x, high.base_y(), low_ref.z),
                amount,
            });
        }

        (amount > 0).then_some(Flow::Transfer {
            from: high_ref,
            to: low_ref,
            amount,
        })
    }

    /// Runs one pressure-driven redistribution pass over all cells.
    ///
    /// Drips are added to `blobs` tagged with `tick`. Chunks idle long enough
    /// are released and reported.
    pub fn redistribute(&mut self, blobs: &LavaBlobManager, tick: i64) -> RedistributeOutcome {
        let (pairs, requested) = self.collect_pairs();
        let mut outcome = RedistributeOutcome {
            requested,
            ..RedistributeOutcome::default()
        };

        for (a, b) in pairs {
            match self.plan_flow(a, b) {
                Some(Flow::Transfer { from, to, amount }) => {
                    if let Some(cell) = self.cell_mut(from) {
                        cell.drain(amount);
                    }
                    if let Some(cell) = self.cell_mut(to) {
                        cell.receive(amount);
                    }
                    outcome.moved += amount;
                }
                Some(Flow::Drip { from, pos, amount }) => {
                    if let Some(cell) = self.cell_mut(from) {
                        cell.drain(amount);
                    }
                    blobs.add_fluid(pos, amount as i32, tick);
                    outcome.dripped += amount;
                }
                None => {}
            }
        }

        let params = self.params;
        for chunk in self.chunks.values_mut() {
            for cell in chunk.cells_mut() {
                cell.end_tick(&params);
            }
            chunk.update_idle();
            if chunk.idle_ticks() >= params.idle_retention_ticks {
                outcome.released.push(chunk.chunk_pos());
            }
        }
        outcome.released.sort_unstable_by_key(|chunk| chunk.as_i64());
        for chunk in &outcome.released {
            self.chunks.remove(&chunk.as_i64());
        }

        outcome
    }

    /// Crusts thin flows that stopped moving.
    ///
    /// A settled cell crusts at most the whole levels it holds, capped by the
    /// ideal flow height at its base block. Fluid above that height runs off
    /// into `blobs` tagged with `tick`, and a film under one level stays
    /// liquid until it gathers a level.
    pub fn solidify(
        &mut self,
        table: &VisibilityTable,
        probe: &impl TerrainProbe,
        blobs: &LavaBlobManager,
        tick: i64,
    ) -> SolidifyOutcome {
        let params = self.params;
        let mut outcome = SolidifyOutcome::default();

        for chunk in self.chunks.values_mut() {
            let origin = chunk.chunk_pos();
            for local_x in 0..CHUNK_WIDTH {
                for local_z in 0..CHUNK_WIDTH {
                    let count = chunk.column(local_x as usize, local_z as usize).len();
                    for i in 0..count {
                        let handle = chunk.column(local_x as usize, local_z as usize)[i];
                        let cell = chunk.cell_mut(handle);
                        let covered = cell.covered_levels(&params);
                        if covered == 0
                            || cell.fluid_units() > params.units_per_block
                            || cell.settled_ticks() < params.solidify_after_ticks
                        {
                            continue;
                        }

                        let pos = origin.block_at(local_x, cell.base_y(), local_z);
                        let ideal = table.ideal_flow_height(probe, pos);
                        let ideal_levels =
                            ((ideal * HEIGHT_UNITS_PER_BLOCK as f32).round() as i64).max(1);
                        let retained = covered.min(ideal_levels);

                        let (level, displaced) = cell.solidify(retained as i32, &params);
                        outcome.crusted.push((pos, VoxelState::SolidFlow(level)));

                        let above_ideal = if retained < covered {
                            cell.fluid_units()
                        } else {
                            0
                        };
                        cell.drain(above_ideal);
                        let runoff = above_ideal + displaced;
                        if runoff > 0 {
                            blobs.add_fluid(pos, runoff as i32, tick);
                            outcome.runoff += runoff;
                        }
                    }
                }
            }
        }

        outcome
    }

    /// Buffers every block of a dirty cell whose current state differs from
    /// what the model expects. Returns the number of blocks written.
    pub fn write_back(
        &mut self,
        world_buffer: &WorldStateBuffer,
        world: &(impl WorldAccess + ?Sized),
    ) -> usize {
        let params = self.params;
        let mut written = 0;

        for chunk in self.chunks.values_mut() {
            let origin = chunk.chunk_pos();
            for local_x in 0..CHUNK_WIDTH {
                for local_z in 0..CHUNK_WIDTH {
                    let count = chunk.column(local_x as usize, local_z as usize).len();
                    for i in 0..count {
                        let handle = chunk.column(local_x as usize, local_z as usize)[i];
                        let cell = chunk.cell_mut(handle);
                        if !cell.is_dirty() {
                            continue;
                        }

                        let (bottom, top) = cell.write_back_range(&params);
                        for y in bottom..=top {
                            let pos = origin.block_at(local_x, y, local_z);
                            let expected = cell.expected_state(y, &params);
                            if world_buffer.get(world, pos) != expected {
                                world_buffer.set(pos, expected);
                                written += 1;
                            }
                        }
                        cell.finish_write_back(&params);
                    }
                }
            }
        }

        written
    }
}
