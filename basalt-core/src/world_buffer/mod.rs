//! Deferred world writes.
//!
//! Reads merge pending writes over the live world; writes land in an
//! in-memory overlay and reach the host only when [`WorldStateBuffer::flush`]
//! runs in the host's mutation context.

use basalt_utils::{BlockPos, ChunkPos};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::terrain::TerrainProbe;
use crate::voxel::{VoxelClassifier, VoxelPalette, VoxelState};
use crate::world::{WorldAccess, WorldWriteError};

mod adjustment;

pub use adjustment::AdjustmentTracker;

/// A flush that could not apply every pending write.
///
/// The rejected writes stay in the overlay and are retried by the next flush.
#[derive(Debug, Error)]
#[error("{failed} pending writes were rejected ({written} applied): {source}")]
pub struct FlushError {
    /// Writes that reached the host.
    pub written: usize,
    /// Writes kept for retry.
    pub failed: usize,
    /// The first host error seen.
    pub source: WorldWriteError,
}

/// Pending writes of one chunk, keyed by chunk-local index.
#[derive(Debug, Clone)]
pub struct ChunkWriteBuffer {
    chunk: ChunkPos,
    states: FxHashMap<u16, VoxelState>,
}

impl ChunkWriteBuffer {
    /// Creates an empty buffer for `chunk`.
    #[must_use]
    pub fn new(chunk: ChunkPos) -> Self {
        Self {
            chunk,
            states: FxHashMap::default(),
        }
    }

    fn local_index(pos: BlockPos) -> u16 {
        (pos.local_x() * 4096 + pos.local_z() * 256 + pos.0.y) as u16
    }

    fn position_of(&self, index: u16) -> BlockPos {
        let index = i32::from(index);
        self.chunk
            .block_at(index >> 12, index & 0xFF, (index >> 8) & 0xF)
    }

    /// The chunk these writes belong to.
    #[must_use]
    pub fn chunk_pos(&self) -> ChunkPos {
        self.chunk
    }

    /// The pending state at `pos`, if any.
    #[must_use]
    pub fn get(&self, pos: BlockPos) -> Option<VoxelState> {
        if !self.chunk.contains(pos) || !pos.is_in_height() {
            return None;
        }
        self.states.get(&Self::local_index(pos)).copied()
    }

    /// Records a pending state, replacing an older one.
    pub fn set(&mut self, pos: BlockPos, state: VoxelState) {
        debug_assert!(self.chunk.contains(pos) && pos.is_in_height());
        self.states.insert(Self::local_index(pos), state);
    }

    /// Records a pending state unless a newer one is already present.
    fn set_if_absent(&mut self, pos: BlockPos, state: VoxelState) {
        self.states.entry(Self::local_index(pos)).or_insert(state);
    }

    /// Number of pending writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All pending writes in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockPos, VoxelState)> + '_ {
        self.states
            .iter()
            .map(|(&index, &state)| (self.position_of(index), state))
    }
}

/// Write-deferring facade over the live world.
pub struct WorldStateBuffer {
    /// Pending writes by packed chunk position.
    overlay: scc::HashMap<i64, ChunkWriteBuffer>,
    adjustments: AdjustmentTracker,
    classifier: VoxelClassifier,
    palette: VoxelPalette,
}

impl WorldStateBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(classifier: VoxelClassifier, palette: VoxelPalette) -> Self {
        Self {
            overlay: scc::HashMap::new(),
            adjustments: AdjustmentTracker::new(),
            classifier,
            palette,
        }
    }

    /// The classifier used for live reads.
    #[must_use]
    pub fn classifier(&self) -> &VoxelClassifier {
        &self.classifier
    }

    /// The adjustment tracker fed by [`WorldStateBuffer::set`].
    #[must_use]
    pub fn adjustments(&self) -> &AdjustmentTracker {
        &self.adjustments
    }

    /// The pending state at `pos` if any, else the classified live state.
    /// Positions outside the world height read as [`VoxelState::Barrier`].
    pub fn get(&self, world: &(impl WorldAccess + ?Sized), pos: BlockPos) -> VoxelState {
        if !pos.is_in_height() {
            return VoxelState::Barrier;
        }
        self.pending(pos)
            .unwrap_or_else(|| self.classifier.classify(world.read_voxel(pos)))
    }

    /// The pending state at `pos`, ignoring the live world.
    #[must_use]
    pub fn pending(&self, pos: BlockPos) -> Option<VoxelState> {
        self.overlay
            .read_sync(&pos.chunk_pos().as_i64(), |_, buffer| buffer.get(pos))
            .flatten()
    }

    /// Buffers a write and flags its neighborhood for re-validation.
    /// Positions outside the world height are ignored.
    pub fn set(&self, pos: BlockPos, state: VoxelState) {
        if !pos.is_in_height() {
            return;
        }
        self.insert_pending(pos, state, ChunkWriteBuffer::set);
        self.adjustments.set_adjustment_needed_around(pos);
    }

    fn insert_pending(
        &self,
        pos: BlockPos,
        state: VoxelState,
        apply: fn(&mut ChunkWriteBuffer, BlockPos, VoxelState),
    ) {
        let chunk = pos.chunk_pos();
        let key = chunk.as_i64();
        loop {
            if self
                .overlay
                .update_sync(&key, |_, buffer| apply(buffer, pos, state))
                .is_some()
            {
                return;
            }
            let mut buffer = ChunkWriteBuffer::new(chunk);
            apply(&mut buffer, pos, state);
            if self.overlay.insert_sync(key, buffer).is_ok() {
                return;
            }
        }
    }

    /// A copy of the pending writes for `chunk`, for snapshotting without a
    /// flush. `None` if the chunk has nothing pending.
    #[must_use]
    pub fn chunk_buffer_if_exists(&self, chunk: ChunkPos) -> Option<ChunkWriteBuffer> {
        self.overlay
            .read_sync(&chunk.as_i64(), |_, buffer| buffer.clone())
            .filter(|buffer| !buffer.is_empty())
    }

    /// Returns true if `chunk` has pending writes.
    #[must_use]
    pub fn has_pending(&self, chunk: ChunkPos) -> bool {
        self.overlay
            .read_sync(&chunk.as_i64(), |_, buffer| !buffer.is_empty())
            .unwrap_or(false)
    }

    /// Total number of pending writes.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        let mut total = 0;
        self.overlay.iter_sync(|_, buffer| {
            total += buffer.len();
            true
        });
        total
    }

    /// Drops pending writes and adjustment flags of an unloaded chunk.
    pub fn discard_chunk(&self, chunk: ChunkPos) {
        if let Some((_, buffer)) = self.overlay.remove_sync(&chunk.as_i64()) {
            log::debug!("Discarded {} pending writes of unloaded chunk {chunk}", buffer.len());
        }
        self.adjustments.clear_chunk(chunk);
    }

    /// Applies every pending write to the live world and clears the overlay.
    ///
    /// Must run in the host's mutation context. Writes to chunks the host no
    /// longer has loaded are dropped. Rejected writes are kept for the next
    /// flush and reported through [`FlushError`].
    pub fn flush(&self, world: &(impl WorldAccess + ?Sized)) -> Result<usize, FlushError> {
        let mut keys = Vec::new();
        self.overlay.iter_sync(|key, _| {
            keys.push(*key);
            true
        });

        let mut written = 0;
        let mut retry = Vec::new();
        let mut first_error = None;

        for key in keys {
            let Some((_, buffer)) = self.overlay.remove_sync(&key) else {
                continue;
            };
            if !world.is_chunk_loaded(buffer.chunk_pos()) {
                log::warn!(
                    "Dropping {} pending writes for unloaded chunk {}",
                    buffer.len(),
                    buffer.chunk_pos()
                );
                continue;
            }

            for (pos, state) in buffer.iter() {
                match world.write_voxel(pos, self.palette.to_raw(state)) {
                    Ok(()) => written += 1,
                    Err(WorldWriteError::ChunkNotLoaded(chunk)) => {
                        log::warn!("Chunk {chunk} unloaded during flush, dropping write at {pos}");
                    }
                    Err(error) => {
                        retry.push((pos, state));
                        first_error.get_or_insert(error);
                    }
                }
            }
        }

        let failed = retry.len();
        for (pos, state) in retry {
            self.insert_pending(pos, state, ChunkWriteBuffer::set_if_absent);
        }

        match first_error {
            Some(source) => Err(FlushError {
                written,
                failed,
                source,
            }),
            None => Ok(written),
        }
    }

    /// Open terrain as seen through pending writes: a pending non-barrier
    /// state is open, otherwise the live block is asked.
    pub fn is_open_terrain(&self, world: &(impl WorldAccess + ?Sized), pos: BlockPos) -> bool {
        if !pos.is_in_height() {
            return false;
        }
        match self.pending(pos) {
            Some(state) => state.is_space(),
            None => self.classifier.is_open_terrain(world.read_voxel(pos)),
        }
    }

    /// Borrows the buffer and a world as a [`TerrainProbe`].
    pub fn terrain<'a, W: WorldAccess + ?Sized>(&'a self, world: &'a W) -> BufferedTerrain<'a, W> {
        BufferedTerrain {
            buffer: self,
            world,
        }
    }
}

/// Terrain probe over a [`WorldStateBuffer`] and its world.
pub struct BufferedTerrain<'a, W: WorldAccess + ?Sized> {
    buffer: &'a WorldStateBuffer,
    world: &'a W,
}

impl<W: WorldAccess + ?Sized> TerrainProbe for BufferedTerrain<'_, W> {
    fn is_open_terrain(&self, pos: BlockPos) -> bool {
        self.buffer.is_open_terrain(self.world, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulationConfig;
    use crate::voxel::RawBlockState;
    use crate::world::MemoryWorld;

    fn setup() -> (WorldStateBuffer, MemoryWorld) {
        let config = SimulationConfig::default();
        let buffer = WorldStateBuffer::new(VoxelClassifier::new(&config), config.voxel_palette());
        let world = MemoryWorld::new();
        world.load_flat_chunk(ChunkPos::new(0, 0), 10, RawBlockState::solid(9));
        (buffer, world)
    }

    #[test]
    fn test_reads_merge_overlay() {
        let (buffer, world) = setup();
        let pos = BlockPos::new(4, 11, 4);
        assert_eq!(buffer.get(&world, pos), VoxelState::Empty);

        buffer.set(pos, VoxelState::Lava(6));
        assert_eq!(buffer.get(&world, pos), VoxelState::Lava(6));
        // the live world is untouched until flush
        assert_eq!(world.read_voxel(pos), RawBlockState::AIR);
        assert!(buffer.adjustments().is_flagged(pos.above()));
        assert!(buffer.has_pending(ChunkPos::new(0, 0)));
        assert!(!buffer.has_pending(ChunkPos::new(1, 0)));
    }

    #[test]
    fn test_flush_applies_and_clears() {
        let (buffer, world) = setup();
        buffer.set(BlockPos::new(1, 11, 1), VoxelState::Lava(12));
        buffer.set(BlockPos::new(2, 11, 1), VoxelState::SolidFlow(4));
        assert_eq!(buffer.pending_len(), 2);

        assert_eq!(buffer.flush(&world).expect("flush"), 2);
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(
            buffer.get(&world, BlockPos::new(2, 11, 1)),
            VoxelState::SolidFlow(4)
        );
        assert_eq!(
            buffer.get(&world, BlockPos::new(1, 11, 1)),
            VoxelState::FULL_LAVA
        );
    }

    #[test]
    fn test_rejected_writes_are_retried() {
        let (buffer, world) = setup();
        let pos = BlockPos::new(3, 12, 3);
        buffer.set(pos, VoxelState::Lava(2));

        world.set_reject_writes(true);
        let error = buffer.flush(&world).expect_err("writes rejected");
        assert_eq!(error.failed, 1);
        assert_eq!(buffer.pending(pos), Some(VoxelState::Lava(2)));

        world.set_reject_writes(false);
        assert_eq!(buffer.flush(&world).expect("retry"), 1);
        assert_eq!(buffer.get(&world, pos), VoxelState::Lava(2));
    }

    #[test]
    fn test_unloaded_chunk_writes_dropped() {
        let (buffer, world) = setup();
        buffer.set(BlockPos::new(20, 11, 0), VoxelState::Lava(3));
        assert_eq!(buffer.flush(&world).expect("flush"), 0);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_chunk_buffer_copy() {
        let (buffer, _world) = setup();
        let pos = BlockPos::new(15, 200, 15);
        buffer.set(pos, VoxelState::SolidFlow(12));

        let copy = buffer
            .chunk_buffer_if_exists(ChunkPos::new(0, 0))
            .expect("pending writes");
        assert_eq!(copy.iter().collect::<Vec<_>>(), vec![(pos, VoxelState::SolidFlow(12))]);
        assert!(buffer.chunk_buffer_if_exists(ChunkPos::new(0, 1)).is_none());
    }

    #[test]
    fn test_open_terrain_through_overlay() {
        let (buffer, world) = setup();
        let ground = BlockPos::new(5, 10, 5);
        assert!(!buffer.is_open_terrain(&world, ground));
        buffer.set(ground, VoxelState::Empty);
        assert!(buffer.is_open_terrain(&world, ground));
        assert!(!buffer.is_open_terrain(&world, BlockPos::new(5, -1, 5)));
    }
}
