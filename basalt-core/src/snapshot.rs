//! Dense per-chunk copies of classified voxel states.
//!
//! A snapshot is filled by one whole-chunk scan and laid out column-major, so
//! the 256 states of one vertical column are a single contiguous slice.

use basalt_utils::{BlockPos, CHUNK_WIDTH, ChunkPos, WORLD_HEIGHT};

use crate::voxel::{VoxelClassifier, VoxelState};
use crate::world::WorldAccess;
use crate::world_buffer::ChunkWriteBuffer;

/// Anything a snapshot can be read from.
pub trait VoxelSource {
    /// The classified state at `pos`.
    fn voxel_state(&self, pos: BlockPos) -> VoxelState;
}

/// Reads the live world through the classifier.
pub struct LiveSource<'a, W: WorldAccess + ?Sized> {
    /// The host world.
    pub world: &'a W,
    /// Classifier for raw states.
    pub classifier: &'a VoxelClassifier,
}

impl<W: WorldAccess + ?Sized> VoxelSource for LiveSource<'_, W> {
    fn voxel_state(&self, pos: BlockPos) -> VoxelState {
        self.classifier.classify(self.world.read_voxel(pos))
    }
}

/// Reads pending writes first and falls back to the live world.
pub struct OverlaySource<'a, W: WorldAccess + ?Sized> {
    /// Pending writes for the chunk being scanned.
    pub buffer: &'a ChunkWriteBuffer,
    /// The world underneath.
    pub live: LiveSource<'a, W>,
}

impl<W: WorldAccess + ?Sized> VoxelSource for OverlaySource<'_, W> {
    fn voxel_state(&self, pos: BlockPos) -> VoxelState {
        self.buffer
            .get(pos)
            .unwrap_or_else(|| self.live.voxel_state(pos))
    }
}

/// Classified states of one 16x16x256 chunk column.
pub struct ChunkSnapshot {
    chunk: ChunkPos,
    states: Box<[VoxelState]>,
}

impl ChunkSnapshot {
    /// Number of voxels in one snapshot.
    pub const VOLUME: usize = (CHUNK_WIDTH * CHUNK_WIDTH * WORLD_HEIGHT) as usize;

    /// Allocates an all-empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk: ChunkPos::new(0, 0),
            states: vec![VoxelState::Empty; Self::VOLUME].into_boxed_slice(),
        }
    }

    /// Index of a chunk-local coordinate.
    #[inline]
    #[must_use]
    pub const fn index(x: usize, y: usize, z: usize) -> usize {
        x * 4096 + z * 256 + y
    }

    /// Overwrites every entry with a fresh scan of `source`.
    pub fn read_chunk(&mut self, source: &impl VoxelSource, chunk: ChunkPos) {
        self.chunk = chunk;
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                let base = Self::index(x as usize, 0, z as usize);
                let column = &mut self.states[base..base + WORLD_HEIGHT as usize];
                for (y, state) in column.iter_mut().enumerate() {
                    *state = source.voxel_state(chunk.block_at(x, y as i32, z));
                }
            }
        }
    }

    /// The chunk this snapshot was last filled from.
    #[must_use]
    pub fn chunk_pos(&self) -> ChunkPos {
        self.chunk
    }

    /// The state at a chunk-local coordinate.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> VoxelState {
        self.states[Self::index(x, y, z)]
    }

    /// The full vertical column at a chunk-local coordinate, bottom first.
    #[inline]
    #[must_use]
    pub fn column(&self, x: usize, z: usize) -> &[VoxelState] {
        let base = Self::index(x, 0, z);
        &self.states[base..base + WORLD_HEIGHT as usize]
    }
}

impl Default for ChunkSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulationConfig;
    use crate::voxel::RawBlockState;
    use crate::world::MemoryWorld;

    #[test]
    fn test_column_is_contiguous() {
        assert_eq!(ChunkSnapshot::index(0, 1, 0), 1);
        assert_eq!(ChunkSnapshot::index(0, 0, 1), 256);
        assert_eq!(ChunkSnapshot::index(1, 0, 0), 4096);
        assert_eq!(ChunkSnapshot::index(15, 255, 15), ChunkSnapshot::VOLUME - 1);
    }

    #[test]
    fn test_read_live_chunk() {
        let config = SimulationConfig::default();
        let classifier = VoxelClassifier::new(&config);
        let world = MemoryWorld::new();
        let chunk = ChunkPos::new(1, -1);
        world.load_flat_chunk(chunk, 10, RawBlockState::solid(9));

        let mut snapshot = ChunkSnapshot::new();
        snapshot.read_chunk(
            &LiveSource {
                world: &world,
                classifier: &classifier,
            },
            chunk,
        );

        assert_eq!(snapshot.chunk_pos(), chunk);
        let column = snapshot.column(3, 4);
        assert!(column[..=10].iter().all(|s| s.is_barrier()));
        assert!(column[11..].iter().all(|s| *s == VoxelState::Empty));
        assert_eq!(snapshot.get(3, 10, 4), VoxelState::Barrier);
    }

    #[test]
    fn test_rescan_overwrites() {
        let config = SimulationConfig::default();
        let classifier = VoxelClassifier::new(&config);
        let world = MemoryWorld::new();
        let chunk = ChunkPos::new(0, 0);
        world.load_flat_chunk(chunk, 10, RawBlockState::solid(9));
        let live = LiveSource {
            world: &world,
            classifier: &classifier,
        };

        let mut snapshot = ChunkSnapshot::new();
        snapshot.read_chunk(&live, chunk);
        world.set_block(BlockPos::new(2, 10, 2), RawBlockState::AIR);
        snapshot.read_chunk(&live, chunk);

        assert_eq!(snapshot.get(2, 10, 2), VoxelState::Empty);
        assert_eq!(snapshot.get(2, 9, 2), VoxelState::Barrier);
    }
}
