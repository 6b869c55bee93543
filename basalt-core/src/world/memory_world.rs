//! In-memory host world.
//!
//! Useful for:
//! - Tests that drive the full tick loop
//! - The standalone runner
//!
//! Chunks are whole 16x16x256 columns of raw states. Nothing is persisted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use basalt_utils::{BlockPos, CHUNK_WIDTH, ChunkPos, WORLD_HEIGHT};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{WorldAccess, WorldWriteError};
use crate::voxel::RawBlockState;

const CHUNK_VOLUME: usize = (CHUNK_WIDTH * CHUNK_WIDTH * WORLD_HEIGHT) as usize;

/// What unloaded or out of range positions read as.
pub const UNLOADED_BLOCK: RawBlockState = RawBlockState::solid(u16::MAX);

/// An in-memory world of loaded chunk columns.
pub struct MemoryWorld {
    chunks: RwLock<FxHashMap<ChunkPos, Box<[RawBlockState]>>>,
    /// If true, every write is refused.
    reject_writes: AtomicBool,
    /// Number of successful writes, for diagnostics.
    writes: AtomicUsize,
}

impl MemoryWorld {
    /// Creates a world with no chunks loaded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(FxHashMap::default()),
            reject_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    fn index(pos: BlockPos) -> usize {
        (pos.local_x() * 4096 + pos.local_z() * 256 + pos.0.y) as usize
    }

    /// Loads a chunk filled with `fill`. Replaces any loaded contents.
    pub fn load_chunk(&self, chunk: ChunkPos, fill: RawBlockState) {
        self.chunks
            .write()
            .insert(chunk, vec![fill; CHUNK_VOLUME].into_boxed_slice());
    }

    /// Loads a chunk where every column is solid up to and including `floor_y`
    /// and air above.
    pub fn load_flat_chunk(&self, chunk: ChunkPos, floor_y: i32, ground: RawBlockState) {
        let mut states = vec![RawBlockState::AIR; CHUNK_VOLUME].into_boxed_slice();
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                for y in 0..=floor_y.min(WORLD_HEIGHT - 1) {
                    states[(x * 4096 + z * 256 + y) as usize] = ground;
                }
            }
        }
        self.chunks.write().insert(chunk, states);
    }

    /// Unloads a chunk, dropping its contents.
    pub fn unload_chunk(&self, chunk: ChunkPos) {
        self.chunks.write().remove(&chunk);
    }

    /// Host-side edit that bypasses the simulation. Ignored for unloaded chunks.
    pub fn set_block(&self, pos: BlockPos, state: RawBlockState) {
        if !pos.is_in_height() {
            return;
        }
        if let Some(states) = self.chunks.write().get_mut(&pos.chunk_pos()) {
            states[Self::index(pos)] = state;
        }
    }

    /// Fills the inclusive box between `min` and `max` with `state`.
    pub fn fill(&self, min: BlockPos, max: BlockPos, state: RawBlockState) {
        for x in min.0.x..=max.0.x {
            for y in min.0.y..=max.0.y {
                for z in min.0.z..=max.0.z {
                    self.set_block(BlockPos::new(x, y, z), state);
                }
            }
        }
    }

    /// Makes every following write fail, or succeed again.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Relaxed);
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldAccess for MemoryWorld {
    fn read_voxel(&self, pos: BlockPos) -> RawBlockState {
        if !pos.is_in_height() {
            return UNLOADED_BLOCK;
        }
        self.chunks
            .read()
            .get(&pos.chunk_pos())
            .map_or(UNLOADED_BLOCK, |states| states[Self::index(pos)])
    }

    fn write_voxel(&self, pos: BlockPos, state: RawBlockState) -> Result<(), WorldWriteError> {
        if !pos.is_in_height() {
            return Err(WorldWriteError::OutOfBounds(pos));
        }
        if self.reject_writes.load(Ordering::Relaxed) {
            return Err(WorldWriteError::Rejected {
                pos,
                reason: "writes disabled".to_owned(),
            });
        }
        let mut chunks = self.chunks.write();
        let Some(states) = chunks.get_mut(&pos.chunk_pos()) else {
            return Err(WorldWriteError::ChunkNotLoaded(pos.chunk_pos()));
        };
        states[Self::index(pos)] = state;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
        self.chunks.read().contains_key(&chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_reads_solid() {
        let world = MemoryWorld::new();
        assert_eq!(world.read_voxel(BlockPos::new(0, 64, 0)), UNLOADED_BLOCK);
        assert!(!world.is_chunk_loaded(ChunkPos::new(0, 0)));
    }

    #[test]
    fn test_flat_chunk_and_writes() {
        let world = MemoryWorld::new();
        let stone = RawBlockState::solid(9);
        world.load_flat_chunk(ChunkPos::new(-1, 0), 10, stone);

        assert_eq!(world.read_voxel(BlockPos::new(-3, 10, 4)), stone);
        assert_eq!(world.read_voxel(BlockPos::new(-3, 11, 4)), RawBlockState::AIR);

        world
            .write_voxel(BlockPos::new(-3, 11, 4), stone)
            .expect("loaded chunk accepts writes");
        assert_eq!(world.read_voxel(BlockPos::new(-3, 11, 4)), stone);
        assert_eq!(world.write_count(), 1);

        world.set_reject_writes(true);
        assert!(world.write_voxel(BlockPos::new(-3, 12, 4), stone).is_err());
        world.set_reject_writes(false);
        assert_eq!(
            world.write_voxel(BlockPos::new(40, 12, 4), stone),
            Err(WorldWriteError::ChunkNotLoaded(ChunkPos::new(2, 0)))
        );
    }
}
