//! The host world boundary.
//!
//! The simulation never mutates host storage directly; everything goes through
//! [`WorldAccess`], and writes only happen from
//! [`WorldStateBuffer::flush`](crate::world_buffer::WorldStateBuffer::flush).

use basalt_utils::{BlockPos, ChunkPos};
use thiserror::Error;

use crate::voxel::RawBlockState;

mod memory_world;

pub use memory_world::MemoryWorld;

/// A block write the host refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorldWriteError {
    /// The chunk holding the position is not loaded.
    #[error("chunk {0} is not loaded")]
    ChunkNotLoaded(ChunkPos),
    /// The position lies outside the world height.
    #[error("position {0} is out of bounds")]
    OutOfBounds(BlockPos),
    /// The host rejected the write for its own reasons.
    #[error("write at {pos} rejected: {reason}")]
    Rejected {
        /// Target position.
        pos: BlockPos,
        /// Host supplied reason.
        reason: String,
    },
}

/// Read and write access to the host's block storage.
///
/// `write_voxel` is only ever called from the host's mutation context; reads
/// may happen from any thread.
pub trait WorldAccess: Send + Sync {
    /// Reads the raw block at `pos`. Unloaded or out of range positions read as
    /// solid rock from the host's point of view.
    fn read_voxel(&self, pos: BlockPos) -> RawBlockState;

    /// Writes a raw block.
    fn write_voxel(&self, pos: BlockPos, state: RawBlockState) -> Result<(), WorldWriteError>;

    /// Returns true if the chunk is loaded and may be read.
    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool;
}
