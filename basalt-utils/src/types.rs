// Wrapper types making it harder to accidentaly mix up block and chunk coordinates.

use std::fmt::{self, Display};

use crate::math::{Vector2, Vector3};

/// Width of a chunk along the x and z axes.
pub const CHUNK_WIDTH: i32 = 16;

/// Number of blocks in one world column. Valid y values are `0..WORLD_HEIGHT`.
pub const WORLD_HEIGHT: i32 = 256;

const PACKED_X_BITS: i64 = 26;
const PACKED_Z_BITS: i64 = 26;
const PACKED_Y_BITS: i64 = 12;
const PACKED_X_MASK: i64 = (1 << PACKED_X_BITS) - 1;
const PACKED_Z_MASK: i64 = (1 << PACKED_Z_BITS) - 1;
const PACKED_Y_MASK: i64 = (1 << PACKED_Y_BITS) - 1;
const Z_OFFSET: i64 = PACKED_Y_BITS;
const X_OFFSET: i64 = PACKED_Y_BITS + PACKED_Z_BITS;

// A chunk position. `0.y` holds the world z coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPos(pub Vector2<i32>);

// A block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos(pub Vector3<i32>);

impl ChunkPos {
    /// Creates a chunk position from chunk coordinates.
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self(Vector2::new(x, z))
    }

    /// Packs the position into a single `i64`, x in the low half.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        (self.0.x as u32 as i64) | ((self.0.y as u32 as i64) << 32)
    }

    /// Inverse of [`ChunkPos::as_i64`].
    #[must_use]
    pub const fn from_i64(packed: i64) -> Self {
        Self::new(packed as i32, (packed >> 32) as i32)
    }

    /// The smallest block x coordinate inside this chunk.
    #[must_use]
    pub const fn min_block_x(self) -> i32 {
        self.0.x * CHUNK_WIDTH
    }

    /// The smallest block z coordinate inside this chunk.
    #[must_use]
    pub const fn min_block_z(self) -> i32 {
        self.0.y * CHUNK_WIDTH
    }

    /// Returns the world position of a chunk-local coordinate.
    #[must_use]
    pub const fn block_at(self, local_x: i32, y: i32, local_z: i32) -> BlockPos {
        BlockPos::new(self.min_block_x() + local_x, y, self.min_block_z() + local_z)
    }

    /// Returns true if the block lies in this chunk's column.
    #[must_use]
    pub fn contains(self, pos: BlockPos) -> bool {
        pos.chunk_pos() == self
    }

    /// Returns the chunk offset by whole chunks.
    #[must_use]
    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.0.x + dx, self.0.y + dz)
    }
}

impl Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.0.x, self.0.y)
    }
}

impl BlockPos {
    /// Creates a block position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self(Vector3::new(x, y, z))
    }

    /// Offsets the position by the given deltas.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.0.x + dx, self.0.y + dy, self.0.z + dz)
    }

    /// The block directly below.
    #[must_use]
    pub const fn below(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// The block directly above.
    #[must_use]
    pub const fn above(self) -> Self {
        self.offset(0, 1, 0)
    }

    /// The six face-connected neighbors, down and up first.
    #[must_use]
    pub const fn neighbors(self) -> [Self; 6] {
        [
            self.offset(0, -1, 0),
            self.offset(0, 1, 0),
            self.offset(0, 0, -1),
            self.offset(0, 0, 1),
            self.offset(-1, 0, 0),
            self.offset(1, 0, 0),
        ]
    }

    /// The chunk column containing this block.
    #[must_use]
    pub const fn chunk_pos(self) -> ChunkPos {
        ChunkPos::new(self.0.x >> 4, self.0.z >> 4)
    }

    /// The x coordinate within the chunk, `0..16`.
    #[must_use]
    pub const fn local_x(self) -> i32 {
        self.0.x & (CHUNK_WIDTH - 1)
    }

    /// The z coordinate within the chunk, `0..16`.
    #[must_use]
    pub const fn local_z(self) -> i32 {
        self.0.z & (CHUNK_WIDTH - 1)
    }

    /// Returns true if y lies inside the simulated column height.
    #[must_use]
    pub const fn is_in_height(self) -> bool {
        self.0.y >= 0 && self.0.y < WORLD_HEIGHT
    }

    /// Packs the position into an `i64`: 26 bits x, 26 bits z, 12 bits y.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        ((self.0.x as i64 & PACKED_X_MASK) << X_OFFSET)
            | ((self.0.z as i64 & PACKED_Z_MASK) << Z_OFFSET)
            | (self.0.y as i64 & PACKED_Y_MASK)
    }

    /// Inverse of [`BlockPos::as_i64`].
    #[must_use]
    pub const fn from_i64(packed: i64) -> Self {
        let x = (packed >> X_OFFSET) as i32;
        let y = ((packed << (64 - PACKED_Y_BITS)) >> (64 - PACKED_Y_BITS)) as i32;
        let z = ((packed << (64 - X_OFFSET)) >> (64 - PACKED_Z_BITS)) as i32;
        Self::new(x, y, z)
    }
}

impl Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0.x, self.0.y, self.0.z)
    }
}
