//! # Basalt Utils
//!
//! Coordinate types and small codecs shared by the Basalt crates.

pub mod codec;
pub mod math;
pub mod types;

pub use types::{BlockPos, CHUNK_WIDTH, ChunkPos, WORLD_HEIGHT};
