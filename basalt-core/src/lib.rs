//! # Basalt Core
//!
//! A tick-driven cellular lava model for voxel worlds.
//!
//! # Architecture
//!
//! - [`voxel`] - Classifies raw host block states into simulation states
//! - [`snapshot`] - Dense per-chunk copies of classified states
//! - [`world_buffer`] - Deferred world writes and adjustment bookkeeping
//! - [`loader`] - Queue of chunk snapshots waiting for cell reconstruction
//! - [`cell`] - Per-column fluid cells and their redistribution
//! - [`terrain`] - Line-of-sight search for the ideal settled flow height
//! - [`particle`] - Aggregation of small drips into emitted particles
//! - [`simulation`] - Wires everything into one tick
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
    clippy::needless_pass_by_value,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

pub mod cell;
pub mod config;
pub mod loader;
pub mod particle;
pub mod simulation;
pub mod snapshot;
pub mod terrain;
pub mod voxel;
pub mod world;
pub mod world_buffer;

pub use config::SimulationConfig;
pub use simulation::{LavaSimulator, TickReport};
pub use voxel::{BlockId, Material, RawBlockState, VoxelState};
pub use world::{MemoryWorld, WorldAccess, WorldWriteError};

/// Number of discrete height levels in one block.
pub const LEVELS_PER_BLOCK: i32 = 12;
