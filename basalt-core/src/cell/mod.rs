//! Per-column fluid cells and their redistribution.
//!
//! A cell is a vertically contiguous span of space between barriers in one
//! column. Heights are absolute height units (`y * 12 + level`), amounts are
//! fluid units. Cells live in per-chunk arenas inside the [`CellWorld`].

mod cell_chunk;
mod cell_world;
mod lava_cell;

pub use cell_chunk::{CellChunk, column_index};
pub use cell_world::{CellWorld, RedistributeOutcome, SolidifyOutcome};
pub use lava_cell::LavaCell;

use crate::LEVELS_PER_BLOCK;
use crate::config::SimulationConfig;

/// Height units spanned by one block.
pub const HEIGHT_UNITS_PER_BLOCK: i32 = LEVELS_PER_BLOCK;

/// Constants the cell model reads every tick, taken from the config once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowParams {
    /// Fluid units per height level.
    pub units_per_level: i64,
    /// Fluid units per block.
    pub units_per_block: i64,
    /// Surface rise per unit over capacity.
    pub pressure_factor: i64,
    /// Units a cell may hold over its capacity.
    pub headroom: i64,
    /// Per pair, per tick transfer bound.
    pub max_transfer: i64,
    /// Smaller transfers over a drop edge become drips.
    pub min_flow: i64,
    /// Idle ticks after which an all-empty chunk is released.
    pub idle_retention_ticks: u32,
    /// Ticks without movement before a thin flow crusts over.
    pub solidify_after_ticks: u32,
}

impl FlowParams {
    /// Extracts the flow constants from `config`.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            units_per_level: config.fluid_units_per_level,
            units_per_block: config.fluid_units_per_block,
            pressure_factor: config.pressure_factor,
            headroom: config.pressure_headroom_units(),
            max_transfer: config.max_transfer_per_tick,
            min_flow: config.min_flow_units,
            idle_retention_ticks: config.idle_retention_ticks,
            solidify_after_ticks: config.solidify_after_ticks,
        }
    }
}

impl Default for FlowParams {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}
