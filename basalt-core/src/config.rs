//! Tunable simulation parameters.
//!
//! Loaded from a json5 file; every field has a default so partial files work.

use std::{fs, io, path::Path};

use rustc_hash::FxHashSet;
use serde::Deserialize;
use thiserror::Error;

use crate::LEVELS_PER_BLOCK;
use crate::voxel::{BlockId, VoxelPalette};

/// The bundled default configuration, written out when no file exists.
pub const DEFAULT_CONFIG: &str = include_str!("../package-content/basalt_config.json5");

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid json5 or does not match the schema.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json5::Error),
    /// A value is out of range or inconsistent with another one.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// All recognized simulation options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Surface rise per excess unit once a cell is over capacity.
    pub pressure_factor: i64,
    /// Fluid units making up one full block.
    pub fluid_units_per_block: i64,
    /// Fluid units making up one height level.
    pub fluid_units_per_level: i64,
    /// Height levels a cell may hold above its open volume.
    pub pressure_headroom_levels: i64,
    /// Upper bound of units moved between one cell pair per tick.
    pub max_transfer_per_tick: i64,
    /// Transfers smaller than this over a drop edge become drips.
    pub min_flow_units: i64,
    /// Minimum particle age before a one-level bucket is emitted.
    pub particle_min_wait_ticks: u32,
    /// Age after which a bucket is emitted regardless of size.
    pub particle_max_wait_ticks: u32,
    /// Upper bound on particles emitted per tick.
    pub max_particles_per_tick: usize,
    /// Blocks that lava may always displace.
    pub displaceable_blocks: Vec<u16>,
    /// Blocks that lava may never displace.
    pub non_displaceable_blocks: Vec<u16>,
    /// Search radius of the terrain visibility resolver.
    pub visibility_radius: u8,
    /// Ticks a chunk of empty cells is kept before its cells are released.
    pub idle_retention_ticks: u32,
    /// Ticks without movement after which a thin flow crusts over.
    pub solidify_after_ticks: u32,
    /// Upper bound on recycled snapshot buffers kept around.
    pub max_free_snapshots: usize,
    /// Block ids the simulation writes back.
    pub palette: PaletteConfig,
}

/// Block ids of the blocks the simulation itself places.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    /// Air.
    pub air: u16,
    /// Live lava height block.
    pub lava: u16,
    /// Cooled flow height block.
    pub basalt_flow: u16,
    /// Full cut basalt block.
    pub cut_basalt: u16,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            air: 0,
            lava: 1,
            basalt_flow: 2,
            cut_basalt: 3,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pressure_factor: 8,
            fluid_units_per_block: 12_000,
            fluid_units_per_level: 1_000,
            pressure_headroom_levels: 12,
            max_transfer_per_tick: 6_000,
            min_flow_units: 50,
            particle_min_wait_ticks: 4,
            particle_max_wait_ticks: 40,
            max_particles_per_tick: 64,
            displaceable_blocks: Vec::new(),
            non_displaceable_blocks: Vec::new(),
            visibility_radius: 7,
            idle_retention_ticks: 200,
            solidify_after_ticks: 60,
            max_free_snapshots: 64,
            palette: PaletteConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Loads the config from `path`, writing the bundled default if it is missing.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let config_str = fs::read_to_string(path)?;
            serde_json5::from_str::<Self>(&config_str)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, DEFAULT_CONFIG)?;
            log::info!("Wrote default simulation config to {}", path.display());
            serde_json5::from_str::<Self>(DEFAULT_CONFIG)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fluid_units_per_level <= 0 {
            return Err(ConfigError::Invalid("fluid_units_per_level must be positive"));
        }
        if self.fluid_units_per_block != self.fluid_units_per_level * i64::from(LEVELS_PER_BLOCK) {
            return Err(ConfigError::Invalid(
                "fluid_units_per_block must equal fluid_units_per_level * 12",
            ));
        }
        if self.pressure_factor < 1 {
            return Err(ConfigError::Invalid("pressure_factor must be at least 1"));
        }
        if self.pressure_headroom_levels < 0 {
            return Err(ConfigError::Invalid("pressure_headroom_levels must not be negative"));
        }
        if self.max_transfer_per_tick <= 0 {
            return Err(ConfigError::Invalid("max_transfer_per_tick must be positive"));
        }
        if self.min_flow_units < 0 {
            return Err(ConfigError::Invalid("min_flow_units must not be negative"));
        }
        if self.particle_min_wait_ticks > self.particle_max_wait_ticks {
            return Err(ConfigError::Invalid(
                "particle_min_wait_ticks must not exceed particle_max_wait_ticks",
            ));
        }
        if !(1..=12).contains(&self.visibility_radius) {
            return Err(ConfigError::Invalid("visibility_radius must be in range 1..=12"));
        }
        Ok(())
    }

    /// The allow list as a set of block ids.
    #[must_use]
    pub fn displaceable_set(&self) -> FxHashSet<BlockId> {
        self.displaceable_blocks.iter().copied().map(BlockId).collect()
    }

    /// The deny list as a set of block ids.
    #[must_use]
    pub fn non_displaceable_set(&self) -> FxHashSet<BlockId> {
        self.non_displaceable_blocks.iter().copied().map(BlockId).collect()
    }

    /// The write-back palette.
    #[must_use]
    pub fn voxel_palette(&self) -> VoxelPalette {
        VoxelPalette {
            air: BlockId(self.palette.air),
            lava: BlockId(self.palette.lava),
            basalt_flow: BlockId(self.palette.basalt_flow),
            cut_basalt: BlockId(self.palette.cut_basalt),
        }
    }

    /// Maximum units a cell holds above its open volume.
    #[must_use]
    pub fn pressure_headroom_units(&self) -> i64 {
        self.pressure_headroom_levels * self.fluid_units_per_level
    }
}
