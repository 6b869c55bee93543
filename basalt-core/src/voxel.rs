//! Voxel classification.
//!
//! Maps a raw host block state into the small closed set of states the
//! simulation cares about. Classification is pure and must be redone whenever
//! the underlying block may have changed.

use rustc_hash::FxHashSet;

use crate::LEVELS_PER_BLOCK;
use crate::config::SimulationConfig;

/// A host block id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockId(pub u16);

/// Coarse material of a host block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Material {
    /// Nothing there.
    #[default]
    Air,
    /// Replaced outright by anything placed into it (snow layers, tall grass).
    Replaceable,
    /// Small plants and foliage that burn away.
    Plant,
    /// A liquid other than simulated lava.
    Fluid,
    /// Anything else.
    Solid,
}

/// A raw block state as seen by the host world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawBlockState {
    /// The block id.
    pub block: BlockId,
    /// The block material.
    pub material: Material,
    /// Flow height metadata, `0` for blocks without it, else `1..=12`.
    pub flow_height: u8,
}

impl RawBlockState {
    /// Air.
    pub const AIR: Self = Self {
        block: BlockId(0),
        material: Material::Air,
        flow_height: 0,
    };

    /// Creates a solid block without flow height.
    #[must_use]
    pub const fn solid(block: u16) -> Self {
        Self {
            block: BlockId(block),
            material: Material::Solid,
            flow_height: 0,
        }
    }
}

/// Simulation-relevant state of one voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoxelState {
    /// Open space.
    #[default]
    Empty,
    /// Live lava filling `level` twelfths of the block.
    Lava(u8),
    /// Cooled flow filling `level` twelfths of the block.
    SolidFlow(u8),
    /// Can never hold or pass fluid.
    Barrier,
}

impl VoxelState {
    /// A full block of lava.
    pub const FULL_LAVA: Self = Self::Lava(LEVELS_PER_BLOCK as u8);

    /// Returns true for every state except [`VoxelState::Barrier`].
    #[must_use]
    pub const fn is_space(self) -> bool {
        !matches!(self, Self::Barrier)
    }

    /// Returns true for [`VoxelState::Barrier`].
    #[must_use]
    pub const fn is_barrier(self) -> bool {
        matches!(self, Self::Barrier)
    }

    /// The height level carried by lava or solid flow; `0` otherwise.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Lava(level) | Self::SolidFlow(level) => level,
            Self::Empty | Self::Barrier => 0,
        }
    }
}

/// Maps raw host block states to [`VoxelState`].
#[derive(Debug, Clone)]
pub struct VoxelClassifier {
    lava: BlockId,
    basalt_flow: BlockId,
    cut_basalt: BlockId,
    displaceable: FxHashSet<BlockId>,
    non_displaceable: FxHashSet<BlockId>,
}

impl VoxelClassifier {
    /// Creates a classifier from the palette and override lists in `config`.
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        let palette = config.voxel_palette();
        Self {
            lava: palette.lava,
            basalt_flow: palette.basalt_flow,
            cut_basalt: palette.cut_basalt,
            displaceable: config.displaceable_set(),
            non_displaceable: config.non_displaceable_set(),
        }
    }

    /// Classifies a raw block state.
    #[must_use]
    pub fn classify(&self, raw: RawBlockState) -> VoxelState {
        if raw.material == Material::Replaceable {
            return VoxelState::Empty;
        }

        if raw.flow_height > 0 {
            let level = raw.flow_height.min(LEVELS_PER_BLOCK as u8);
            return if raw.block == self.lava {
                VoxelState::Lava(level)
            } else {
                VoxelState::SolidFlow(level)
            };
        }

        if self.is_displaceable(raw) {
            VoxelState::Empty
        } else {
            VoxelState::Barrier
        }
    }

    /// Returns true if lava may replace the block. Override lists win over the
    /// material default, the deny list over the allow list.
    #[must_use]
    pub fn is_displaceable(&self, raw: RawBlockState) -> bool {
        if self.non_displaceable.contains(&raw.block) {
            return false;
        }
        if self.displaceable.contains(&raw.block) {
            return true;
        }
        matches!(
            raw.material,
            Material::Air | Material::Replaceable | Material::Plant | Material::Fluid
        )
    }

    /// Open terrain also counts the blocks the simulation itself produces, so
    /// callers see the native terrain shape instead of transient flow state.
    #[must_use]
    pub fn is_open_terrain(&self, raw: RawBlockState) -> bool {
        raw.flow_height > 0
            || raw.block == self.lava
            || raw.block == self.basalt_flow
            || raw.block == self.cut_basalt
            || self.is_displaceable(raw)
    }
}

/// Block ids used when writing states back to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelPalette {
    /// Written for [`VoxelState::Empty`].
    pub air: BlockId,
    /// Written for [`VoxelState::Lava`].
    pub lava: BlockId,
    /// Written for [`VoxelState::SolidFlow`].
    pub basalt_flow: BlockId,
    /// Written for [`VoxelState::Barrier`].
    pub cut_basalt: BlockId,
}

impl VoxelPalette {
    /// Returns the raw block the host should place for `state`.
    #[must_use]
    pub const fn to_raw(&self, state: VoxelState) -> RawBlockState {
        match state {
            VoxelState::Empty => RawBlockState {
                block: self.air,
                material: Material::Air,
                flow_height: 0,
            },
            VoxelState::Lava(level) => RawBlockState {
                block: self.lava,
                material: Material::Fluid,
                flow_height: level,
            },
            VoxelState::SolidFlow(level) => RawBlockState {
                block: self.basalt_flow,
                material: Material::Solid,
                flow_height: level,
            },
            VoxelState::Barrier => RawBlockState {
                block: self.cut_basalt,
                material: Material::Solid,
                flow_height: 0,
            },
        }
    }
}
