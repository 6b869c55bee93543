use basalt_core::voxel::{VoxelClassifier, VoxelState};
use basalt_core::{MemoryWorld, RawBlockState, WorldAccess};
use basalt_utils::{BlockPos, ChunkPos};

const STONE: RawBlockState = RawBlockState::solid(9);
const GROUND_Y: i32 = 40;

/// A lava vent on a terraced slope.
pub struct DemoWorld {
    /// The host world.
    pub world: MemoryWorld,
    /// Loaded chunks.
    pub chunks: Vec<ChunkPos>,
    /// Where the vent injects lava.
    pub vent: BlockPos,
}

impl DemoWorld {
    /// Builds a 3x3 chunk area stepping down one block every four columns
    /// away from the center, with a pit on the eastern edge.
    pub fn build() -> Self {
        let world = MemoryWorld::new();
        let mut chunks = Vec::new();
        for cx in -1..=1 {
            for cz in -1..=1 {
                let chunk = ChunkPos::new(cx, cz);
                world.load_flat_chunk(chunk, GROUND_Y - 12, STONE);
                chunks.push(chunk);
            }
        }

        for x in -16i32..32 {
            for z in -16i32..32 {
                let distance = (x - 8).abs().max((z - 8).abs());
                let top = GROUND_Y - distance / 4;
                world.fill(BlockPos::new(x, GROUND_Y - 11, z), BlockPos::new(x, top, z), STONE);
            }
        }
        world.fill(
            BlockPos::new(28, GROUND_Y - 30, 6),
            BlockPos::new(30, GROUND_Y, 10),
            RawBlockState::AIR,
        );

        Self {
            world,
            chunks,
            vent: BlockPos::new(8, GROUND_Y + 1, 8),
        }
    }

    /// Follows an emitted particle straight down and returns where it lands,
    /// or `None` if it falls out of the loaded area.
    pub fn landing(&self, classifier: &VoxelClassifier, from: BlockPos) -> Option<BlockPos> {
        if !self.world.is_chunk_loaded(from.chunk_pos()) {
            return None;
        }
        let mut pos = from;
        loop {
            let below = pos.below();
            if !below.is_in_height() {
                return None;
            }
            if classifier.classify(self.world.read_voxel(below)) != VoxelState::Empty {
                return Some(pos);
            }
            pos = below;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::SimulationConfig;

    #[test]
    fn test_particle_lands_in_pit() {
        let demo = DemoWorld::build();
        let classifier = VoxelClassifier::new(&SimulationConfig::default());
        let landed = demo.landing(&classifier, BlockPos::new(29, GROUND_Y + 2, 8));
        assert_eq!(landed, Some(BlockPos::new(29, GROUND_Y - 30, 8)));
    }

    #[test]
    fn test_particle_outside_world_is_lost() {
        let demo = DemoWorld::build();
        let classifier = VoxelClassifier::new(&SimulationConfig::default());
        assert_eq!(demo.landing(&classifier, BlockPos::new(200, 60, 8)), None);
    }
}
