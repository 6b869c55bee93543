//! Ideal settled flow height from the surrounding terrain.
//!
//! Solidifying flow settles higher next to walls and lower next to open drops.
//! The resolver walks a precomputed disk of horizontal offsets outward, pruning
//! offsets hidden behind something already found to be a wall.

use basalt_utils::BlockPos;

/// Answers whether a position is open terrain.
pub trait TerrainProbe {
    /// Returns true if terrain at `pos` is open space (including flow blocks).
    fn is_open_terrain(&self, pos: BlockPos) -> bool;
}

impl<F: Fn(BlockPos) -> bool> TerrainProbe for F {
    fn is_open_terrain(&self, pos: BlockPos) -> bool {
        self(pos)
    }
}

/// One precomputed offset of the search disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityNode {
    /// Offset along x.
    pub dx: i32,
    /// Offset along z.
    pub dz: i32,
    /// Distance from the origin.
    pub distance: f32,
}

/// Distance-sorted search disk with line-of-sight masks.
///
/// Node `i` has a bitmask over node indices lying on the segment from the
/// origin to it. Only nearer nodes appear in a mask, so a mask is complete by
/// the time the walk reaches its node.
#[derive(Debug, Clone)]
pub struct VisibilityTable {
    radius: u8,
    nodes: Vec<VisibilityNode>,
    words: usize,
    masks: Vec<u64>,
}

impl VisibilityTable {
    /// Builds the table for `radius`.
    #[must_use]
    pub fn new(radius: u8) -> Self {
        let r = i32::from(radius);
        let mut nodes = Vec::new();
        for dx in -r..=r {
            for dz in -r..=r {
                if dx == 0 && dz == 0 {
                    continue;
                }
                let distance = ((dx * dx + dz * dz) as f32).sqrt();
                if distance <= f32::from(radius) {
                    nodes.push(VisibilityNode { dx, dz, distance });
                }
            }
        }
        nodes.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.dx.cmp(&b.dx))
                .then(a.dz.cmp(&b.dz))
        });

        let width = (2 * r + 1) as usize;
        let mut index_of = vec![usize::MAX; width * width];
        for (i, node) in nodes.iter().enumerate() {
            index_of[(node.dx + r) as usize * width + (node.dz + r) as usize] = i;
        }

        let words = nodes.len().div_ceil(64);
        let mut masks = vec![0u64; nodes.len() * words];
        for (i, node) in nodes.iter().enumerate() {
            let steps = (node.distance * 4.0).ceil() as i32;
            for step in 1..steps {
                let t = step as f32 / steps as f32;
                let x = (node.dx as f32 * t).round() as i32;
                let z = (node.dz as f32 * t).round() as i32;
                if (x == 0 && z == 0) || (x == node.dx && z == node.dz) {
                    continue;
                }
                let j = index_of[(x + r) as usize * width + (z + r) as usize];
                if j < i {
                    masks[i * words + j / 64] |= 1 << (j % 64);
                }
            }
        }

        Self {
            radius,
            nodes,
            words,
            masks,
        }
    }

    /// The search radius.
    #[must_use]
    pub fn radius(&self) -> u8 {
        self.radius
    }

    /// The nodes in walk order.
    #[must_use]
    pub fn nodes(&self) -> &[VisibilityNode] {
        &self.nodes
    }

    fn mask(&self, index: usize) -> &[u64] {
        &self.masks[index * self.words..(index + 1) * self.words]
    }

    /// The fraction of one block that settled flow should occupy at `origin`,
    /// in `[0, 1]`.
    pub fn ideal_flow_height(&self, probe: &impl TerrainProbe, origin: BlockPos) -> f32 {
        let mut blocked = vec![0u64; self.words];
        let mut rise: Option<f32> = None;
        let mut fall: Option<f32> = None;
        let mut last_visible = 0.0f32;

        for (i, node) in self.nodes.iter().enumerate() {
            if node.distance > last_visible + 1.0 {
                // a whole unit passed without a visible node: enclosed
                return 1.0;
            }

            let visible = self
                .mask(i)
                .iter()
                .zip(&blocked)
                .all(|(mask, blocked)| mask & blocked == 0);
            if !visible {
                continue;
            }
            last_visible = node.distance;

            let pos = origin.offset(node.dx, 0, node.dz);
            if probe.is_open_terrain(pos) {
                if fall.is_none() && probe.is_open_terrain(pos.below()) {
                    fall = Some(node.distance);
                }
            } else {
                blocked[i / 64] |= 1 << (i % 64);
                if rise.is_none() {
                    rise = Some(node.distance);
                }
            }

            if rise.is_some() && fall.is_some() {
                break;
            }
        }

        let missing = f32::from(self.radius) + 1.0;
        match (rise, fall) {
            // walls without a drop in sight hold the whole block
            (_, None) => 1.0,
            (None, Some(fall)) => blend(missing, fall),
            (Some(rise), Some(fall)) => blend(rise, fall),
        }
    }
}

/// Settles higher as the wall gets nearer and lower as the drop does.
fn blend(rise: f32, fall: f32) -> f32 {
    (1.5 - rise / (rise + fall - 1.0)).clamp(0.0, 1.0)
}
