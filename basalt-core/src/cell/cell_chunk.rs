use basalt_utils::{CHUNK_WIDTH, ChunkPos, WORLD_HEIGHT};
use smallvec::SmallVec;

use super::{FlowParams, HEIGHT_UNITS_PER_BLOCK, LavaCell};
use crate::snapshot::ChunkSnapshot;
use crate::voxel::VoxelState;

const COLUMNS: usize = (CHUNK_WIDTH * CHUNK_WIDTH) as usize;

/// Index of a chunk-local column.
#[inline]
#[must_use]
pub const fn column_index(local_x: usize, local_z: usize) -> usize {
    local_x * CHUNK_WIDTH as usize + local_z
}

/// The cells of one chunk.
///
/// Cells are stored in an arena; each column lists the handles of its cells
/// ordered bottom to top. Handles are only valid until the next rebuild.
#[derive(Debug, Clone)]
pub struct CellChunk {
    chunk: ChunkPos,
    cells: Vec<LavaCell>,
    columns: Box<[SmallVec<[u32; 2]>]>,
    idle_ticks: u32,
}

impl CellChunk {
    /// Builds the cells of `snapshot`, carrying fluid over from `previous`.
    ///
    /// Columns without previous cells take their fluid from the lava voxels
    /// in the snapshot.
    #[must_use]
    pub fn from_snapshot(
        snapshot: &ChunkSnapshot,
        previous: Option<&CellChunk>,
        params: &FlowParams,
    ) -> Self {
        let mut cells = Vec::new();
        let mut columns = vec![SmallVec::new(); COLUMNS].into_boxed_slice();

        for local_x in 0..CHUNK_WIDTH as usize {
            for local_z in 0..CHUNK_WIDTH as usize {
                let mut spans = scan_column(snapshot.column(local_x, local_z), params);
                let old: SmallVec<[&LavaCell; 2]> = previous
                    .map(|chunk| chunk.column_cells(local_x, local_z).collect())
                    .unwrap_or_default();

                if old.is_empty() {
                    for cell in &mut spans {
                        if cell.fluid_units() > 0 {
                            cell.mark_dirty();
                        }
                    }
                } else {
                    inherit_fluid(&old, &mut spans, params);
                }

                let column = &mut columns[column_index(local_x, local_z)];
                for cell in spans {
                    column.push(cells.len() as u32);
                    cells.push(cell);
                }
            }
        }

        Self {
            chunk: snapshot.chunk_pos(),
            cells,
            columns,
            idle_ticks: 0,
        }
    }

    /// The chunk these cells belong to.
    #[must_use]
    pub fn chunk_pos(&self) -> ChunkPos {
        self.chunk
    }

    /// Every cell of the chunk in arena order.
    #[must_use]
    pub fn cells(&self) -> &[LavaCell] {
        &self.cells
    }

    pub(super) fn cells_mut(&mut self) -> &mut [LavaCell] {
        &mut self.cells
    }

    /// The cell behind `handle`.
    #[must_use]
    pub fn cell(&self, handle: u32) -> &LavaCell {
        &self.cells[handle as usize]
    }

    pub(super) fn cell_mut(&mut self, handle: u32) -> &mut LavaCell {
        &mut self.cells[handle as usize]
    }

    /// Handles of one column, bottom first.
    #[must_use]
    pub fn column(&self, local_x: usize, local_z: usize) -> &[u32] {
        &self.columns[column_index(local_x, local_z)]
    }

    /// Cells of one column, bottom first.
    pub fn column_cells(&self, local_x: usize, local_z: usize) -> impl Iterator<Item = &LavaCell> {
        self.column(local_x, local_z)
            .iter()
            .map(|&handle| self.cell(handle))
    }

    /// The handle of the cell whose span reaches into block `y`.
    #[must_use]
    pub fn cell_at(&self, local_x: usize, y: i32, local_z: usize) -> Option<u32> {
        self.column(local_x, local_z)
            .iter()
            .copied()
            .find(|&handle| self.cell(handle).contains_y(y))
    }

    /// Sum of fluid over every cell.
    #[must_use]
    pub fn total_fluid(&self) -> i64 {
        self.cells.iter().map(LavaCell::fluid_units).sum()
    }

    /// Consecutive ticks every cell of the chunk was idle.
    #[must_use]
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    pub(super) fn update_idle(&mut self) {
        if self.cells.iter().all(|cell| cell.idle_ticks() > 0) {
            self.idle_ticks = self.idle_ticks.saturating_add(1);
        } else {
            self.idle_ticks = 0;
        }
    }
}

/// Splits one column into maximal non-barrier spans, bottom to top, each
/// holding the lava found inside it.
fn scan_column(column: &[VoxelState], params: &FlowParams) -> SmallVec<[LavaCell; 2]> {
    let mut spans = SmallVec::new();
    let mut start: Option<i32> = None;
    let mut lava = 0i64;

    let mut close = |start: &mut Option<i32>, lava: &mut i64, ceiling: i32| {
        if let Some(floor) = start.take()
            && floor < ceiling
        {
            let mut cell = LavaCell::new(floor, ceiling);
            cell.set_fluid(*lava, params);
            spans.push(cell);
        }
        *lava = 0;
    };

    for (y, state) in column.iter().enumerate() {
        let block_floor = y as i32 * HEIGHT_UNITS_PER_BLOCK;
        match *state {
            VoxelState::Barrier => close(&mut start, &mut lava, block_floor),
            VoxelState::SolidFlow(level) => {
                close(&mut start, &mut lava, block_floor);
                start = Some(block_floor + i32::from(level));
            }
            VoxelState::Lava(level) => {
                start.get_or_insert(block_floor);
                lava += i64::from(level) * params.units_per_level;
            }
            VoxelState::Empty => {
                start.get_or_insert(block_floor);
            }
        }
    }
    close(&mut start, &mut lava, WORLD_HEIGHT * HEIGHT_UNITS_PER_BLOCK);
    spans
}

fn overlap(a: &LavaCell, b: &LavaCell) -> i64 {
    i64::from((a.ceiling().min(b.ceiling()) - a.floor().max(b.floor())).max(0))
}

fn gap(a: &LavaCell, b: &LavaCell) -> i32 {
    (a.floor() - b.ceiling()).max(b.floor() - a.ceiling()).max(0)
}

/// Hands the fluid of the replaced cells of one column to the new ones.
fn inherit_fluid(old: &[&LavaCell], new: &mut [LavaCell], params: &FlowParams) {
    let had_fluid = old.iter().any(|cell| cell.fluid_units() > 0 || cell.is_dirty());
    if new.is_empty() {
        let lost: i64 = old.iter().map(|cell| cell.fluid_units()).sum();
        if lost > 0 {
            log::debug!("{lost} fluid units lost to a column that filled up");
        }
        return;
    }

    let mut shares: SmallVec<[i64; 2]> = SmallVec::from_elem(0, new.len());
    for previous in old {
        let fluid = previous.fluid_units();
        if fluid == 0 {
            continue;
        }

        let overlaps: SmallVec<[i64; 2]> = new.iter().map(|cell| overlap(cell, previous)).collect();
        let total: i64 = overlaps.iter().sum();
        if total == 0 {
            let nearest = (0..new.len())
                .min_by_key(|&i| gap(&new[i], previous))
                .unwrap_or_default();
            shares[nearest] += fluid;
            continue;
        }

        let mut given = 0;
        let mut largest = 0;
        for (i, &part) in overlaps.iter().enumerate() {
            let share = fluid * part / total;
            shares[i] += share;
            given += share;
            if part > overlaps[largest] {
                largest = i;
            }
        }
        shares[largest] += fluid - given;
    }

    let mut clamped = 0;
    for (cell, share) in new.iter_mut().zip(shares) {
        if let Some(source) = old.iter().copied().max_by_key(|previous| overlap(cell, previous))
            && overlap(cell, source) > 0
        {
            cell.inherit_history(source);
        }
        cell.set_fluid(share, params);
        clamped += share - cell.fluid_units();
        if had_fluid || share > 0 {
            cell.mark_dirty();
        }
    }
    if clamped > 0 {
        log::debug!("{clamped} fluid units clamped away by a shrinking span");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FlowParams {
        FlowParams::default()
    }

    fn build_column(states: &[(usize, VoxelState)], ground: usize) -> Vec<VoxelState> {
        let mut column = vec![VoxelState::Empty; WORLD_HEIGHT as usize];
        column[..=ground].fill(VoxelState::Barrier);
        for &(y, state) in states {
            column[y] = state;
        }
        column
    }

    #[test]
    fn test_scan_splits_on_barriers() {
        let params = params();
        let column = build_column(&[(20, VoxelState::Barrier), (21, VoxelState::Barrier)], 10);
        let spans = scan_column(&column, &params);
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].floor(), spans[0].ceiling()), (132, 240));
        assert_eq!((spans[1].floor(), spans[1].ceiling()), (264, 3072));
    }

    #[test]
    fn test_scan_partial_floor_and_lava() {
        let params = params();
        let column = build_column(
            &[
                (11, VoxelState::SolidFlow(4)),
                (12, VoxelState::FULL_LAVA),
                (13, VoxelState::Lava(3)),
            ],
            10,
        );
        let spans = scan_column(&column, &params);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].floor(), 136);
        assert_eq!(spans[0].fluid_units(), 15_000);

        // a full crust pushes the floor to the top of its block
        let column = build_column(&[(11, VoxelState::SolidFlow(12))], 10);
        assert_eq!(scan_column(&column, &params)[0].floor(), 144);
    }

    #[test]
    fn test_scan_skips_sealed_full_crust() {
        let params = params();
        let column = build_column(
            &[(11, VoxelState::SolidFlow(12)), (12, VoxelState::Barrier)],
            10,
        );
        let spans = scan_column(&column, &params);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].floor(), 13 * 12);
    }

    #[test]
    fn test_unchanged_span_keeps_fluid() {
        let params = params();
        let mut old = LavaCell::new(132, 3072);
        old.add_fluid(7_777, &params);
        let mut new = [LavaCell::new(132, 3072)];
        inherit_fluid(&[&old], &mut new, &params);
        assert_eq!(new[0].fluid_units(), 7_777);
    }

    #[test]
    fn test_split_span_shares_by_overlap() {
        let params = params();
        let mut old = LavaCell::new(0, 300);
        old.add_fluid(10_001, &params);
        let mut new = [LavaCell::new(0, 100), LavaCell::new(112, 300)];
        inherit_fluid(&[&old], &mut new, &params);

        let total: i64 = new.iter().map(LavaCell::fluid_units).sum();
        assert_eq!(total, 10_001);
        // 100 / 288 and 188 / 288, remainder to the larger part
        assert_eq!(new[0].fluid_units(), 3_472);
        assert_eq!(new[1].fluid_units(), 6_529);
    }

    #[test]
    fn test_orphaned_fluid_goes_to_nearest() {
        let params = params();
        let mut old = LavaCell::new(120, 132);
        old.add_fluid(4_000, &params);
        let mut new = [LavaCell::new(0, 60), LavaCell::new(144, 3072)];
        inherit_fluid(&[&old], &mut new, &params);
        assert_eq!(new[0].fluid_units(), 0);
        assert_eq!(new[1].fluid_units(), 4_000);
    }

    #[test]
    fn test_inherited_fluid_clamped() {
        let params = params();
        let mut old = LavaCell::new(132, 3072);
        old.add_fluid(100_000, &params);
        let mut new = [LavaCell::new(132, 144)];
        inherit_fluid(&[&old], &mut new, &params);
        assert_eq!(new[0].fluid_units(), new[0].max_fluid(&params));
    }
}
