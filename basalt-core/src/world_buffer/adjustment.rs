//! Tracks positions that need a neighbor-consistency re-check after a change.

use std::iter;

use basalt_utils::{BlockPos, ChunkPos};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

/// Per-chunk sets of flagged positions.
///
/// A position is flagged while some change touching its neighborhood has not
/// been excluded yet. Flags are grouped by the chunk holding the position, so
/// a neighbor across a chunk border is flagged in that neighbor's chunk.
#[derive(Default)]
pub struct AdjustmentTracker {
    flagged: Mutex<FxHashMap<ChunkPos, FxHashSet<BlockPos>>>,
}

impl AdjustmentTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags `pos` and its six face neighbors. Neighbors outside the world
    /// height are skipped.
    pub fn set_adjustment_needed_around(&self, pos: BlockPos) {
        let mut flagged = self.flagged.lock();
        for target in iter::once(pos).chain(pos.neighbors()) {
            if target.is_in_height() {
                flagged.entry(target.chunk_pos()).or_default().insert(target);
            }
        }
    }

    /// Clears exactly `pos`. Clearing a clean position does nothing.
    pub fn exclude_adjustment_needed_at(&self, pos: BlockPos) {
        let mut flagged = self.flagged.lock();
        let chunk = pos.chunk_pos();
        if let Some(positions) = flagged.get_mut(&chunk) {
            positions.remove(&pos);
            if positions.is_empty() {
                flagged.remove(&chunk);
            }
        }
    }

    /// Returns true if `pos` is flagged.
    #[must_use]
    pub fn is_flagged(&self, pos: BlockPos) -> bool {
        self.flagged
            .lock()
            .get(&pos.chunk_pos())
            .is_some_and(|positions| positions.contains(&pos))
    }

    /// A snapshot of the flagged positions in `chunk`.
    ///
    /// The result is detached from the tracker, so it can be walked while
    /// positions are excluded or re-flagged.
    #[must_use]
    pub fn adjustment_positions(&self, chunk: ChunkPos) -> Vec<BlockPos> {
        self.flagged
            .lock()
            .get(&chunk)
            .map(|positions| positions.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Chunks with at least one flagged position.
    #[must_use]
    pub fn chunks_needing_adjustment(&self) -> Vec<ChunkPos> {
        self.flagged.lock().keys().copied().collect()
    }

    /// Drops every flag in `chunk`.
    pub fn clear_chunk(&self, chunk: ChunkPos) {
        self.flagged.lock().remove(&chunk);
    }

    /// Total number of flagged positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flagged.lock().values().map(FxHashSet::len).sum()
    }

    /// Returns true if nothing is flagged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flagged.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_neighborhood() {
        let tracker = AdjustmentTracker::new();
        let pos = BlockPos::new(5, 64, 5);
        tracker.set_adjustment_needed_around(pos);

        assert!(tracker.is_flagged(pos));
        for neighbor in pos.neighbors() {
            assert!(tracker.is_flagged(neighbor));
        }
        assert_eq!(tracker.len(), 7);
        assert!(!tracker.is_flagged(pos.offset(1, 1, 0)));
    }

    #[test]
    fn test_exclude_clears_exact_position() {
        let tracker = AdjustmentTracker::new();
        let pos = BlockPos::new(5, 64, 5);
        tracker.set_adjustment_needed_around(pos);
        tracker.exclude_adjustment_needed_at(pos);

        assert!(!tracker.is_flagged(pos));
        for neighbor in pos.neighbors() {
            assert!(tracker.is_flagged(neighbor));
        }
        assert_eq!(tracker.len(), 6);
    }

    #[test]
    fn test_exclude_clean_is_noop() {
        let tracker = AdjustmentTracker::new();
        tracker.exclude_adjustment_needed_at(BlockPos::new(0, 0, 0));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_chunk_border_neighbors() {
        let tracker = AdjustmentTracker::new();
        let pos = BlockPos::new(15, 0, 0);
        tracker.set_adjustment_needed_around(pos);

        let east = ChunkPos::new(1, 0);
        let north = ChunkPos::new(0, -1);
        assert_eq!(tracker.adjustment_positions(east), vec![BlockPos::new(16, 0, 0)]);
        assert_eq!(tracker.adjustment_positions(north), vec![BlockPos::new(15, 0, -1)]);
        // y = -1 is out of height and never flagged
        assert_eq!(tracker.len(), 6);

        let home = tracker.adjustment_positions(ChunkPos::new(0, 0));
        assert_eq!(home.len(), 4);
        assert_eq!(tracker.adjustment_positions(ChunkPos::new(0, 0)).len(), 4);

        let mut chunks = tracker.chunks_needing_adjustment();
        chunks.sort_by_key(|c| (c.0.x, c.0.y));
        assert_eq!(chunks, vec![north, ChunkPos::new(0, 0), east]);
    }
}
