//! Queue of chunk snapshots waiting for cell reconstruction.
//!
//! Scanning may happen on any thread; the tick thread polls the results.
//! Snapshot buffers are large, so consumed ones go back to a bounded free-list.

use basalt_utils::ChunkPos;
use crossbeam::queue::SegQueue;

use crate::snapshot::{ChunkSnapshot, LiveSource, OverlaySource};
use crate::world::WorldAccess;
use crate::world_buffer::WorldStateBuffer;

/// Scans chunks into snapshots and hands them to the tick thread.
pub struct ChunkSnapshotLoader {
    queue: SegQueue<Box<ChunkSnapshot>>,
    free: SegQueue<Box<ChunkSnapshot>>,
    max_free: usize,
}

impl ChunkSnapshotLoader {
    /// Creates a loader keeping at most `max_free` recycled buffers.
    #[must_use]
    pub fn new(max_free: usize) -> Self {
        Self {
            queue: SegQueue::new(),
            free: SegQueue::new(),
            max_free,
        }
    }

    /// Snapshots `chunk` and queues it.
    ///
    /// Returns false without queueing anything if the host does not have the
    /// chunk loaded; the caller is expected to ask again later.
    pub fn queue_chunk(
        &self,
        world_buffer: &WorldStateBuffer,
        world: &(impl WorldAccess + ?Sized),
        chunk: ChunkPos,
    ) -> bool {
        if !world.is_chunk_loaded(chunk) {
            return false;
        }

        let mut snapshot = self.get_empty_buffer();
        let live = LiveSource {
            world,
            classifier: world_buffer.classifier(),
        };
        match world_buffer.chunk_buffer_if_exists(chunk) {
            Some(pending) => snapshot.read_chunk(
                &OverlaySource {
                    buffer: &pending,
                    live,
                },
                chunk,
            ),
            None => snapshot.read_chunk(&live, chunk),
        }
        self.queue.push(snapshot);
        true
    }

    /// A recycled buffer if one is free, else a fresh allocation.
    #[must_use]
    pub fn get_empty_buffer(&self) -> Box<ChunkSnapshot> {
        self.free.pop().unwrap_or_default()
    }

    /// Gives a consumed buffer back. Dropped once the free-list is full.
    pub fn return_used_buffer(&self, snapshot: Box<ChunkSnapshot>) {
        if self.free.len() < self.max_free {
            self.free.push(snapshot);
        }
    }

    /// Takes one queued snapshot, in no particular order.
    #[must_use]
    pub fn poll(&self) -> Option<Box<ChunkSnapshot>> {
        self.queue.pop()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Number of buffers on the free-list.
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }
}
