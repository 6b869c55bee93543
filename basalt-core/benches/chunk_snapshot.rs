#![allow(missing_docs)]
//! Benchmarks for chunk scanning and redistribution.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use basalt_core::SimulationConfig;
use basalt_core::cell::{CellWorld, FlowParams};
use basalt_core::particle::LavaBlobManager;
use basalt_core::snapshot::{ChunkSnapshot, LiveSource};
use basalt_core::voxel::{RawBlockState, VoxelClassifier};
use basalt_core::world::MemoryWorld;
use basalt_utils::{BlockPos, ChunkPos};

const STONE: RawBlockState = RawBlockState::solid(9);

fn bench_snapshot_scan(c: &mut Criterion) {
    let config = SimulationConfig::default();
    let classifier = VoxelClassifier::new(&config);

    let mut group = c.benchmark_group("snapshot_scan");
    for floor_y in [10, 64, 200] {
        let world = MemoryWorld::new();
        let chunk = ChunkPos::new(0, 0);
        world.load_flat_chunk(chunk, floor_y, STONE);
        let live = LiveSource {
            world: &world,
            classifier: &classifier,
        };
        let mut snapshot = ChunkSnapshot::new();

        group.bench_with_input(BenchmarkId::new("floor", floor_y), &chunk, |b, &chunk| {
            b.iter(|| {
                snapshot.read_chunk(&live, black_box(chunk));
                black_box(snapshot.get(8, 128, 8));
            });
        });
    }
    group.finish();
}

fn bench_redistribute(c: &mut Criterion) {
    let config = SimulationConfig::default();
    let classifier = VoxelClassifier::new(&config);
    let world = MemoryWorld::new();
    let chunks = [ChunkPos::new(0, 0), ChunkPos::new(1, 0), ChunkPos::new(0, 1), ChunkPos::new(1, 1)];
    for chunk in chunks {
        world.load_flat_chunk(chunk, 10, STONE);
    }

    let mut cells = CellWorld::new(FlowParams::from_config(&config));
    let mut snapshot = ChunkSnapshot::new();
    for chunk in chunks {
        snapshot.read_chunk(
            &LiveSource {
                world: &world,
                classifier: &classifier,
            },
            chunk,
        );
        cells.rebuild_chunk(&snapshot);
    }
    for x in (4..28).step_by(3) {
        for z in (4..28).step_by(3) {
            cells.add_fluid(BlockPos::new(x, 11, z), 24_000);
        }
    }
    let blobs = LavaBlobManager::new(&config);

    c.bench_function("redistribute_four_chunks", |b| {
        let mut tick = 0;
        b.iter(|| {
            tick += 1;
            black_box(cells.redistribute(&blobs, tick));
        });
    });
}

criterion_group!(benches, bench_snapshot_scan, bench_redistribute);
criterion_main!(benches);
