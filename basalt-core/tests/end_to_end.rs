//! Full tick loop runs against the in-memory world.

use basalt_core::terrain::VisibilityTable;
use basalt_core::{
    BlockId, LavaSimulator, MemoryWorld, RawBlockState, SimulationConfig, TickReport, VoxelState,
    WorldAccess,
};
use basalt_utils::codec::write_int_array;
use basalt_utils::{BlockPos, ChunkPos};

const STONE: RawBlockState = RawBlockState::solid(9);
const HOME: ChunkPos = ChunkPos::new(0, 0);

fn flat_world() -> MemoryWorld {
    let world = MemoryWorld::new();
    world.load_flat_chunk(HOME, 10, STONE);
    world
}

/// Walls the square `min..=max` off from the plain on y 11..=20.
fn basin(world: &MemoryWorld, min: i32, max: i32) {
    let lo = min - 1;
    let hi = max + 1;
    world.fill(BlockPos::new(lo, 11, lo), BlockPos::new(hi, 20, lo), STONE);
    world.fill(BlockPos::new(lo, 11, hi), BlockPos::new(hi, 20, hi), STONE);
    world.fill(BlockPos::new(lo, 11, lo), BlockPos::new(lo, 20, hi), STONE);
    world.fill(BlockPos::new(hi, 11, lo), BlockPos::new(hi, 20, hi), STONE);
}

fn simulator(config: SimulationConfig) -> LavaSimulator {
    let sim = LavaSimulator::new(config).expect("valid config");
    sim.notify_chunk_changed(HOME);
    sim
}

fn run(sim: &mut LavaSimulator, world: &MemoryWorld, ticks: usize) -> Vec<TickReport> {
    (0..ticks)
        .map(|_| {
            let report = sim.tick(world);
            sim.flush(world).expect("flush");
            report
        })
        .collect()
}

#[test]
fn isolated_column_holds_one_block() {
    let world = flat_world();
    basin(&world, 6, 6);
    let mut sim = simulator(SimulationConfig::default());
    let pos = BlockPos::new(6, 11, 6);
    sim.add_lava(pos, 12_000);
    run(&mut sim, &world, 3);

    let cell = sim.cell_world().cell_at(pos).expect("column cell");
    assert_eq!(cell.floor_y(), 10);
    assert_eq!(cell.fluid_units(), 12_000);
    assert_eq!(sim.total_fluid(), 12_000);

    let raw = world.read_voxel(pos);
    assert_eq!(raw.block, BlockId(sim.config().palette.lava));
    assert_eq!(raw.flow_height, 12);
    assert_eq!(world.read_voxel(pos.above()), RawBlockState::AIR);
}

#[test]
fn enclosed_pocket_settles_full_height() {
    let world = flat_world();
    basin(&world, 8, 8);
    let sim = simulator(SimulationConfig::default());
    let table = VisibilityTable::new(sim.config().visibility_radius);

    let probe = sim.world_buffer().terrain(&world);
    let height = table.ideal_flow_height(&probe, BlockPos::new(8, 11, 8));
    assert!((height - 1.0).abs() < f32::EPSILON);
}

#[test]
fn malformed_particle_record_loads_nothing() {
    let sim = simulator(SimulationConfig::default());
    let bytes = write_int_array(&[1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(sim.load_particles(&bytes), 0);
    assert!(sim.blobs().is_empty());
}

#[test]
fn closed_pool_conserves_fluid() {
    let world = flat_world();
    basin(&world, 3, 7);
    let config = SimulationConfig {
        solidify_after_ticks: 10_000,
        ..SimulationConfig::default()
    };
    let mut sim = simulator(config);
    sim.add_lava(BlockPos::new(5, 11, 5), 25_000);
    sim.add_lava(BlockPos::new(3, 11, 7), 25_000);

    for report in run(&mut sim, &world, 80) {
        assert!(report.crusted.is_empty());
        assert_eq!(report.dripped, 0);
    }
    assert_eq!(sim.total_fluid(), 50_000);
    assert!(sim.blobs().is_empty());

    // two blocks spread over 25 columns
    for x in 3..=7 {
        for z in 3..=7 {
            let raw = world.read_voxel(BlockPos::new(x, 11, z));
            assert_eq!(raw.flow_height, 2, "column {x},{z}");
        }
    }
}

#[test]
fn rejected_flush_is_retried() {
    let world = flat_world();
    basin(&world, 6, 6);
    let mut sim = simulator(SimulationConfig::default());
    let pos = BlockPos::new(6, 11, 6);
    sim.add_lava(pos, 6_000);
    sim.tick(&world);
    let pending = sim.world_buffer().pending_len();
    assert!(pending > 0);

    world.set_reject_writes(true);
    let error = sim.flush(&world).expect_err("host rejects writes");
    assert_eq!(error.failed, pending);
    assert_eq!(error.written, 0);
    assert_eq!(sim.world_buffer().pending_len(), pending);

    world.set_reject_writes(false);
    assert_eq!(sim.flush(&world).expect("retry"), pending);
    assert_eq!(world.read_voxel(pos).flow_height, 6);
}

#[test]
fn edge_drip_becomes_particle() {
    let world = flat_world();
    // ledge column at (4, 5) walled on three sides, pit at (5, 5)
    world.fill(BlockPos::new(5, 3, 5), BlockPos::new(5, 10, 5), RawBlockState::AIR);
    world.fill(BlockPos::new(3, 11, 5), BlockPos::new(3, 20, 5), STONE);
    world.fill(BlockPos::new(4, 11, 4), BlockPos::new(4, 20, 4), STONE);
    world.fill(BlockPos::new(4, 11, 6), BlockPos::new(4, 20, 6), STONE);

    let config = SimulationConfig::default();
    let max_wait = u64::from(config.particle_max_wait_ticks);
    let mut sim = simulator(config);
    sim.add_lava(BlockPos::new(4, 11, 5), 40);

    let reports = run(&mut sim, &world, max_wait as usize + 5);
    assert_eq!(reports[0].dripped, 40);

    let emitted: Vec<(u64, BlockPos, i32)> = reports
        .iter()
        .flat_map(|report| {
            report
                .particles
                .iter()
                .map(|&(pos, units)| (report.tick, pos, units))
        })
        .collect();
    assert_eq!(emitted, vec![(1 + max_wait, BlockPos::new(5, 11, 5), 40)]);
    assert_eq!(sim.total_fluid(), 0);
}

#[test]
fn settled_film_crusts_into_world() {
    let world = flat_world();
    basin(&world, 6, 6);
    let config = SimulationConfig {
        solidify_after_ticks: 5,
        ..SimulationConfig::default()
    };
    let mut sim = simulator(config);
    let pos = BlockPos::new(6, 11, 6);
    sim.add_lava(pos, 3_000);

    let reports = run(&mut sim, &world, 10);
    let crusted: Vec<_> = reports
        .iter()
        .flat_map(|report| report.crusted.iter().copied())
        .collect();
    assert_eq!(crusted, vec![(pos, VoxelState::SolidFlow(3))]);
    assert_eq!(sim.total_fluid(), 0);

    let raw = world.read_voxel(pos);
    assert_eq!(raw.block, BlockId(sim.config().palette.basalt_flow));
    assert_eq!(raw.flow_height, 3);

    // a rebuild reads the crust back as a raised floor
    sim.notify_chunk_changed(HOME);
    run(&mut sim, &world, 1);
    let cell = sim.cell_world().cell_at(pos).expect("cell over crust");
    assert_eq!(cell.floor(), 11 * 12 + 3);
}

#[test]
fn crust_never_outweighs_the_lava_poured_in() {
    let world = flat_world();
    basin(&world, 1, 14);
    let config = SimulationConfig {
        solidify_after_ticks: 5,
        ..SimulationConfig::default()
    };
    let units_per_level = config.fluid_units_per_level;
    let mut sim = simulator(config);
    sim.add_lava(BlockPos::new(7, 11, 7), 12_000);

    let reports = run(&mut sim, &world, 600);
    let emitted: i64 = reports
        .iter()
        .flat_map(|report| report.particles.iter())
        .map(|&(_, units)| i64::from(units))
        .sum();

    let mut crust_levels = 0;
    for x in 1..=14 {
        for z in 1..=14 {
            let floor = sim
                .cell_world()
                .cell_at(BlockPos::new(x, 11, z))
                .map_or(12 * 12, |cell| cell.floor());
            crust_levels += i64::from(floor - 11 * 12);
        }
    }
    let crust_units = crust_levels * units_per_level;
    assert!(crust_units <= 12_000, "{crust_units} units of crust");
    assert_eq!(
        crust_units + sim.total_fluid() + sim.blobs().total_units() + emitted,
        12_000
    );
}

#[test]
fn unloaded_neighbor_is_requested_until_loaded() {
    let world = flat_world();
    let mut sim = simulator(SimulationConfig::default());
    sim.add_lava(BlockPos::new(15, 11, 8), 12_000);
    run(&mut sim, &world, 2);

    let east = ChunkPos::new(1, 0);
    assert!(!sim.cell_world().contains_chunk(east));

    world.load_flat_chunk(east, 10, STONE);
    run(&mut sim, &world, 2);
    assert!(sim.cell_world().contains_chunk(east));

    let spread = sim
        .cell_world()
        .cell_at(BlockPos::new(16, 11, 8))
        .expect("cell across the border")
        .fluid_units();
    assert!(spread > 0);
}
