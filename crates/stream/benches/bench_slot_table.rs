use std::hint::black_box;
use std::time::Instant;

use glam::{DVec3, I64Vec3};
use voxworld_common::{CellCoord, slot_index};
use voxworld_kernel::TerrainGenerator;
use voxworld_persist::{CellGateway, MemoryStore};
use voxworld_stream::{StreamConfig, VoxelWorld};

fn make_world(edge: usize) -> VoxelWorld {
    VoxelWorld::new(
        StreamConfig::with_edge(edge),
        CellGateway::new(MemoryStore::new()),
        TerrainGenerator::default(),
        DVec3::new(0.5, 20.0, 0.5),
    )
}

fn bench_generation(edge: usize, iterations: usize) {
    let start = Instant::now();
    for _ in 0..iterations {
        let world = make_world(edge);
        black_box(world.generation_pass(0..edge));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  full pass (N={edge}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_lookup(edge: usize, iterations: usize) {
    let world = make_world(edge);
    world.generation_pass(0..edge);

    let start = Instant::now();
    for i in 0..iterations {
        let pos = I64Vec3::new((i % 97) as i64 - 48, (i % 31) as i64, (i % 53) as i64 - 26);
        let _ = black_box(world.get_element(black_box(pos)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  get_element (N={edge}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_rebuild(edge: usize, iterations: usize) {
    let world = make_world(edge);
    world.generation_pass(0..edge);
    let index = slot_index(CellCoord::new(0, 0, 0), edge);

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(world.rebuild(black_box(index)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  single rebuild (N={edge}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_exhaustive(edge: usize, iterations: usize) {
    let start = Instant::now();
    for _ in 0..iterations {
        let world = make_world(edge);
        world.generation_pass(0..edge);
        black_box(world.remesh_exhaustive());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  generate + exhaustive remesh (N={edge}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn main() {
    println!("=== Slot Table Benchmarks ===\n");

    println!("Generation:");
    bench_generation(4, 20);
    bench_generation(8, 5);

    println!("\nLookup:");
    bench_lookup(4, 100_000);
    bench_lookup(8, 100_000);

    println!("\nRe-derivation:");
    bench_rebuild(4, 1000);
    bench_exhaustive(4, 10);
    bench_exhaustive(8, 2);

    println!("\n=== Done ===");
}
