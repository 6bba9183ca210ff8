use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ndarray::Array3;
use std::hint::black_box;

use tile_combine::assemble::{GridAssembler, TilePlan};
use tile_combine::decompose::{GhostFill, block_decomposition, pad_tile};

fn fixture(n: usize, parts: [usize; 3]) -> (TilePlan, Vec<Vec<f64>>) {
    let shape = [n, n, n];
    let global = Array3::from_shape_fn(shape, |(i, j, k)| (i + 2 * j + 3 * k) as f64);
    let tiles = block_decomposition(shape, parts, 2).unwrap();
    let buffers = tiles
        .iter()
        .map(|(rank, d)| pad_tile(rank, global.view(), d, GhostFill::Constant(0.0)).unwrap())
        .collect();
    (TilePlan::new(shape, tiles).unwrap(), buffers)
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_field");
    for &n in &[32usize, 96] {
        let (plan, buffers) = fixture(n, [4, 2, 2]);
        for parallel in [false, true] {
            let label = if parallel { "planes" } else { "tiles" };
            group.bench_with_input(BenchmarkId::new(label, n), &n, |b, _| {
                b.iter(|| {
                    GridAssembler::new(&plan)
                        .with_parallel_copy(parallel)
                        .assemble_field(black_box(&buffers))
                        .unwrap()
                })
            });
        }
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let shape = [256, 256, 64];
    c.bench_function("plan_512_tiles", |b| {
        b.iter(|| {
            let tiles = block_decomposition(shape, [16, 8, 4], 3).unwrap();
            TilePlan::new(black_box(shape), tiles).unwrap()
        })
    });
}

criterion_group!(benches, bench_assemble, bench_plan);
criterion_main!(benches);
