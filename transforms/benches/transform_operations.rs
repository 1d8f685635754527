//! Transform and compensation throughput
//!
//! Covers the two per-event costs of gating: spillover compensation of the
//! detector columns and the solved (logicle) scale.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use flow_transforms::{CompensationMatrix, MatrixOps, Transform, Transformable};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

/// Diagonally dominant spillover matrix, so it is always invertible
fn generate_spillover(n: usize) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(42);
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            1.0
        } else {
            rng.random_range(0.0..0.1)
        }
    })
}

fn generate_events(n_events: usize, n_channels: usize) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(123);
    Array2::from_shape_fn((n_events, n_channels), |_| rng.random_range(-100.0..100_000.0))
}

fn bench_matrix_inversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix_inversion");

    for n in [5, 10, 20, 30] {
        let matrix = generate_spillover(n);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_with_input(BenchmarkId::new("lapack", n), &matrix, |b, m| {
            b.iter(|| black_box(MatrixOps::invert_matrix("bench", m)))
        });
    }

    group.finish();
}

fn bench_compensation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compensation");

    for (n_channels, n_events) in [(5, 10_000), (10, 100_000), (20, 250_000)] {
        let detectors: Vec<String> = (0..n_channels).map(|i| format!("FL{i}-A")).collect();
        let Ok(matrix) =
            CompensationMatrix::new("bench", detectors, None, generate_spillover(n_channels))
        else {
            continue;
        };
        let events = generate_events(n_events, n_channels);
        let indices: Vec<usize> = (0..n_channels).collect();

        group.throughput(Throughput::Elements((n_channels * n_events) as u64));
        group.bench_with_input(
            BenchmarkId::new("apply", format!("{n_channels}ch_{n_events}ev")),
            &events,
            |b, e| b.iter(|| black_box(matrix.apply_at(e.view(), &indices))),
        );
        group.bench_with_input(
            BenchmarkId::new("single_column", format!("{n_channels}ch_{n_events}ev")),
            &events,
            |b, e| b.iter(|| black_box(matrix.compensate_column(e.view(), &indices, 0))),
        );
    }

    group.finish();
}

fn bench_logicle(c: &mut Criterion) {
    let mut group = c.benchmark_group("logicle");
    let Ok(logicle) = Transform::logicle(262144.0, 0.5, 4.5, 0.0) else {
        return;
    };

    for n_events in [10_000, 100_000, 1_000_000] {
        let mut rng = StdRng::seed_from_u64(7);
        let column = Array1::from_shape_fn(n_events, |_| rng.random_range(-1000.0..262144.0));

        group.throughput(Throughput::Elements(n_events as u64));
        group.bench_with_input(BenchmarkId::new("scale", n_events), &column, |b, col| {
            b.iter(|| black_box(logicle.apply(col.view())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_matrix_inversion, bench_compensation, bench_logicle);
criterion_main!(benches);
