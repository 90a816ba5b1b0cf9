//! Store throughput benchmarks.
//!
//! Covers the hot paths of a frame: creating and destroying entities with
//! components, iterating a two-component view, and mutating one component
//! while reading another. Snapshot save and load are measured at 10K
//! entities.
//!
//! Run with: `cargo bench --bench store_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use loam_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Position {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Velocity {
    dx: f64,
    dy: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Health(u32);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `count` entities with Position; every other one also has Velocity.
fn populated(count: usize) -> (Store, Vec<Entity>) {
    let mut store = Store::with_config(StoreConfig {
        entity_capacity: count,
        ..StoreConfig::default()
    });
    let entities = (0..count)
        .map(|i| {
            let e = store.create().unwrap();
            store.emplace(e, Position { x: i as f64, y: 0.0 }).unwrap();
            if i % 2 == 0 {
                store.emplace(e, Velocity { dx: 1.0, dy: 0.5 }).unwrap();
            }
            e
        })
        .collect();
    (store, entities)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_create_destroy(c: &mut Criterion) {
    c.bench_function("create_emplace_destroy_1k", |b| {
        let mut store = Store::new();
        let mut live = Vec::with_capacity(1_000);
        b.iter(|| {
            for i in 0..1_000u32 {
                let e = store.create().unwrap();
                store.emplace(e, Health(i)).unwrap();
                live.push(e);
            }
            for e in live.drain(..) {
                store.destroy(e).unwrap();
            }
            black_box(store.len());
        });
    });
}

fn bench_view_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("view_position_velocity");
    for count in [1_000usize, 10_000, 100_000] {
        let (store, _) = populated(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &_count| {
            b.iter(|| {
                let mut sum = 0.0;
                for (_, (pos, vel)) in store.view::<(Position, Velocity)>() {
                    sum += pos.x * vel.dx;
                }
                black_box(sum)
            });
        });
    }
    group.finish();
}

fn bench_each_mut(c: &mut Criterion) {
    let (mut store, _) = populated(10_000);
    c.bench_function("each_mut_integrate_10k", |b| {
        b.iter(|| {
            store.each_mut::<Position, (Velocity,), _>(|_, pos, (vel,)| {
                pos.x += vel.dx;
                pos.y += vel.dy;
            });
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let (store, _) = populated(10_000);
    c.bench_function("snapshot_write_10k", |b| {
        b.iter(|| {
            let mut out = JsonOutputArchive::new();
            SnapshotWriter::new(&store)
                .entities(&mut out)
                .unwrap()
                .component::<Position, _>(&mut out)
                .unwrap()
                .component::<Velocity, _>(&mut out)
                .unwrap();
            black_box(out.len())
        });
    });

    let mut out = JsonOutputArchive::new();
    SnapshotWriter::new(&store)
        .entities(&mut out)
        .unwrap()
        .component::<Position, _>(&mut out)
        .unwrap()
        .component::<Velocity, _>(&mut out)
        .unwrap();
    let saved = out.into_value();

    c.bench_function("snapshot_load_10k", |b| {
        b.iter(|| {
            let mut dest = Store::new();
            let mut input = JsonInputArchive::from_value(saved.clone()).unwrap();
            SnapshotLoader::new(&mut dest)
                .entities(&mut input)
                .unwrap()
                .component::<Position, _>(&mut input)
                .unwrap()
                .component::<Velocity, _>(&mut input)
                .unwrap();
            black_box(dest.len())
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_create_destroy,
    bench_view_scaling,
    bench_each_mut,
    bench_snapshot
);
criterion_main!(benches);
