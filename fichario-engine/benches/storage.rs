//! Storage Backend Benchmarks
//!
//! Benchmarks for storage operations at various store sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fichario_core::dst::SimConfig;
use fichario_core::{EntitySchema, FieldMap, FieldSpec, FieldType, RecordId, Value};
use fichario_engine::storage::{FlatFileBackend, SimBackend, StorageBackend};

use std::time::Duration;

// =============================================================================
// Setup Helpers
// =============================================================================

fn cliente_schema() -> EntitySchema {
    EntitySchema::new("cliente")
        .with_field(FieldSpec::new("nome", FieldType::Text))
        .with_field(FieldSpec::new("idade", FieldType::Int).with_default(Value::Int(0)))
}

fn cliente_fields(i: usize) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("nome".to_string(), Value::Text(format!("Cliente {i}")));
    fields.insert("idade".to_string(), Value::Int(i as i64));
    fields
}

/// Create a sim store holding `count` records, returning the minted ids.
async fn populated_sim(count: usize) -> (SimBackend, Vec<RecordId>) {
    let backend = SimBackend::new(&SimConfig::with_seed(42));
    backend.create_store(&cliente_schema()).await.unwrap();

    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        ids.push(backend.insert("cliente", cliente_fields(i)).await.unwrap());
    }
    (backend, ids)
}

// =============================================================================
// SimBackend Benchmarks
// =============================================================================

fn bench_sim_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_storage/insert");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (backend, _ids) = rt.block_on(populated_sim(size));

            b.to_async(&rt).iter(|| async {
                black_box(
                    backend
                        .insert("cliente", cliente_fields(0))
                        .await
                        .unwrap(),
                );
            });
        });
    }
    group.finish();
}

fn bench_sim_read_one(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_storage/read_one");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (backend, ids) = rt.block_on(populated_sim(size));
            let id = ids[size / 2].clone();

            b.to_async(&rt).iter(|| async {
                black_box(backend.read_one("cliente", &id).await.unwrap());
            });
        });
    }
    group.finish();
}

fn bench_sim_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_storage/update");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (backend, ids) = rt.block_on(populated_sim(size));
            let id = ids[size / 2].clone();

            b.to_async(&rt).iter(|| async {
                let mut changes = FieldMap::new();
                changes.insert("idade".to_string(), Value::Int(99));
                black_box(backend.update("cliente", &id, changes).await.unwrap());
            });
        });
    }
    group.finish();
}

fn bench_sim_read_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_storage/read_all");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (backend, _ids) = rt.block_on(populated_sim(size));

            b.to_async(&rt).iter(|| async {
                black_box(backend.read_all("cliente").await.unwrap());
            });
        });
    }
    group.finish();
}

fn bench_sim_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_storage/count");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (backend, _ids) = rt.block_on(populated_sim(size));

            b.to_async(&rt).iter(|| async {
                black_box(backend.count("cliente").await.unwrap());
            });
        });
    }
    group.finish();
}

fn bench_sim_insert_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_storage/insert_delete");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (backend, _ids) = rt.block_on(populated_sim(size));

            // Insert then delete keeps the store size stable across iterations.
            b.to_async(&rt).iter(|| async {
                let id = backend
                    .insert("cliente", cliente_fields(0))
                    .await
                    .unwrap();
                backend.delete("cliente", &id).await.unwrap();
                black_box(());
            });
        });
    }
    group.finish();
}

// =============================================================================
// FlatFileBackend Benchmarks
// =============================================================================

fn bench_flatfile_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatfile_storage/insert");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let dir = tempfile::TempDir::new().unwrap();
            let backend = FlatFileBackend::new(dir.path()).unwrap();

            rt.block_on(async {
                backend.create_store(&cliente_schema()).await.unwrap();
                for i in 0..size {
                    backend.insert("cliente", cliente_fields(i)).await.unwrap();
                }
            });

            // Every write rewrites the whole store document.
            b.to_async(&rt).iter(|| async {
                black_box(
                    backend
                        .insert("cliente", cliente_fields(0))
                        .await
                        .unwrap(),
                );
            });
        });
    }
    group.finish();
}

fn bench_flatfile_read_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatfile_storage/read_all");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let dir = tempfile::TempDir::new().unwrap();
            let backend = FlatFileBackend::new(dir.path()).unwrap();

            rt.block_on(async {
                backend.create_store(&cliente_schema()).await.unwrap();
                for i in 0..size {
                    backend.insert("cliente", cliente_fields(i)).await.unwrap();
                }
            });

            b.to_async(&rt).iter(|| async {
                black_box(backend.read_all("cliente").await.unwrap());
            });
        });
    }
    group.finish();
}

// =============================================================================
// Criterion Configuration
// =============================================================================

criterion_group!(
    sim_benches,
    bench_sim_insert,
    bench_sim_read_one,
    bench_sim_update,
    bench_sim_read_all,
    bench_sim_count,
    bench_sim_insert_delete,
);

criterion_group!(flatfile_benches, bench_flatfile_insert, bench_flatfile_read_all);

criterion_main!(sim_benches, flatfile_benches);
