// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for the Tidemark storage manager

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use tidemark_store::{
    GetOptions, InMemoryBackend, RedbBackend, Schema, SetOptions, StorageBackend, StorageConfig,
    StorageManager,
};

fn init_tracing() {
    // RUST_LOG=tidemark_store=debug to watch retries and evictions while benchmarking.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn timesheet_entry(i: usize) -> Value {
    json!({
        "project": format!("project-{}", i % 16),
        "hours": (i % 9) as f64 + 0.5,
        "billable": i % 3 != 0,
        "date": "2026-10-16",
        "notes": "Reviewed pull requests and updated the release checklist.",
        "tags": ["review", "release", format!("sprint-{}", i % 4)],
    })
}

fn timesheet_schema() -> Schema {
    Schema::object()
        .property("project", Schema::string().required().min(1.0))
        .property("hours", Schema::number().min(0.0).max(24.0))
        .property("billable", Schema::boolean())
        .property("date", Schema::date().required())
        .property("notes", Schema::string().max(2000.0))
        .property("tags", Schema::array(Schema::string()))
}

fn open(rt: &Runtime, backend: Arc<dyn StorageBackend>, config: StorageConfig) -> StorageManager {
    rt.block_on(StorageManager::builder(config).persistent(backend).open())
        .unwrap()
}

// ============================================================================
// In-memory backend
// ============================================================================

fn bench_memory_set(c: &mut Criterion) {
    init_tracing();
    let rt = Runtime::new().unwrap();
    let storage = open(&rt, Arc::new(InMemoryBackend::new()), StorageConfig::default());
    let schema = timesheet_schema();

    let mut group = c.benchmark_group("memory_set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("plain", |b| {
        let entry = timesheet_entry(7);
        b.to_async(&rt).iter(|| async {
            storage.set("entry", black_box(&entry), SetOptions::new()).await.unwrap()
        });
    });

    group.bench_function("with_schema", |b| {
        let entry = timesheet_entry(7);
        let options = SetOptions::new().schema(schema.clone());
        b.to_async(&rt).iter(|| async {
            storage.set("entry", black_box(&entry), options.clone()).await.unwrap()
        });
    });

    group.bench_function("with_ttl", |b| {
        let entry = timesheet_entry(7);
        let options = SetOptions::new().ttl(Duration::from_secs(3600));
        b.to_async(&rt).iter(|| async {
            storage.set("entry", black_box(&entry), options.clone()).await.unwrap()
        });
    });

    group.finish();
}

fn bench_memory_get(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let storage = open(&rt, Arc::new(InMemoryBackend::new()), StorageConfig::default());
    rt.block_on(async {
        for i in 0..1000 {
            storage
                .set(&format!("entry-{i}"), &timesheet_entry(i), SetOptions::new())
                .await
                .unwrap();
        }
    });

    let mut group = c.benchmark_group("memory_get");

    group.bench_function("hit", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(storage.get("entry-500", GetOptions::new()).await.unwrap())
        });
    });

    group.bench_function("miss_with_default", |b| {
        let options = GetOptions::new().default_value(json!({}));
        b.to_async(&rt).iter(|| async {
            black_box(storage.get("missing", options.clone()).await.unwrap())
        });
    });

    group.bench_function("hit_with_schema", |b| {
        let options = GetOptions::new().schema(timesheet_schema());
        b.to_async(&rt).iter(|| async {
            black_box(storage.get("entry-500", options.clone()).await.unwrap())
        });
    });

    group.finish();
}

fn bench_enumeration(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("enumeration");

    for size in [100usize, 1000] {
        let storage = open(&rt, Arc::new(InMemoryBackend::new()), StorageConfig::default());
        rt.block_on(async {
            for i in 0..size {
                storage
                    .set(&format!("entry-{i}"), &timesheet_entry(i), SetOptions::new())
                    .await
                    .unwrap();
            }
        });

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("export", size), &size, |b, _| {
            b.to_async(&rt).iter(|| async { black_box(storage.export().await.unwrap()) });
        });
        group.bench_with_input(BenchmarkId::new("cleanup_expired", size), &size, |b, _| {
            b.to_async(&rt).iter(|| async { black_box(storage.cleanup_expired().await.unwrap()) });
        });
    }

    group.finish();
}

// ============================================================================
// redb backend
// ============================================================================

fn bench_redb(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let backend = RedbBackend::open(dir.path().join("bench.redb")).unwrap();
    let storage = open(&rt, Arc::new(backend), StorageConfig::default());

    let mut group = c.benchmark_group("redb");

    group.bench_function("set", |b| {
        let entry = timesheet_entry(3);
        b.to_async(&rt).iter(|| async {
            storage.set("entry", black_box(&entry), SetOptions::new()).await.unwrap()
        });
    });

    group.bench_function("get", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(storage.get("entry", GetOptions::new()).await.unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_memory_set,
    bench_memory_get,
    bench_enumeration,
    bench_redb,
);
criterion_main!(benches);
