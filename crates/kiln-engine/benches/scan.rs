//! Kernel scan benchmarks.
//!
//! Kernels are compiled once during setup; the measured loop is the
//! load, scan and unload of a cached kernel over every page.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kiln_common::EngineConfig;
use kiln_engine::Database;
use tempfile::TempDir;

fn setup(rows: usize) -> Option<(TempDir, Database)> {
    let dir = TempDir::new().ok()?;
    let config = EngineConfig::builder()
        .data_dir(dir.path())
        .page_capacity(1_000)
        .max_result_rows(rows.max(1))
        .build();
    let db = Database::open(config).ok()?;
    if !db.compiler_available() {
        eprintln!("Skipping benchmark: C compiler not available");
        return None;
    }

    db.execute("CREATE TABLE events (id INT PRIMARY KEY, kind VARCHAR(16), score INT)")
        .ok()?;
    let values: Vec<String> = (0..rows)
        .map(|i| format!("({}, 'kind{}', {})", i, i % 8, i % 100))
        .collect();
    for chunk in values.chunks(500) {
        db.execute(&format!("INSERT INTO events VALUES {}", chunk.join(", ")))
            .ok()?;
    }
    Some((dir, db))
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    for rows in [1_000usize, 10_000] {
        let Some((_dir, db)) = setup(rows) else {
            return;
        };
        group.throughput(Throughput::Elements(rows as u64));

        for (name, sql) in [
            ("count", "SELECT COUNT(*) FROM events WHERE score > 50"),
            ("string_eq", "SELECT id FROM events WHERE kind = 'kind3'"),
            ("star", "SELECT * FROM events WHERE score < 10"),
        ] {
            // Warm the build cache outside the measurement.
            let _ = db.execute_one(sql);
            group.bench_with_input(BenchmarkId::new(name, rows), &sql, |b, sql| {
                b.iter(|| black_box(db.execute_one(sql)))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
