//! Performance benchmarks for document evaluation.
//!
//! Run with: `cargo bench --bench evaluation`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Identical documents | <1ms | Fingerprint short-circuit |
//! | 500 operations, breaking | <50ms p99 | Full rule set |
//! | Fingerprint | Linear in size | Canonical serialization |

use criterion::{
    black_box, criterion_group, criterion_main,
    BenchmarkId, Criterion, Throughput,
};
use serde_json::{json, Map, Value};

use oas_refresh::{canonical::canonical_hash, Document, RuleSetEvaluator};

/// Build a document with `resources` paths, each with GET/PUT/DELETE on an item path.
fn make_document(resources: usize, drop_every: usize) -> Document {
    let mut paths = Map::new();
    for i in 0..resources {
        let mut item = Map::new();
        item.insert(
            "get".to_string(),
            json!({
                "parameters": [
                    {"in": "query", "name": "expand", "schema": {"type": "string"}}
                ],
                "responses": {"200": {
                    "description": "ok",
                    "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Resource"}}}
                }}
            }),
        );
        item.insert(
            "put".to_string(),
            json!({
                "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Resource"}}}},
                "responses": {"200": {"description": "ok"}}
            }),
        );
        if drop_every == 0 || i % drop_every != 0 {
            item.insert("delete".to_string(), json!({"responses": {"204": {"description": "gone"}}}));
        }
        paths.insert(format!("/resources{i}/{{id}}"), Value::Object(item));
    }

    Document::from_value(json!({
        "openapi": "3.0.3",
        "info": {"title": "Bench", "version": "1"},
        "paths": paths,
        "components": {"schemas": {"Resource": {
            "type": "object",
            "required": ["id", "name"],
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "labels": {"type": "array", "items": {"type": "object", "properties": {
                    "key": {"type": "string"}, "value": {"type": "string"}
                }}}
            }
        }}}
    }))
    .expect("bench document is valid")
}

/// Benchmark evaluation of identical documents (fingerprint short-circuit).
fn bench_identical(c: &mut Criterion) {
    let evaluator = RuleSetEvaluator::new();
    let mut group = c.benchmark_group("identical");

    for resources in [10, 100, 500] {
        let old = make_document(resources, 0);
        let new = make_document(resources, 0);

        group.throughput(Throughput::Elements(resources as u64));
        group.bench_with_input(
            BenchmarkId::new("resources", resources),
            &(old, new),
            |b, (old, new)| {
                b.iter(|| {
                    let changes = evaluator.check(black_box(old), black_box(new), "bench").unwrap();
                    assert!(changes.is_empty());
                    changes
                })
            },
        );
    }

    group.finish();
}

/// Benchmark full rule evaluation when every tenth DELETE disappears.
fn bench_breaking(c: &mut Criterion) {
    let evaluator = RuleSetEvaluator::new();
    let mut group = c.benchmark_group("breaking");

    for resources in [10, 100, 500] {
        let old = make_document(resources, 0);
        let new = make_document(resources, 10);

        group.throughput(Throughput::Elements(resources as u64));
        group.bench_with_input(
            BenchmarkId::new("resources", resources),
            &(old, new),
            |b, (old, new)| {
                b.iter(|| {
                    let changes = evaluator.check(black_box(old), black_box(new), "bench").unwrap();
                    assert!(!changes.is_empty());
                    changes
                })
            },
        );
    }

    group.finish();
}

/// Benchmark the canonical fingerprint on its own.
fn bench_fingerprint(c: &mut Criterion) {
    let doc = make_document(500, 0);
    c.bench_function("fingerprint_500", |b| {
        b.iter(|| canonical_hash(black_box(doc.root())))
    });
}

criterion_group!(benches, bench_identical, bench_breaking, bench_fingerprint);
criterion_main!(benches);
