//! Query benchmarks: scan, traversal, variable-length expansion, and
//! aggregation over a synthetic social graph.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quiver::{Config, Database};

fn seeded_db(people: usize) -> Database {
    let db = Database::new(Config::default());
    for i in 0..people {
        db.execute(&format!("CREATE (:Person {{name: 'p{i}', age: {}}})", i % 80))
            .expect("seed node");
    }
    // ring plus a skip link every fourth node
    for i in 0..people {
        let j = (i + 1) % people;
        db.execute(&format!(
            "MATCH (a:Person {{name: 'p{i}'}}), (b:Person {{name: 'p{j}'}}) CREATE (a)-[:KNOWS]->(b)"
        ))
        .expect("seed edge");
        if i % 4 == 0 {
            let k = (i + 5) % people;
            db.execute(&format!(
                "MATCH (a:Person {{name: 'p{i}'}}), (b:Person {{name: 'p{k}'}}) CREATE (a)-[:KNOWS]->(b)"
            ))
            .expect("seed skip edge");
        }
    }
    db
}

fn bench_label_scan(c: &mut Criterion) {
    let db = seeded_db(500);
    c.bench_function("label_scan_500", |b| {
        b.iter(|| {
            let result = db.execute("MATCH (p:Person) RETURN p.name").unwrap();
            black_box(result.len())
        });
    });
}

fn bench_traversal(c: &mut Criterion) {
    let db = seeded_db(500);
    c.bench_function("single_hop_500", |b| {
        b.iter(|| {
            let result = db
                .execute("MATCH (a:Person)-[:KNOWS]->(b) RETURN b.name")
                .unwrap();
            black_box(result.len())
        });
    });
}

fn bench_varlen(c: &mut Criterion) {
    let db = seeded_db(200);
    c.bench_function("varlen_2_4", |b| {
        b.iter(|| {
            let result = db
                .execute("MATCH (a:Person {name: 'p0'})-[:KNOWS*2..4]->(z) RETURN z.name")
                .unwrap();
            black_box(result.len())
        });
    });
}

fn bench_aggregation(c: &mut Criterion) {
    let db = seeded_db(500);
    c.bench_function("group_by_age_500", |b| {
        b.iter(|| {
            let result = db
                .execute("MATCH (p:Person) RETURN p.age, count(p)")
                .unwrap();
            black_box(result.len())
        });
    });
}

fn bench_filtered_sort(c: &mut Criterion) {
    let db = seeded_db(500);
    c.bench_function("filter_sort_limit_500", |b| {
        b.iter(|| {
            let result = db
                .execute("MATCH (p:Person) WHERE p.age > 40 RETURN p.name ORDER BY p.age DESC LIMIT 10")
                .unwrap();
            black_box(result.len())
        });
    });
}

criterion_group!(
    benches,
    bench_label_scan,
    bench_traversal,
    bench_varlen,
    bench_aggregation,
    bench_filtered_sort
);
criterion_main!(benches);
