//! End-to-end acceptance scenarios: literal inputs, expected rows.

use quiver::{Config, Database};

fn db() -> Database {
    Database::new(Config::default())
}

fn rows(db: &Database, query: &str) -> Vec<String> {
    let result = db.execute(query).expect(query);
    db.serialize_rows(&result)
}

#[test]
fn test_label_scan_projection_in_insertion_order() {
    let db = db();
    for name in ["A", "B", "C"] {
        db.execute(&format!("CREATE (:Person {{name: '{name}'}})"))
            .unwrap();
    }
    assert_eq!(
        rows(&db, "MATCH (p:Person) RETURN p.name"),
        vec![r#""A""#, r#""B""#, r#""C""#]
    );
}

#[test]
fn test_single_hop_traversal() {
    let db = db();
    db.execute("CREATE (:Person {name: 'A'})-[:KNOWS]->(:Person {name: 'B'})")
        .unwrap();
    assert_eq!(
        rows(&db, "MATCH (x)-[:KNOWS]->(y) RETURN x.name, y.name"),
        vec![r#""A", "B""#]
    );
}

#[test]
fn test_variable_length_traversal() {
    let db = db();
    db.execute("CREATE (:Person {name: 'A'})-[:KNOWS]->(:Person {name: 'B'})-[:KNOWS]->(:Person {name: 'C'})-[:KNOWS]->(:Person {name: 'D'})")
        .unwrap();
    let mut out = rows(
        &db,
        "MATCH (a:Person {name: 'A'})-[:KNOWS*2..3]->(z) RETURN z.name",
    );
    out.sort();
    assert_eq!(out, vec![r#""C""#, r#""D""#]);
}

#[test]
fn test_aggregation_row() {
    let db = db();
    for v in 1..=5 {
        db.execute(&format!("CREATE (:N {{v: {v}}})")).unwrap();
    }
    assert_eq!(
        rows(&db, "MATCH (n:N) RETURN sum(n.v), count(n), avg(n.v)"),
        vec!["15, 5, 3.0"]
    );
}

#[test]
fn test_order_by_desc_with_limit() {
    let db = db();
    for v in 1..=5 {
        db.execute(&format!("CREATE (:N {{v: {v}}})")).unwrap();
    }
    assert_eq!(
        rows(&db, "MATCH (n:N) RETURN n.v ORDER BY n.v DESC LIMIT 2"),
        vec!["5", "4"]
    );
}

#[test]
fn test_create_returns_value_and_stats() {
    let db = db();
    let result = db
        .execute("CREATE (a:X {k: 1})-[:R]->(b:X {k: 2}) RETURN a.k + b.k")
        .unwrap();
    assert_eq!(db.serialize_rows(&result), vec!["3"]);
    let stats = result.stats();
    assert_eq!(stats.nodes_created, 2);
    assert_eq!(stats.relationships_created, 1);
    assert_eq!(stats.properties_set, 2);
    assert_eq!(stats.labels_added, 2);
    assert!(result.execution_time_ms() >= 0.0);
}
