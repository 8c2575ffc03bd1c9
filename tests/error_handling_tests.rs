//! Error taxonomy coverage: every failure class surfaces as the
//! right QueryError variant, compile-time errors never touch the
//! graph, and runtime failures roll back buffered writes.

use quiver::{Config, Database, QueryError, QueryTimeout};

fn db() -> Database {
    Database::new(Config::default())
}

#[test]
fn test_parse_errors_carry_position() {
    let db = db();
    let err = db.execute("MATCH (n RETURN n").unwrap_err();
    let QueryError::Parse { position, .. } = err else {
        panic!("expected parse error, got {err:?}");
    };
    assert!(position > 0);
}

#[test]
fn test_validation_errors() {
    let db = db();
    let cases = [
        "MATCH (a) RETURN b",
        "MATCH (a) RETURN nosuchfn(a)",
        "MATCH (a) WHERE sum(a.v) > 1 RETURN a",
        "MATCH (a)-[:K*3..1]->(b) RETURN b",
        "MATCH (a) RETURN a LIMIT -1",
        "CALL db.unknown() RETURN 1",
        "MATCH (a)",
        "RETURN toUpper()",
    ];
    for query in cases {
        assert!(
            matches!(db.execute(query), Err(QueryError::Validation(_))),
            "expected validation error for {query}"
        );
    }
}

#[test]
fn test_runtime_type_errors() {
    let db = db();
    assert!(matches!(
        db.execute("RETURN 1 / 0"),
        Err(QueryError::Type(_))
    ));
    assert!(matches!(
        db.execute("RETURN abs('nope')"),
        Err(QueryError::Type(_))
    ));
}

#[test]
fn test_constraint_errors_on_indexes() {
    let db = db();
    db.execute("CREATE INDEX ON :L(p)").unwrap();
    assert!(matches!(
        db.execute("CREATE INDEX ON :L(p)"),
        Err(QueryError::Constraint(_))
    ));
    assert!(matches!(
        db.execute("DROP INDEX ON :Missing(p)"),
        Err(QueryError::Constraint(_))
    ));
}

#[test]
fn test_failed_query_is_not_partially_visible() {
    let db = db();
    db.execute("CREATE (:N {v: 1})").unwrap();
    db.execute("CREATE (:N {v: 0})").unwrap();
    // the division fails on the second record, after one node was
    // already created by this query
    let err = db
        .execute("MATCH (n:N) CREATE (:Copy {v: 1 / n.v})")
        .unwrap_err();
    assert!(matches!(err, QueryError::Type(_)));
    // no Copy label matrix entry survived the teardown flush discard
    let result = db.execute("MATCH (c:Copy) RETURN count(c)").unwrap();
    assert_eq!(db.serialize_rows(&result), vec!["0"]);
}

#[test]
fn test_cancellation_aborts_with_cancelled() {
    let db = db();
    db.execute("CREATE (:N {v: 1})").unwrap();
    let timeout = QueryTimeout::unbounded();
    timeout.cancel();
    let err = db
        .execute_with_timeout("MATCH (n:N)-[:K*]->(m) RETURN m", &timeout)
        .unwrap_err();
    assert!(matches!(err, QueryError::Cancelled { .. }));
}

#[test]
fn test_timeout_config_applies() {
    let mut config = Config::default();
    config.query.timeout_ms = 60_000;
    let db = Database::new(config);
    db.execute("CREATE (:N)").unwrap();
    // well under the deadline
    assert!(db.execute("MATCH (n:N) RETURN count(n)").is_ok());
}

#[test]
fn test_max_result_rows_cap() {
    let mut config = Config::default();
    config.query.max_result_rows = 2;
    let db = Database::new(config);
    let result = db.execute("UNWIND [1, 2, 3, 4] AS x RETURN x").unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.is_full());
}
