//! # Quiver Graph Engine
//!
//! A property-graph database whose internal representation is sparse
//! linear algebra: the graph is a collection of labeled adjacency
//! matrices over a semiring-rich algebra, and a Cypher-like query
//! compiles into a pipeline of pull-based operators streaming
//! records.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Query String
//!     ↓
//! [Parser]              → AST
//!     ↓
//! [Validation]          → checked AST (errors stop here)
//!     ↓
//! [Query Graph]         → merged pattern entities
//!     ↓
//! [Traversal Planner]   → ordered descriptors, transpose flags
//!     ↓
//! [Plan Builder]        → operator tree (scans, traversals,
//!     ↓                    filters, projections, aggregation, ...)
//! [Pull Engine]         → record stream over the matrix kernel
//!     ↓
//! Result Set (header, rows, stats)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use quiver::{Config, Database};
//!
//! let db = Database::new(Config::default());
//! db.execute("CREATE (:Person {name: 'A'})-[:KNOWS]->(:Person {name: 'B'})").unwrap();
//! let result = db.execute("MATCH (x)-[:KNOWS]->(y) RETURN x.name, y.name").unwrap();
//! assert_eq!(db.serialize_rows(&result), vec![r#""A", "B""#.to_string()]);
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | Tagged scalars and fixed-width records |
//! | `matrix` | Sparse kernel façade: semiring multiplies, masks, pending tuples |
//! | `graph` | Node/edge arenas, label and relation matrices, schema, indices |
//! | `parser` | Cypher-subset lexer and recursive-descent parser |
//! | `ast` | Immutable query AST plus the validation pass |
//! | `arithmetic` | Expression interpreter, scalar and aggregate registries |
//! | `query_graph` | Pattern entity graph for planning |
//! | `planner` | Traversal ordering, direction normalization, transposes |
//! | `execution` | Operator tree, plan builder, cancellation |
//! | `grouping` | Group cache behind aggregation |
//! | `resultset` | Result envelope and textual serialization |
//! | `procedures` | CALL targets (db.labels and friends) |

pub mod arithmetic;
pub mod ast;
pub mod config;
pub mod error;
pub mod execution;
pub mod graph;
pub mod grouping;
pub mod matrix;
pub mod parser;
pub mod planner;
pub mod procedures;
pub mod query_graph;
pub mod resultset;
pub mod value;

pub use config::Config;
pub use error::{QueryError, QueryResult};
pub use execution::{CancelHandle, ExecutionPlan, QueryTimeout};
pub use graph::Graph;
pub use resultset::{QueryStats, ResultSet};
pub use value::{Record, Value};

use crate::ast::{validate, Clause};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The embedded database: one process-lifetime graph store behind a
/// multi-reader / single-writer lock, plus the query pipeline.
///
/// Read queries share the store; mutating queries take it exclusively
/// and buffer their matrix writes until commit, so concurrent readers
/// always observe the pre-mutation snapshot. No lock is held while a
/// result set is serialized.
pub struct Database {
    graph: Arc<RwLock<Graph>>,
    config: Config,
}

impl Database {
    pub fn new(config: Config) -> Self {
        // kernel parallelism is configured once, process-wide
        let threads = match config.kernel.num_threads {
            0 => num_cpus::get(),
            n => n,
        };
        // a second database in the same process keeps the first pool
        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global();
        matrix::set_parallel_threshold(config.kernel.parallel_threshold);
        Database {
            graph: Arc::new(RwLock::new(Graph::new())),
            config,
        }
    }

    /// Execute one query with the configured timeout
    pub fn execute(&self, query: &str) -> QueryResult<ResultSet> {
        let timeout = match self.config.query.timeout_ms {
            0 => QueryTimeout::unbounded(),
            ms => QueryTimeout::new(Some(Duration::from_millis(ms))),
        };
        self.execute_with_timeout(query, &timeout)
    }

    /// Execute one query under an externally held cancellation token
    pub fn execute_with_timeout(
        &self,
        query: &str,
        timeout: &QueryTimeout,
    ) -> QueryResult<ResultSet> {
        let started = Instant::now();
        let parsed = parser::parse(query)?;
        validate::validate(&parsed)?;
        debug!(clauses = parsed.clauses.len(), "query validated");

        let max_rows = self.config.query.max_result_rows;
        let mut result = if parsed
            .clauses
            .iter()
            .all(|c| matches!(c, Clause::CreateIndex { .. } | Clause::DropIndex { .. }))
        {
            self.apply_index_clauses(&parsed)?
        } else if parsed.is_write() {
            // writers hold the store exclusively from first mutation
            // to commit; buffered matrix updates flush at the end
            let mut graph = self.graph.write();
            let plan = ExecutionPlan::build(&parsed, &graph)?;
            plan.execute_write(&mut graph, timeout, max_rows)?
        } else {
            let graph = self.graph.read();
            let plan = ExecutionPlan::build(&parsed, &graph)?;
            plan.execute_read(&graph, timeout, max_rows)?
        };
        // lock dropped; wall clock includes parse + plan + execute
        result.set_execution_time(started.elapsed());
        info!(
            rows = result.len(),
            elapsed_ms = result.execution_time_ms(),
            "query finished"
        );
        Ok(result)
    }

    fn apply_index_clauses(&self, parsed: &ast::Query) -> QueryResult<ResultSet> {
        let mut graph = self.graph.write();
        let mut result = ResultSet::new(Vec::new(), 0);
        for clause in &parsed.clauses {
            match clause {
                Clause::CreateIndex { label, prop } => {
                    graph.create_index(label, prop)?;
                    result.stats_mut().indices_created += 1;
                }
                Clause::DropIndex { label, prop } => {
                    graph.drop_index(label, prop)?;
                    result.stats_mut().indices_dropped += 1;
                }
                _ => unreachable!("validated as index-only"),
            }
        }
        Ok(result)
    }

    /// Serialize result rows to their stable text form. Takes a fresh
    /// shared hold on the store; entity ids in the rows resolve
    /// against the post-query graph.
    pub fn serialize_rows(&self, result: &ResultSet) -> Vec<String> {
        let graph = self.graph.read();
        result.rows_as_strings(&graph)
    }

    /// Shared access to the underlying store
    pub fn graph(&self) -> Arc<RwLock<Graph>> {
        Arc::clone(&self.graph)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Default for Database {
    fn default() -> Self {
        Database::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_match_roundtrip() {
        let db = Database::default();
        let created = db
            .execute("CREATE (:Person {name: 'A'})-[:KNOWS]->(:Person {name: 'B'})")
            .unwrap();
        assert_eq!(created.stats().nodes_created, 2);
        assert_eq!(created.stats().relationships_created, 1);

        let result = db
            .execute("MATCH (x:Person)-[:KNOWS]->(y:Person) RETURN x.name, y.name")
            .unwrap();
        assert_eq!(db.serialize_rows(&result), vec![r#""A", "B""#.to_string()]);
    }

    #[test]
    fn test_validation_stops_before_execution() {
        let db = Database::default();
        db.execute("CREATE (:X {k: 1})").unwrap();
        let err = db.execute("MATCH (n) RETURN frobnicate(n)").unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
        // the graph is untouched
        let count = db.execute("MATCH (n) RETURN count(n)").unwrap();
        assert_eq!(db.serialize_rows(&count), vec!["1".to_string()]);
    }

    #[test]
    fn test_index_lifecycle() {
        let db = Database::default();
        let created = db.execute("CREATE INDEX ON :Person(name)").unwrap();
        assert_eq!(created.stats().indices_created, 1);
        assert!(matches!(
            db.execute("CREATE INDEX ON :Person(name)"),
            Err(QueryError::Constraint(_))
        ));
        let dropped = db.execute("DROP INDEX ON :Person(name)").unwrap();
        assert_eq!(dropped.stats().indices_dropped, 1);
    }

    #[test]
    fn test_cancelled_query_reports_cancelled() {
        let db = Database::default();
        db.execute("CREATE (:N {v: 1})").unwrap();
        let timeout = QueryTimeout::unbounded();
        timeout.cancel();
        let err = db
            .execute_with_timeout("MATCH (a)-[:K*1..5]->(b) RETURN b", &timeout)
            .unwrap_err();
        assert!(matches!(err, QueryError::Cancelled { .. }));
    }
}
