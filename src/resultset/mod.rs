//! # Result Set
//!
//! The materialized result envelope: header, rows, and mutation
//! statistics. ProduceResults appends rows while the plan runs; the
//! plan's window operators have already applied DISTINCT, ORDER BY,
//! SKIP and LIMIT by the time rows land here, so the result set only
//! enforces its configured hard cap.
//!
//! Serialization happens after execution, outside any lock, through
//! [`serialize`].

pub mod serialize;

use crate::graph::Graph;
use crate::value::{Record, Value};
use std::time::Duration;

/// Counters reported with every query result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub nodes_created: usize,
    pub nodes_deleted: usize,
    pub relationships_created: usize,
    pub relationships_deleted: usize,
    pub properties_set: usize,
    pub labels_added: usize,
    pub indices_created: usize,
    pub indices_dropped: usize,
}

impl QueryStats {
    pub fn has_mutations(&self) -> bool {
        *self != QueryStats::default()
    }
}

/// The (header, rows, stats) envelope returned to the caller
#[derive(Debug, Default)]
pub struct ResultSet {
    header: Vec<String>,
    rows: Vec<Vec<Value>>,
    stats: QueryStats,
    /// Wall-clock time including planning
    execution_time: Duration,
    /// 0 = unlimited
    max_rows: usize,
}

impl ResultSet {
    pub fn new(header: Vec<String>, max_rows: usize) -> Self {
        ResultSet {
            header,
            max_rows,
            ..ResultSet::default()
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.max_rows != 0 && self.rows.len() >= self.max_rows
    }

    /// Append one record; returns false once the cap is reached
    pub fn add_record(&mut self, record: Record) -> bool {
        if self.is_full() {
            return false;
        }
        self.rows.push(record.into_values());
        !self.is_full()
    }

    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut QueryStats {
        &mut self.stats
    }

    pub fn set_execution_time(&mut self, elapsed: Duration) {
        self.execution_time = elapsed;
    }

    pub fn execution_time_ms(&self) -> f64 {
        self.execution_time.as_secs_f64() * 1e3
    }

    /// Serialize every row to its stable text form
    pub fn rows_as_strings(&self, graph: &Graph) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| serialize::row_to_string(row, graph))
            .collect()
    }

    /// Human-readable statistics block, one line per nonzero counter
    pub fn stats_as_strings(&self) -> Vec<String> {
        let mut out = Vec::new();
        let pairs = [
            ("Nodes created", self.stats.nodes_created),
            ("Nodes deleted", self.stats.nodes_deleted),
            ("Relationships created", self.stats.relationships_created),
            ("Relationships deleted", self.stats.relationships_deleted),
            ("Properties set", self.stats.properties_set),
            ("Labels added", self.stats.labels_added),
            ("Indices created", self.stats.indices_created),
            ("Indices dropped", self.stats.indices_dropped),
        ];
        for (name, count) in pairs {
            if count > 0 {
                out.push(format!("{name}: {count}"));
            }
        }
        out.push(format!(
            "Query internal execution time: {:.6} milliseconds",
            self.execution_time_ms()
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_record_and_cap() {
        let mut rs = ResultSet::new(vec!["n".to_string()], 2);
        assert!(rs.add_record(Record::from(vec![Value::Int(1)])));
        // second insert fills the set
        assert!(!rs.add_record(Record::from(vec![Value::Int(2)])));
        assert!(rs.is_full());
        assert!(!rs.add_record(Record::from(vec![Value::Int(3)])));
        assert_eq!(rs.len(), 2);
    }

    #[test]
    fn test_unlimited_by_default() {
        let mut rs = ResultSet::new(vec![], 0);
        for i in 0..100 {
            assert!(rs.add_record(Record::from(vec![Value::Int(i)])));
        }
        assert!(!rs.is_full());
    }

    #[test]
    fn test_stats_rendering() {
        let mut rs = ResultSet::new(vec![], 0);
        rs.stats_mut().nodes_created = 2;
        rs.stats_mut().properties_set = 3;
        let lines = rs.stats_as_strings();
        assert!(lines.contains(&"Nodes created: 2".to_string()));
        assert!(lines.contains(&"Properties set: 3".to_string()));
        assert!(lines.iter().any(|l| l.contains("execution time")));
    }
}
