//! Materializing and windowing operators: Sort, Skip, Limit,
//! Distinct.
//!
//! Sort and Distinct are materializing and refuse a reset once they
//! have started streaming; Skip and Limit are windowed pass-throughs
//! that preserve child order.

use crate::error::{QueryError, QueryResult};
use crate::execution::ops::{BoxedOperator, OpContext, Operator};
use crate::value::{Record, Value};
use std::collections::HashMap;

/// Stable sort over slot keys; ties keep child order
#[derive(Debug)]
pub struct Sort {
    child: BoxedOperator,
    /// (slot, descending) per key, major first
    keys: Vec<(usize, bool)>,
    buffer: Vec<Record>,
    cursor: usize,
    materialized: bool,
}

impl Sort {
    pub fn new(child: BoxedOperator, keys: Vec<(usize, bool)>) -> Self {
        Sort {
            child,
            keys,
            buffer: Vec::new(),
            cursor: 0,
            materialized: false,
        }
    }
}

impl Operator for Sort {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        if !self.materialized {
            while let Some(record) = self.child.consume(ctx)? {
                ctx.timeout.check()?;
                self.buffer.push(record);
            }
            let keys = self.keys.clone();
            self.buffer.sort_by(|a, b| {
                for (slot, descending) in &keys {
                    let ord = a.get(*slot).total_cmp(b.get(*slot));
                    let ord = if *descending { ord.reverse() } else { ord };
                    if !ord.is_eq() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
            self.materialized = true;
        }
        if self.cursor >= self.buffer.len() {
            return Ok(None);
        }
        let record = std::mem::replace(&mut self.buffer[self.cursor], Record::new(0));
        self.cursor += 1;
        Ok(Some(record))
    }

    fn reset(&mut self) -> QueryResult<()> {
        if self.materialized {
            return Err(QueryError::Internal(
                "Sort cannot be reset mid-stream".to_string(),
            ));
        }
        self.child.reset()
    }
}

/// Drop the first n records
#[derive(Debug)]
pub struct Skip {
    child: BoxedOperator,
    skip: usize,
    skipped: usize,
}

impl Skip {
    pub fn new(child: BoxedOperator, skip: usize) -> Self {
        Skip {
            child,
            skip,
            skipped: 0,
        }
    }
}

impl Operator for Skip {
    fn name(&self) -> &'static str {
        "Skip"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        while self.skipped < self.skip {
            if self.child.consume(ctx)?.is_none() {
                self.skipped = self.skip;
                return Ok(None);
            }
            self.skipped += 1;
        }
        self.child.consume(ctx)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.skipped = 0;
        self.child.reset()
    }
}

/// Emit at most n records; a limit of zero emits nothing and never
/// pulls the child
#[derive(Debug)]
pub struct Limit {
    child: BoxedOperator,
    limit: usize,
    emitted: usize,
}

impl Limit {
    pub fn new(child: BoxedOperator, limit: usize) -> Self {
        Limit {
            child,
            limit,
            emitted: 0,
        }
    }
}

impl Operator for Limit {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        if self.emitted >= self.limit {
            return Ok(None);
        }
        match self.child.consume(ctx)? {
            Some(record) => {
                self.emitted += 1;
                Ok(Some(record))
            }
            None => {
                self.emitted = self.limit;
                Ok(None)
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.emitted = 0;
        self.child.reset()
    }
}

/// First occurrence of each record passes; duplicates are judged over
/// the visible slots with two Nulls collapsing (the DISTINCT rule)
#[derive(Debug)]
pub struct Distinct {
    child: BoxedOperator,
    /// dedup considers slots [0, visible)
    visible: usize,
    /// fingerprint -> visible-slot prefixes already emitted
    seen: HashMap<u64, Vec<Vec<Value>>>,
    started: bool,
}

impl Distinct {
    pub fn new(child: BoxedOperator, visible: usize) -> Self {
        Distinct {
            child,
            visible,
            seen: HashMap::new(),
            started: false,
        }
    }
}

impl Operator for Distinct {
    fn name(&self) -> &'static str {
        "Distinct"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        loop {
            let Some(record) = self.child.consume(ctx)? else {
                return Ok(None);
            };
            self.started = true;
            let prefix: Vec<Value> = record.values()[..self.visible].to_vec();
            let fp = Value::fingerprint(&prefix);
            let bucket = self.seen.entry(fp).or_default();
            let duplicate = bucket.iter().any(|prev| {
                prev.len() == prefix.len()
                    && prev.iter().zip(prefix.iter()).all(|(a, b)| a.group_eq(b))
            });
            if duplicate {
                continue;
            }
            bucket.push(prefix);
            return Ok(Some(record));
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        if self.started {
            return Err(QueryError::Internal(
                "Distinct cannot be reset mid-stream".to_string(),
            ));
        }
        self.child.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::timeout::QueryTimeout;
    use crate::graph::Graph;
    use crate::resultset::QueryStats;

    #[derive(Debug)]
    struct Fixed {
        rows: Vec<Record>,
        cursor: usize,
    }

    impl Fixed {
        fn of(values: &[i64]) -> Box<Self> {
            Box::new(Fixed {
                rows: values
                    .iter()
                    .map(|v| Record::from(vec![Value::Int(*v)]))
                    .collect(),
                cursor: 0,
            })
        }
    }

    impl Operator for Fixed {
        fn name(&self) -> &'static str {
            "Fixed"
        }
        fn open(&mut self, _ctx: &mut OpContext<'_>) -> QueryResult<()> {
            Ok(())
        }
        fn consume(&mut self, _ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
            let r = self.rows.get(self.cursor).cloned();
            self.cursor += 1;
            Ok(r)
        }
        fn reset(&mut self) -> QueryResult<()> {
            self.cursor = 0;
            Ok(())
        }
    }

    fn drain(op: &mut dyn Operator) -> Vec<i64> {
        let mut g = Graph::new();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        op.open(&mut ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.consume(&mut ctx).unwrap() {
            if let Value::Int(i) = r.get(0) {
                out.push(*i);
            }
        }
        assert!(op.consume(&mut ctx).unwrap().is_none(), "EOF must hold");
        out
    }

    #[test]
    fn test_sort_orders_and_is_stable() {
        let rows = vec![
            Record::from(vec![Value::Int(2), Value::Int(0)]),
            Record::from(vec![Value::Int(1), Value::Int(1)]),
            Record::from(vec![Value::Int(2), Value::Int(2)]),
        ];
        let child = Box::new(Fixed { rows, cursor: 0 });
        let mut op = Sort::new(child, vec![(0, false)]);
        let mut g = Graph::new();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        op.open(&mut ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.consume(&mut ctx).unwrap() {
            out.push((r.get(0).clone(), r.get(1).clone()));
        }
        // equal keys keep their child order (0 before 2)
        assert_eq!(
            out,
            vec![
                (Value::Int(1), Value::Int(1)),
                (Value::Int(2), Value::Int(0)),
                (Value::Int(2), Value::Int(2)),
            ]
        );
    }

    #[test]
    fn test_sort_descending_and_null_first() {
        let rows = vec![
            Record::from(vec![Value::Int(1)]),
            Record::from(vec![Value::Null]),
            Record::from(vec![Value::Int(3)]),
        ];
        let child = Box::new(Fixed { rows, cursor: 0 });
        let mut op = Sort::new(child, vec![(0, true)]);
        let mut g = Graph::new();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        op.open(&mut ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.consume(&mut ctx).unwrap() {
            out.push(r.get(0).clone());
        }
        // DESC reverses the total order, putting Null first
        assert_eq!(out, vec![Value::Null, Value::Int(3), Value::Int(1)]);
    }

    #[test]
    fn test_skip_then_limit_window() {
        let skip = Box::new(Skip::new(Fixed::of(&[1, 2, 3, 4, 5]), 1));
        let mut op = Limit::new(skip, 2);
        assert_eq!(drain(&mut op), vec![2, 3]);
    }

    #[test]
    fn test_limit_zero_emits_nothing() {
        let mut op = Limit::new(Fixed::of(&[1, 2]), 0);
        assert_eq!(drain(&mut op), Vec::<i64>::new());
    }

    #[test]
    fn test_skip_past_end() {
        let mut op = Skip::new(Fixed::of(&[1, 2]), 5);
        assert_eq!(drain(&mut op), Vec::<i64>::new());
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        let mut op = Distinct::new(Fixed::of(&[3, 1, 3, 2, 1]), 1);
        assert_eq!(drain(&mut op), vec![3, 1, 2]);
    }

    #[test]
    fn test_distinct_collapses_nulls() {
        let rows = vec![
            Record::from(vec![Value::Null]),
            Record::from(vec![Value::Null]),
            Record::from(vec![Value::Int(1)]),
        ];
        let child = Box::new(Fixed { rows, cursor: 0 });
        let mut op = Distinct::new(child, 1);
        let mut g = Graph::new();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        op.open(&mut ctx).unwrap();
        let mut count = 0;
        while op.consume(&mut ctx).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_materializing_reset_rules() {
        // reset before the first consume is fine
        let mut op = Sort::new(Fixed::of(&[1]), vec![(0, false)]);
        assert!(op.reset().is_ok());
        // mid-stream reset is refused
        let mut g = Graph::new();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        op.open(&mut ctx).unwrap();
        op.consume(&mut ctx).unwrap();
        assert!(op.reset().is_err());
    }
}
