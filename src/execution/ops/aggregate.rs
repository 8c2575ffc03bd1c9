//! Aggregation operator.
//!
//! State machine: INIT -> DRAINING_CHILD -> EMITTING -> DONE. While
//! draining, each child record's grouping-key expressions select (or
//! create) a Group in the cache and its aggregate expressions step
//! that group's contexts. Emission walks groups in first-seen order,
//! finalizing each group's aggregates on its first emission.

use crate::arithmetic::{self, ExprNode};
use crate::error::{QueryError, QueryResult};
use crate::execution::ops::{BoxedOperator, OpContext, Operator};
use crate::grouping::{Group, GroupCache};
use crate::value::{Record, Value};

/// One output slot of the aggregation: either a grouping key or an
/// aggregate-bearing expression
#[derive(Debug)]
pub struct ProjectionItem {
    pub expr: ExprNode,
    pub is_aggregate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Draining,
    Emitting,
    Done,
}

#[derive(Debug)]
pub struct AggregateOp {
    child: BoxedOperator,
    items: Vec<ProjectionItem>,
    /// output slot per item
    slots: Vec<usize>,
    out_width: usize,
    cache: GroupCache,
    emit: Vec<Group>,
    cursor: usize,
    state: State,
}

impl AggregateOp {
    pub fn new(
        child: BoxedOperator,
        items: Vec<ProjectionItem>,
        slots: Vec<usize>,
        out_width: usize,
    ) -> Self {
        debug_assert_eq!(items.len(), slots.len());
        AggregateOp {
            child,
            items,
            slots,
            out_width,
            cache: GroupCache::new(),
            emit: Vec::new(),
            cursor: 0,
            state: State::Init,
        }
    }

    fn key_count(&self) -> usize {
        self.items.iter().filter(|i| !i.is_aggregate).count()
    }

    fn drain_child(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        while let Some(record) = self.child.consume(ctx)? {
            ctx.timeout.check()?;
            let mut keys = Vec::with_capacity(self.key_count());
            for item in &self.items {
                if !item.is_aggregate {
                    keys.push(arithmetic::evaluate(&item.expr, &record, ctx.graph())?);
                }
            }
            let templates: Vec<&ExprNode> = self
                .items
                .iter()
                .filter(|i| i.is_aggregate)
                .map(|i| &i.expr)
                .collect();
            let group = self
                .cache
                .get_or_insert_with(&keys, || templates.iter().map(|t| t.fresh()).collect());
            for expr in &mut group.agg_exprs {
                arithmetic::aggregate_step(expr, &record, ctx.graph())?;
            }
        }
        Ok(())
    }

    fn emit_group(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        let Some(group) = self.emit.get_mut(self.cursor) else {
            self.state = State::Done;
            return Ok(None);
        };
        self.cursor += 1;

        // finalize on first (and only) emission of this group
        for expr in &mut group.agg_exprs {
            arithmetic::reduce(expr);
        }

        let mut out = Record::new(self.out_width);
        let mut key_idx = 0;
        let mut agg_idx = 0;
        let empty = Record::new(0);
        for (item, slot) in self.items.iter().zip(self.slots.iter()) {
            if item.is_aggregate {
                let value = arithmetic::evaluate(&group.agg_exprs[agg_idx], &empty, ctx.graph())?;
                out.set(*slot, value);
                agg_idx += 1;
            } else {
                out.set(*slot, group.keys[key_idx].clone());
                key_idx += 1;
            }
        }
        Ok(Some(out))
    }
}

impl Operator for AggregateOp {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.state = State::Draining;
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        if self.state == State::Init {
            return Err(QueryError::Internal(
                "Aggregate consumed before open".to_string(),
            ));
        }
        if self.state == State::Draining {
            self.drain_child(ctx)?;
            // a keyless aggregation over no rows still emits one row
            // of aggregate defaults
            if self.cache.is_empty() && self.key_count() == 0 {
                let templates: Vec<ExprNode> = self
                    .items
                    .iter()
                    .filter(|i| i.is_aggregate)
                    .map(|i| i.expr.fresh())
                    .collect();
                self.cache.get_or_insert_with(&[], || templates);
            }
            self.emit = std::mem::take(&mut self.cache).into_groups();
            self.cursor = 0;
            self.state = State::Emitting;
        }
        if self.state == State::Done {
            return Ok(None);
        }
        self.emit_group(ctx)
    }

    fn reset(&mut self) -> QueryResult<()> {
        if self.state != State::Init && self.state != State::Draining {
            return Err(QueryError::Internal(
                "Aggregate cannot be reset mid-stream".to_string(),
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
    use std::collections::HashMap;

    #[derive(Debug)]
    struct Fixed {
        rows: Vec<Record>,
        cursor: usize,
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

    fn item(src: &str, slots: &[(&str, usize)]) -> ProjectionItem {
        let q = crate::parser::parse(&format!("RETURN {src}")).unwrap();
        let crate::ast::Clause::Return(body) = &q.clauses[0] else {
            panic!("expected RETURN");
        };
        let map: HashMap<String, usize> =
            slots.iter().map(|(a, s)| ((*a).to_string(), *s)).collect();
        let expr = ExprNode::build(&body.items[0].expr, &map).unwrap();
        let is_aggregate = expr.contains_aggregate();
        ProjectionItem { expr, is_aggregate }
    }

    fn run(op: &mut AggregateOp) -> Vec<Vec<Value>> {
        let mut g = Graph::new();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        op.open(&mut ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.consume(&mut ctx).unwrap() {
            out.push(r.values().to_vec());
        }
        assert!(op.consume(&mut ctx).unwrap().is_none());
        out
    }

    fn rows_of(values: &[(i64, i64)]) -> Box<Fixed> {
        Box::new(Fixed {
            rows: values
                .iter()
                .map(|(a, b)| Record::from(vec![Value::Int(*a), Value::Int(*b)]))
                .collect(),
            cursor: 0,
        })
    }

    #[test]
    fn test_grouped_aggregation_insertion_order() {
        // group by slot 0, sum slot 1
        let child = rows_of(&[(2, 10), (1, 1), (2, 5), (1, 2)]);
        let items = vec![item("k", &[("k", 0)]), item("sum(v)", &[("v", 1)])];
        let out_width = items.len();
        let slots = (0..out_width).collect();
        let mut op = AggregateOp::new(child, items, slots, out_width);
        let rows = run(&mut op);
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(2), Value::Int(15)],
                vec![Value::Int(1), Value::Int(3)],
            ]
        );
    }

    #[test]
    fn test_keyless_aggregation_over_empty_child() {
        let child = Box::new(Fixed {
            rows: vec![],
            cursor: 0,
        });
        let items = vec![item("count(v)", &[("v", 1)]), item("sum(v)", &[("v", 1)])];
        let out_width = items.len();
        let slots = (0..out_width).collect();
        let mut op = AggregateOp::new(child, items, slots, out_width);
        let rows = run(&mut op);
        assert_eq!(rows, vec![vec![Value::Int(0), Value::Int(0)]]);
    }

    #[test]
    fn test_group_uniqueness() {
        let child = rows_of(&[(1, 1), (1, 1), (1, 1)]);
        let items = vec![item("k", &[("k", 0)]), item("count(v)", &[("v", 1)])];
        let out_width = items.len();
        let slots = (0..out_width).collect();
        let mut op = AggregateOp::new(child, items, slots, out_width);
        let rows = run(&mut op);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], Value::Int(3));
    }
}
