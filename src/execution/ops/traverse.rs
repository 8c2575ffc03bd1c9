//! Single-hop traversal operators.
//!
//! CondTraverse expands each upstream record across one pattern edge
//! by a masked frontier multiply over the relation matrices;
//! ExpandInto only confirms an edge between two already-bound
//! endpoints. A transpose recorded by the planner stays a descriptor
//! flag all the way into the kernel call.

use crate::error::QueryResult;
use crate::execution::ops::traverse_support::{expand_frontier, resolve_types};
use crate::execution::ops::{BoxedOperator, OpContext, Operator};
use crate::graph::RelTypeId;
use crate::matrix::SparseVector;
use crate::planner::TraversalDescriptor;
use crate::value::{NodeId, Record, Value};
use std::collections::VecDeque;

/// Conditional traverse: src bound upstream, binds dst (and the edge
/// when the pattern names it)
#[derive(Debug)]
pub struct CondTraverse {
    child: BoxedOperator,
    desc: TraversalDescriptor,
    src_slot: usize,
    dst_slot: usize,
    edge_slot: Option<usize>,
    /// expansions of the current upstream record
    pending: VecDeque<Record>,
    eof: bool,
}

impl CondTraverse {
    pub fn new(
        child: BoxedOperator,
        desc: TraversalDescriptor,
        src_slot: usize,
        dst_slot: usize,
        edge_slot: Option<usize>,
    ) -> Self {
        CondTraverse {
            child,
            desc,
            src_slot,
            dst_slot,
            edge_slot,
            pending: VecDeque::new(),
            eof: false,
        }
    }

    /// All edges consistent with the walk src -> dst, respecting the
    /// stored orientation
    fn matching_edges(
        &self,
        ctx: &OpContext<'_>,
        rel_type: Option<RelTypeId>,
        src: NodeId,
        dst: NodeId,
    ) -> Vec<u64> {
        let (stored_src, stored_dst) = if self.desc.transpose {
            (dst, src)
        } else {
            (src, dst)
        };
        let mut edges = ctx.graph().edges_between(stored_src, stored_dst, rel_type);
        if self.desc.bidirectional {
            edges.extend(ctx.graph().edges_between(stored_dst, stored_src, rel_type));
            edges.sort_unstable();
            edges.dedup();
        }
        edges
    }

    fn expand_record(&mut self, ctx: &mut OpContext<'_>, record: &Record) -> QueryResult<()> {
        let Value::Node(src) = *record.get(self.src_slot) else {
            // unbound or non-node source matches nothing
            return Ok(());
        };
        let Some(types) = resolve_types(ctx, &self.desc.types) else {
            return Ok(());
        };

        let dims = ctx.graph().matrix_dims();
        let mut frontier = SparseVector::new(dims);
        frontier.set_element(src, 1)?;
        let mut next = SparseVector::new(dims);
        for rel_type in &types {
            expand_frontier(
                ctx,
                *rel_type,
                &frontier,
                &mut next,
                self.desc.transpose,
                self.desc.bidirectional,
            )?;
        }

        for (dst, _) in next.iter() {
            match self.edge_slot {
                None => {
                    let mut out = record.clone();
                    out.set(self.dst_slot, Value::Node(dst));
                    self.pending.push_back(out);
                }
                Some(edge_slot) => {
                    // bound edge alias: one record per concrete edge,
                    // parallel edges included
                    for rel_type in &types {
                        for edge_id in self.matching_edges(ctx, *rel_type, src, dst) {
                            let mut out = record.clone();
                            out.set(self.dst_slot, Value::Node(dst));
                            out.set(edge_slot, Value::Edge(edge_id));
                            self.pending.push_back(out);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Operator for CondTraverse {
    fn name(&self) -> &'static str {
        "CondTraverse"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            if self.eof {
                return Ok(None);
            }
            ctx.timeout.check()?;
            match self.child.consume(ctx)? {
                Some(record) => self.expand_record(ctx, &record)?,
                None => {
                    self.eof = true;
                    return Ok(None);
                }
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.pending.clear();
        self.eof = false;
        self.child.reset()
    }
}

/// Both endpoints bound: pass the record through when a matching
/// edge exists
#[derive(Debug)]
pub struct ExpandInto {
    child: BoxedOperator,
    desc: TraversalDescriptor,
    src_slot: usize,
    dst_slot: usize,
    edge_slot: Option<usize>,
    pending: VecDeque<Record>,
    eof: bool,
}

impl ExpandInto {
    pub fn new(
        child: BoxedOperator,
        desc: TraversalDescriptor,
        src_slot: usize,
        dst_slot: usize,
        edge_slot: Option<usize>,
    ) -> Self {
        ExpandInto {
            child,
            desc,
            src_slot,
            dst_slot,
            edge_slot,
            pending: VecDeque::new(),
            eof: false,
        }
    }
}

impl Operator for ExpandInto {
    fn name(&self) -> &'static str {
        "ExpandInto"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            if self.eof {
                return Ok(None);
            }
            ctx.timeout.check()?;
            let Some(record) = self.child.consume(ctx)? else {
                self.eof = true;
                return Ok(None);
            };
            let (Value::Node(src), Value::Node(dst)) =
                (record.get(self.src_slot).clone(), record.get(self.dst_slot).clone())
            else {
                continue;
            };
            let Some(types) = resolve_types(ctx, &self.desc.types) else {
                continue;
            };
            let (stored_src, stored_dst) = if self.desc.transpose {
                (dst, src)
            } else {
                (src, dst)
            };
            let mut edges: Vec<u64> = Vec::new();
            for rel_type in &types {
                edges.extend(ctx.graph().edges_between(stored_src, stored_dst, *rel_type));
                if self.desc.bidirectional {
                    edges.extend(ctx.graph().edges_between(stored_dst, stored_src, *rel_type));
                }
            }
            edges.sort_unstable();
            edges.dedup();
            if edges.is_empty() {
                continue;
            }
            match self.edge_slot {
                None => self.pending.push_back(record),
                Some(edge_slot) => {
                    for edge_id in edges {
                        let mut out = record.clone();
                        out.set(edge_slot, Value::Edge(edge_id));
                        self.pending.push_back(out);
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.pending.clear();
        self.eof = false;
        self.child.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ops::AllNodeScan;
    use crate::execution::timeout::QueryTimeout;
    use crate::graph::Graph;
    use crate::resultset::QueryStats;

    fn descriptor(types: &[&str]) -> TraversalDescriptor {
        TraversalDescriptor {
            src_alias: "a".into(),
            dst_alias: "b".into(),
            edge_alias: None,
            types: types.iter().map(|s| (*s).to_string()).collect(),
            transpose: false,
            bidirectional: false,
            min_hops: 1,
            max_hops: Some(1),
        }
    }

    fn drain(op: &mut dyn Operator, ctx: &mut OpContext<'_>) -> Vec<Record> {
        op.open(ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.consume(ctx).unwrap() {
            out.push(r);
        }
        // EOF stays EOF
        assert!(op.consume(ctx).unwrap().is_none());
        out
    }

    #[test]
    fn test_cond_traverse_follows_edges() {
        let mut g = Graph::new();
        let a = g.create_node(&[], vec![]).unwrap();
        let b = g.create_node(&[], vec![]).unwrap();
        let c = g.create_node(&[], vec![]).unwrap();
        g.create_edge("K", a, b, vec![]).unwrap();
        g.create_edge("K", b, c, vec![]).unwrap();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        let scan = Box::new(AllNodeScan::new(0, 2));
        let mut op = CondTraverse::new(scan, descriptor(&["K"]), 0, 1, None);
        let rows = drain(&mut op, &mut ctx);
        let pairs: Vec<(Value, Value)> = rows
            .iter()
            .map(|r| (r.get(0).clone(), r.get(1).clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Value::Node(a), Value::Node(b)),
                (Value::Node(b), Value::Node(c)),
            ]
        );
    }

    #[test]
    fn test_cond_traverse_transpose_walks_backwards() {
        let mut g = Graph::new();
        let a = g.create_node(&[], vec![]).unwrap();
        let b = g.create_node(&[], vec![]).unwrap();
        g.create_edge("K", a, b, vec![]).unwrap();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        let scan = Box::new(AllNodeScan::new(0, 2));
        let mut desc = descriptor(&["K"]);
        desc.transpose = true;
        let mut op = CondTraverse::new(scan, desc, 0, 1, None);
        let rows = drain(&mut op, &mut ctx);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), &Value::Node(b));
        assert_eq!(rows[0].get(1), &Value::Node(a));
    }

    #[test]
    fn test_bound_edge_enumerates_parallel_edges() {
        let mut g = Graph::new();
        let a = g.create_node(&[], vec![]).unwrap();
        let b = g.create_node(&[], vec![]).unwrap();
        let e1 = g.create_edge("K", a, b, vec![]).unwrap();
        let e2 = g.create_edge("K", a, b, vec![]).unwrap();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        let scan = Box::new(AllNodeScan::new(0, 3));
        let mut op = CondTraverse::new(scan, descriptor(&["K"]), 0, 1, Some(2));
        let rows = drain(&mut op, &mut ctx);
        let edges: Vec<Value> = rows.iter().map(|r| r.get(2).clone()).collect();
        assert_eq!(edges, vec![Value::Edge(e1), Value::Edge(e2)]);
    }

    #[test]
    fn test_expand_into_filters_unconnected() {
        let mut g = Graph::new();
        let a = g.create_node(&[], vec![]).unwrap();
        let b = g.create_node(&[], vec![]).unwrap();
        let c = g.create_node(&[], vec![]).unwrap();
        g.create_edge("K", a, b, vec![]).unwrap();
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();

        // upstream yielding (a,b) and (a,c)
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
        let mut r1 = Record::new(2);
        r1.set(0, Value::Node(a));
        r1.set(1, Value::Node(b));
        let mut r2 = Record::new(2);
        r2.set(0, Value::Node(a));
        r2.set(1, Value::Node(c));
        let upstream = Box::new(Fixed {
            rows: vec![r1, r2],
            cursor: 0,
        });

        let mut ctx = OpContext::read_write(&mut g, &timeout, &mut stats);
        let mut op = ExpandInto::new(upstream, descriptor(&["K"]), 0, 1, None);
        let rows = drain(&mut op, &mut ctx);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(1), &Value::Node(b));
    }
}
