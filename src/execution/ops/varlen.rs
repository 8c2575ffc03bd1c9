//! Variable-length traversal.
//!
//! `*min..max` steps iterate a frontier vector against the relation
//! matrices: one multiply per hop, collecting destinations once the
//! hop count clears `min`, stopping at `max`, an empty frontier, or
//! (for unbounded ranges) the reachable-set fixpoint. Destinations
//! form a set: one record per reachable node within the bounds.

use crate::error::QueryResult;
use crate::execution::ops::traverse_support::expand_all_types;
use crate::execution::ops::{BoxedOperator, OpContext, Operator};
use crate::matrix::SparseVector;
use crate::planner::TraversalDescriptor;
use crate::value::{Record, Value};
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug)]
pub struct CondVarLenTraverse {
    child: BoxedOperator,
    desc: TraversalDescriptor,
    src_slot: usize,
    dst_slot: usize,
    pending: VecDeque<Record>,
    eof: bool,
}

impl CondVarLenTraverse {
    pub fn new(
        child: BoxedOperator,
        desc: TraversalDescriptor,
        src_slot: usize,
        dst_slot: usize,
    ) -> Self {
        CondVarLenTraverse {
            child,
            desc,
            src_slot,
            dst_slot,
            pending: VecDeque::new(),
            eof: false,
        }
    }

    fn expand_record(&mut self, ctx: &mut OpContext<'_>, record: &Record) -> QueryResult<()> {
        let Value::Node(src) = *record.get(self.src_slot) else {
            return Ok(());
        };
        let dims = ctx.graph().matrix_dims();
        let mut frontier = SparseVector::new(dims);
        frontier.set_element(src, 1)?;

        let mut reachable: BTreeSet<u64> = BTreeSet::new();
        let mut hop: u32 = 0;
        loop {
            if let Some(max) = self.desc.max_hops {
                if hop >= max {
                    break;
                }
            }
            ctx.timeout.check()?;

            let mut next = SparseVector::new(dims);
            expand_all_types(
                ctx,
                &self.desc.types,
                &frontier,
                &mut next,
                self.desc.transpose,
                self.desc.bidirectional,
            )?;
            hop += 1;

            if hop >= self.desc.min_hops {
                // collect new destinations; the surviving frontier is
                // only what we have not seen, which both dedups the
                // output and terminates unbounded ranges on cycles
                let mut fresh = SparseVector::new(dims);
                for (j, v) in next.iter() {
                    if reachable.insert(j) {
                        fresh.set_element(j, v)?;
                    }
                }
                frontier = fresh;
            } else {
                frontier = next;
            }
            if frontier.is_empty() {
                break;
            }
        }

        for dst in reachable {
            let mut out = record.clone();
            out.set(self.dst_slot, Value::Node(dst));
            self.pending.push_back(out);
        }
        Ok(())
    }
}

impl Operator for CondVarLenTraverse {
    fn name(&self) -> &'static str {
        "CondVarLenTraverse"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ops::AllNodeScan;
    use crate::execution::timeout::QueryTimeout;
    use crate::graph::Graph;
    use crate::resultset::QueryStats;
    use crate::value::NodeId;

    fn chain_graph(n: usize) -> (Graph, Vec<NodeId>) {
        let mut g = Graph::new();
        let ids: Vec<NodeId> = (0..n).map(|_| g.create_node(&[], vec![]).unwrap()).collect();
        for w in ids.windows(2) {
            g.create_edge("K", w[0], w[1], vec![]).unwrap();
        }
        (g, ids)
    }

    fn varlen_from(
        g: &mut Graph,
        src: NodeId,
        min: u32,
        max: Option<u32>,
    ) -> Vec<NodeId> {
        let timeout = QueryTimeout::unbounded();
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_write(g, &timeout, &mut stats);
        let desc = TraversalDescriptor {
            src_alias: "a".into(),
            dst_alias: "z".into(),
            edge_alias: None,
            types: vec!["K".into()],
            transpose: false,
            bidirectional: false,
            min_hops: min,
            max_hops: max,
        };
        let scan = Box::new(AllNodeScan::new(0, 2));
        let mut op = CondVarLenTraverse::new(scan, desc, 0, 1);
        op.open(&mut ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.consume(&mut ctx).unwrap() {
            if r.get(0) == &Value::Node(src) {
                let Value::Node(dst) = r.get(1) else {
                    panic!("dst must be a node");
                };
                out.push(*dst);
            }
        }
        out
    }

    #[test]
    fn test_bounded_range() {
        // a -> b -> c -> d; *2..3 from a reaches c and d
        let (mut g, ids) = chain_graph(4);
        let reached = varlen_from(&mut g, ids[0], 2, Some(3));
        assert_eq!(reached, vec![ids[2], ids[3]]);
    }

    #[test]
    fn test_unbounded_terminates_on_cycle() {
        let (mut g, ids) = chain_graph(3);
        // close the cycle
        g.create_edge("K", ids[2], ids[0], vec![]).unwrap();
        let reached = varlen_from(&mut g, ids[0], 1, None);
        assert_eq!(reached, ids);
    }

    #[test]
    fn test_min_hops_masks_early_steps() {
        let (mut g, ids) = chain_graph(4);
        let reached = varlen_from(&mut g, ids[0], 3, None);
        assert_eq!(reached, vec![ids[3]]);
    }
}
