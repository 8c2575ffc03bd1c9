//! Mutation operators: Create, Update (SET), Delete.
//!
//! All run under the query's exclusive hold on the graph; matrix
//! writes queue as pending tuples and merge at the query's final
//! flush, so a failing query discards its buffered matrix updates
//! with the plan.

use crate::arithmetic::{self, ExprNode};
use crate::error::{QueryError, QueryResult};
use crate::execution::ops::{BoxedOperator, OpContext, Operator};
use crate::value::{Record, Value};
use std::collections::HashSet;

/// A node element of a CREATE / MERGE pattern
#[derive(Debug)]
pub struct EntitySpec {
    pub slot: usize,
    pub labels: Vec<String>,
    pub props: Vec<(String, ExprNode)>,
}

/// An edge element; src/dst follow creation direction (the builder
/// already swapped endpoints for right-to-left arrows)
#[derive(Debug)]
pub struct EdgeSpec {
    pub slot: usize,
    pub rel_type: String,
    pub src_slot: usize,
    pub dst_slot: usize,
    pub props: Vec<(String, ExprNode)>,
}

/// One CREATE pattern, nodes then edges
#[derive(Debug, Default)]
pub struct PatternSpec {
    pub nodes: Vec<EntitySpec>,
    pub edges: Vec<EdgeSpec>,
}

impl PatternSpec {
    /// Materialize this pattern against a record: bound slots are
    /// reused, unbound ones get freshly created entities
    pub fn apply(&self, ctx: &mut OpContext<'_>, record: &mut Record) -> QueryResult<()> {
        for node in &self.nodes {
            if matches!(record.get(node.slot), Value::Node(_)) {
                continue;
            }
            let props = eval_props(&node.props, record, ctx)?;
            let prop_count = props.iter().filter(|(_, v)| !v.is_null()).count();
            let id = ctx.graph_mut()?.create_node(&node.labels, props)?;
            ctx.stats.nodes_created += 1;
            ctx.stats.labels_added += node.labels.len();
            ctx.stats.properties_set += prop_count;
            record.set(node.slot, Value::Node(id));
        }
        for edge in &self.edges {
            let Value::Node(src) = *record.get(edge.src_slot) else {
                return Err(QueryError::Internal(
                    "edge creation with unbound source".to_string(),
                ));
            };
            let Value::Node(dst) = *record.get(edge.dst_slot) else {
                return Err(QueryError::Internal(
                    "edge creation with unbound destination".to_string(),
                ));
            };
            let props = eval_props(&edge.props, record, ctx)?;
            let prop_count = props.iter().filter(|(_, v)| !v.is_null()).count();
            let id = ctx.graph_mut()?.create_edge(&edge.rel_type, src, dst, props)?;
            ctx.stats.relationships_created += 1;
            ctx.stats.properties_set += prop_count;
            record.set(edge.slot, Value::Edge(id));
        }
        Ok(())
    }
}

fn eval_props(
    props: &[(String, ExprNode)],
    record: &Record,
    ctx: &OpContext<'_>,
) -> QueryResult<Vec<(String, Value)>> {
    props
        .iter()
        .map(|(k, e)| Ok((k.clone(), arithmetic::evaluate(e, record, ctx.graph())?)))
        .collect()
}

/// CREATE: materializes its patterns once per upstream record (or
/// exactly once as a leaf) and passes the enriched record through
#[derive(Debug)]
pub struct CreateOp {
    child: Option<BoxedOperator>,
    patterns: Vec<PatternSpec>,
    width: usize,
    done: bool,
}

impl CreateOp {
    pub fn new(child: Option<BoxedOperator>, patterns: Vec<PatternSpec>, width: usize) -> Self {
        CreateOp {
            child,
            patterns,
            width,
            done: false,
        }
    }
}

impl Operator for CreateOp {
    fn name(&self) -> &'static str {
        "Create"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.done = false;
        match &mut self.child {
            Some(child) => child.open(ctx),
            None => Ok(()),
        }
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        ctx.timeout.check()?;
        let mut record = match &mut self.child {
            Some(child) => match child.consume(ctx)? {
                Some(r) => r,
                None => return Ok(None),
            },
            None => {
                if self.done {
                    return Ok(None);
                }
                self.done = true;
                Record::new(self.width)
            }
        };
        for pattern in &self.patterns {
            pattern.apply(ctx, &mut record)?;
        }
        Ok(Some(record))
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.done = false;
        match &mut self.child {
            Some(child) => child.reset(),
            None => Ok(()),
        }
    }
}

/// SET: applies property assignments and passes the record through
#[derive(Debug)]
pub struct UpdateOp {
    child: BoxedOperator,
    /// (entity slot, property key, value expression)
    items: Vec<(usize, String, ExprNode)>,
}

impl UpdateOp {
    pub fn new(child: BoxedOperator, items: Vec<(usize, String, ExprNode)>) -> Self {
        UpdateOp { child, items }
    }
}

impl Operator for UpdateOp {
    fn name(&self) -> &'static str {
        "Update"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        let Some(record) = self.child.consume(ctx)? else {
            return Ok(None);
        };
        for (slot, key, expr) in &self.items {
            let value = arithmetic::evaluate(expr, &record, ctx.graph())?;
            let wrote = match record.get(*slot) {
                Value::Node(id) => ctx.graph_mut()?.set_node_property(*id, key, value)?,
                Value::Edge(id) => ctx.graph_mut()?.set_edge_property(*id, key, value)?,
                Value::Null => false,
                other => {
                    return Err(QueryError::type_error(format!(
                        "SET target must be a node or relationship, got {}",
                        other.kind()
                    )));
                }
            };
            if wrote {
                ctx.stats.properties_set += 1;
            }
        }
        Ok(Some(record))
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.child.reset()
    }
}

/// DELETE: records entities while streaming, applies the deletions
/// once the child is exhausted (finalize-time removal).
///
/// A bare DELETE refuses a node that still has relationships the
/// clause is not also deleting; DETACH DELETE cascades over them.
/// The connectivity check runs before any deletion, so a rejected
/// clause mutates nothing.
#[derive(Debug)]
pub struct DeleteOp {
    child: BoxedOperator,
    slots: Vec<usize>,
    detach: bool,
    nodes: HashSet<u64>,
    edges: HashSet<u64>,
    applied: bool,
}

impl DeleteOp {
    pub fn new(child: BoxedOperator, slots: Vec<usize>, detach: bool) -> Self {
        DeleteOp {
            child,
            slots,
            detach,
            nodes: HashSet::new(),
            edges: HashSet::new(),
            applied: false,
        }
    }
}

impl Operator for DeleteOp {
    fn name(&self) -> &'static str {
        "Delete"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        if let Some(record) = self.child.consume(ctx)? {
            for slot in &self.slots {
                match record.get(*slot) {
                    Value::Node(id) => {
                        self.nodes.insert(*id);
                    }
                    Value::Edge(id) => {
                        self.edges.insert(*id);
                    }
                    Value::Null => {}
                    other => {
                        return Err(QueryError::type_error(format!(
                            "DELETE target must be a node or relationship, got {}",
                            other.kind()
                        )));
                    }
                }
            }
            return Ok(Some(record));
        }
        if !self.applied {
            self.applied = true;
            if !self.detach {
                for id in &self.nodes {
                    let remaining = ctx
                        .graph()
                        .incident_edges(*id)
                        .into_iter()
                        .filter(|e| !self.edges.contains(e))
                        .count();
                    if remaining > 0 {
                        return Err(QueryError::Constraint(format!(
                            "cannot delete node {id}: {remaining} relationship(s) still \
                             connected; use DETACH DELETE"
                        )));
                    }
                }
            }
            for id in self.edges.drain() {
                ctx.timeout.check()?;
                if ctx.graph_mut()?.delete_edge(id)? {
                    ctx.stats.relationships_deleted += 1;
                }
            }
            for id in self.nodes.drain() {
                ctx.timeout.check()?;
                let (deleted, cascaded) = ctx.graph_mut()?.delete_node(id)?;
                if deleted {
                    ctx.stats.nodes_deleted += 1;
                    ctx.stats.relationships_deleted += cascaded;
                }
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.nodes.clear();
        self.edges.clear();
        self.applied = false;
        self.child.reset()
    }
}
