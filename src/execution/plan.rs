//! # Execution Plan Builder
//!
//! Turns a validated query into the operator tree and drives it.
//!
//! The query splits into segments at every WITH / RETURN boundary and
//! each segment gets its own record layout, fixed before any operator
//! is built: aliases projected by the previous WITH land in the
//! leading slots, every alias a clause binds extends the layout, and
//! hidden ORDER BY keys ride in trailing slots past the next
//! segment's width so nothing collides. Operators therefore always
//! emit records of their declared width.

use crate::arithmetic::ExprNode;
use crate::ast::{
    BinaryOp, Clause, Direction, EdgePattern, Expr, NodePattern, PathPattern, Projection,
    ProjectionBody, Query,
};
use crate::error::{QueryError, QueryResult};
use crate::execution::ops::{
    AggregateOp, AllNodeScan, Argument, ArgumentSlot, BoxedOperator, CartesianProduct,
    CondTraverse, CondVarLenTraverse, CreateOp, DeleteOp, Distinct, EdgeSpec, EntitySpec,
    ExpandInto, Filter, Limit, MergeOp, NodeByIndexScan, NodeByLabelScan, OpContext, Operator,
    Optional, PatternSpec, ProcedureCall, ProduceResults, Project, ProjectionItem, Skip, Sort,
    Unwind, UpdateOp,
};
use crate::execution::timeout::QueryTimeout;
use crate::graph::{Graph, IndexOp};
use crate::planner::{self, EntryPoint, TraversalDescriptor};
use crate::procedures;
use crate::query_graph::QueryGraph;
use crate::resultset::{QueryStats, ResultSet};
use crate::value::Record;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::debug;

/// A built plan, ready to run once
#[derive(Debug)]
pub struct ExecutionPlan {
    root: BoxedOperator,
    header: Vec<String>,
    returns_rows: bool,
}

impl ExecutionPlan {
    /// Compile a validated query against the current graph
    pub fn build(query: &Query, graph: &Graph) -> QueryResult<ExecutionPlan> {
        let query = assign_anonymous_aliases(query);
        PlanBuilder { graph }.build(&query)
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Run a read-only plan under a shared hold on the graph
    pub fn execute_read(
        mut self,
        graph: &Graph,
        timeout: &QueryTimeout,
        max_rows: usize,
    ) -> QueryResult<ResultSet> {
        let mut result = ResultSet::new(self.header.clone(), max_rows);
        let mut stats = QueryStats::default();
        let mut ctx = OpContext::read_only(graph, timeout, &mut stats);
        self.root.open(&mut ctx)?;
        while let Some(record) = self.root.consume(&mut ctx)? {
            if self.returns_rows && !result.add_record(record) {
                break;
            }
        }
        Ok(result)
    }

    /// Run a mutating plan under an exclusive hold on the graph.
    /// On success the final flush is the commit point; on error the
    /// buffered matrix updates are discarded before the error
    /// propagates.
    pub fn execute_write(
        mut self,
        graph: &mut Graph,
        timeout: &QueryTimeout,
        max_rows: usize,
    ) -> QueryResult<ResultSet> {
        let mut result = ResultSet::new(self.header.clone(), max_rows);
        let mut stats = QueryStats::default();
        let run = (|| -> QueryResult<()> {
            let mut ctx = OpContext::read_write(&mut *graph, timeout, &mut stats);
            self.root.open(&mut ctx)?;
            while let Some(record) = self.root.consume(&mut ctx)? {
                if self.returns_rows && !result.add_record(record) {
                    break;
                }
            }
            Ok(())
        })();
        match run {
            Ok(()) => {
                graph.flush_pending();
                *result.stats_mut() = stats;
                Ok(result)
            }
            Err(err) => {
                graph.discard_pending();
                Err(err)
            }
        }
    }
}

// ---------------------------------------------------------------------
// Anonymous alias assignment (the AST rewrite pass)
// ---------------------------------------------------------------------

/// Give every unnamed pattern entity a synthetic alias so it can hold
/// a record slot. Synthetic names start with '@', which the grammar
/// cannot produce.
fn assign_anonymous_aliases(query: &Query) -> Query {
    let mut query = query.clone();
    let mut counter = 0usize;
    for clause in &mut query.clauses {
        let patterns: Vec<&mut PathPattern> = match clause {
            Clause::Match { patterns, .. } | Clause::Create { patterns } => {
                patterns.iter_mut().collect()
            }
            Clause::Merge { pattern } => vec![pattern],
            _ => Vec::new(),
        };
        for pattern in patterns {
            if pattern.start.alias.is_none() {
                counter += 1;
                pattern.start.alias = Some(format!("@n{counter}"));
            }
            for (edge, node) in &mut pattern.steps {
                if edge.alias.is_none() {
                    counter += 1;
                    edge.alias = Some(format!("@e{counter}"));
                }
                if node.alias.is_none() {
                    counter += 1;
                    node.alias = Some(format!("@n{counter}"));
                }
            }
        }
    }
    query
}

fn is_anonymous(alias: &str) -> bool {
    alias.starts_with('@')
}

// ---------------------------------------------------------------------
// Segment splitting and layout
// ---------------------------------------------------------------------

struct SegmentSpec<'q> {
    clauses: &'q [Clause],
    body: Option<&'q ProjectionBody>,
    is_return: bool,
}

fn split_segments(query: &Query) -> Vec<SegmentSpec<'_>> {
    let mut specs = Vec::new();
    let mut idx = 0;
    while idx < query.clauses.len() {
        let mut end = idx;
        while end < query.clauses.len()
            && !matches!(query.clauses[end], Clause::With(_) | Clause::Return(_))
        {
            end += 1;
        }
        match query.clauses.get(end) {
            Some(Clause::With(body)) => {
                specs.push(SegmentSpec {
                    clauses: &query.clauses[idx..end],
                    body: Some(body),
                    is_return: false,
                });
                idx = end + 1;
            }
            Some(Clause::Return(body)) => {
                specs.push(SegmentSpec {
                    clauses: &query.clauses[idx..end],
                    body: Some(body),
                    is_return: true,
                });
                idx = end + 1;
            }
            _ => {
                specs.push(SegmentSpec {
                    clauses: &query.clauses[idx..end],
                    body: None,
                    is_return: false,
                });
                idx = end;
            }
        }
    }
    specs
}

/// Record layout of one segment
#[derive(Debug, Clone, Default)]
struct Layout {
    slots: HashMap<String, usize>,
    width: usize,
}

impl Layout {
    fn add(&mut self, alias: &str) {
        if !self.slots.contains_key(alias) {
            self.slots.insert(alias.to_string(), self.width);
            self.width += 1;
        }
    }

    fn slot(&self, alias: &str) -> QueryResult<usize> {
        self.slots.get(alias).copied().ok_or_else(|| {
            QueryError::Internal(format!("alias '{alias}' missing from record layout"))
        })
    }
}

fn layout_segment(carried: &[String], clauses: &[Clause]) -> QueryResult<Layout> {
    let mut layout = Layout::default();
    for alias in carried {
        layout.add(alias);
    }
    for clause in clauses {
        match clause {
            Clause::Match { patterns, .. } | Clause::Create { patterns } => {
                for pattern in patterns {
                    for alias in pattern.aliases() {
                        layout.add(alias);
                    }
                }
            }
            Clause::Merge { pattern } => {
                for alias in pattern.aliases() {
                    layout.add(alias);
                }
            }
            Clause::Unwind { alias, .. } => layout.add(alias),
            Clause::Call {
                procedure, yields, ..
            } => {
                let desc = procedures::lookup(procedure).ok_or_else(|| {
                    QueryError::Internal(format!("unknown procedure '{procedure}'"))
                })?;
                if yields.is_empty() {
                    for (name, _) in desc.outputs {
                        layout.add(name);
                    }
                } else {
                    for y in yields {
                        layout.add(y);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(layout)
}

fn projected_names(body: &ProjectionBody) -> Vec<String> {
    body.items.iter().map(Projection::header_name).collect()
}

// ---------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------

struct PlanBuilder<'a> {
    graph: &'a Graph,
}

/// Mutable build state for one segment
struct Segment {
    layout: Layout,
    chain: Option<BoxedOperator>,
    /// aliases produced by ops built so far
    bound: HashSet<String>,
}

impl<'a> PlanBuilder<'a> {
    fn build(&mut self, query: &Query) -> QueryResult<ExecutionPlan> {
        let specs = split_segments(query);

        // fix every segment's layout up front; segment i+1's width
        // decides where segment i parks its hidden ORDER BY keys
        let mut layouts = Vec::with_capacity(specs.len());
        let mut carried: Vec<String> = Vec::new();
        for spec in &specs {
            layouts.push(layout_segment(&carried, spec.clauses)?);
            carried = spec.body.map(projected_names).unwrap_or_default();
        }

        let mut header = Vec::new();
        let mut returns_rows = false;
        let mut chain: Option<BoxedOperator> = None;
        let mut carried: Vec<String> = Vec::new();

        for (i, spec) in specs.iter().enumerate() {
            let mut segment = Segment {
                layout: layouts[i].clone(),
                chain: chain.take(),
                bound: carried.iter().cloned().collect(),
            };
            for clause in spec.clauses {
                self.plan_clause(&mut segment, clause)?;
            }
            match spec.body {
                Some(body) => {
                    let next_width = layouts.get(i + 1).map_or(body.items.len(), |l| l.width);
                    let (new_chain, names) =
                        self.plan_projection(segment, body, next_width, spec.is_return)?;
                    chain = Some(new_chain);
                    if spec.is_return {
                        header = names;
                        returns_rows = true;
                        carried = Vec::new();
                    } else {
                        carried = names;
                    }
                }
                None => {
                    chain = segment.chain;
                    carried = Vec::new();
                }
            }
        }

        let root = chain.ok_or_else(|| QueryError::Internal("empty plan".to_string()))?;
        debug!(returns_rows, header = ?header, "execution plan built");
        Ok(ExecutionPlan {
            root,
            header,
            returns_rows,
        })
    }

    fn plan_clause(&mut self, segment: &mut Segment, clause: &Clause) -> QueryResult<()> {
        match clause {
            Clause::Match {
                optional,
                patterns,
                filter,
            } => self.plan_match(segment, *optional, patterns, filter.as_ref()),
            Clause::Create { patterns } => self.plan_create(segment, patterns),
            Clause::Merge { pattern } => self.plan_merge(segment, pattern),
            Clause::Set { items } => {
                let child = take_chain(segment)?;
                let compiled = items
                    .iter()
                    .map(|item| {
                        Ok((
                            segment.layout.slot(&item.alias)?,
                            item.key.clone(),
                            ExprNode::build(&item.expr, &segment.layout.slots)?,
                        ))
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                segment.chain = Some(Box::new(UpdateOp::new(child, compiled)));
                Ok(())
            }
            Clause::Delete { aliases, detach } => {
                let child = take_chain(segment)?;
                let slots = aliases
                    .iter()
                    .map(|a| segment.layout.slot(a))
                    .collect::<QueryResult<Vec<_>>>()?;
                segment.chain = Some(Box::new(DeleteOp::new(child, slots, *detach)));
                Ok(())
            }
            Clause::Unwind { expr, alias } => {
                let expr = ExprNode::build(expr, &segment.layout.slots)?;
                let slot = segment.layout.slot(alias)?;
                let child = segment.chain.take();
                segment.bound.insert(alias.clone());
                segment.chain = Some(Box::new(Unwind::new(
                    child,
                    expr,
                    slot,
                    segment.layout.width,
                )));
                Ok(())
            }
            Clause::Call {
                procedure,
                args,
                yields,
            } => {
                let desc = procedures::lookup(procedure).ok_or_else(|| {
                    QueryError::Internal(format!("unknown procedure '{procedure}'"))
                })?;
                let args = args
                    .iter()
                    .map(|e| ExprNode::build(e, &segment.layout.slots))
                    .collect::<QueryResult<Vec<_>>>()?;
                let names: Vec<String> = if yields.is_empty() {
                    desc.outputs.iter().map(|(n, _)| (*n).to_string()).collect()
                } else {
                    yields.clone()
                };
                let mut yield_slots = Vec::new();
                for name in &names {
                    let column = desc
                        .outputs
                        .iter()
                        .position(|(n, _)| n == name)
                        .ok_or_else(|| {
                            QueryError::Internal(format!("unknown yield '{name}'"))
                        })?;
                    yield_slots.push((column, segment.layout.slot(name)?));
                    segment.bound.insert(name.clone());
                }
                let child = segment.chain.take();
                segment.chain = Some(Box::new(ProcedureCall::new(
                    child,
                    procedure.clone(),
                    args,
                    yield_slots,
                    segment.layout.width,
                )));
                Ok(())
            }
            Clause::With(_) | Clause::Return(_) => {
                Err(QueryError::Internal("projection clause in body".to_string()))
            }
            Clause::CreateIndex { .. } | Clause::DropIndex { .. } => Err(QueryError::Internal(
                "index clauses are handled outside the plan".to_string(),
            )),
        }
    }

    // -----------------------------------------------------------------
    // MATCH
    // -----------------------------------------------------------------

    fn plan_match(
        &mut self,
        segment: &mut Segment,
        optional: bool,
        patterns: &[PathPattern],
        filter: Option<&Expr>,
    ) -> QueryResult<()> {
        if optional {
            return self.plan_optional_match(segment, patterns, filter);
        }
        let qg = QueryGraph::build(patterns);
        let groups = planner::plan_match(&qg, &segment.bound);
        for group in groups {
            let mut sub: Option<BoxedOperator> = None;
            let mut sub_bound: HashSet<String> = HashSet::new();
            for chain_plan in group {
                let attach_upstream = matches!(
                    &chain_plan.entry,
                    EntryPoint::Bound { alias } if segment.bound.contains(alias)
                );
                if attach_upstream && sub.is_none() {
                    sub = segment.chain.take();
                }
                sub = Some(self.build_chain_ops(
                    segment,
                    sub,
                    &chain_plan.entry,
                    &chain_plan.traversals,
                    patterns,
                    filter,
                    &mut sub_bound,
                )?);
            }
            let sub = sub.ok_or_else(|| QueryError::Internal("empty match group".to_string()))?;
            segment.chain = Some(match segment.chain.take() {
                None => sub,
                Some(upstream) => {
                    let right_slots = sub_bound
                        .iter()
                        .map(|a| segment.layout.slot(a))
                        .collect::<QueryResult<Vec<_>>>()?;
                    Box::new(CartesianProduct::new(upstream, sub, right_slots))
                }
            });
            for alias in sub_bound {
                segment.bound.insert(alias);
            }
        }
        if let Some(filter) = filter {
            let predicate = ExprNode::build(filter, &segment.layout.slots)?;
            let child = take_chain(segment)?;
            segment.chain = Some(Box::new(Filter::new(child, predicate)));
        }
        Ok(())
    }

    fn plan_optional_match(
        &mut self,
        segment: &mut Segment,
        patterns: &[PathPattern],
        filter: Option<&Expr>,
    ) -> QueryResult<()> {
        let qg = QueryGraph::build(patterns);
        let groups = planner::plan_match(&qg, &segment.bound);
        let upstream = segment.chain.take();
        let argument: Option<ArgumentSlot> = upstream
            .as_ref()
            .map(|_| Rc::new(RefCell::new(None)) as ArgumentSlot);

        let mut sub: Option<BoxedOperator> = argument
            .as_ref()
            .map(|arg| Box::new(Argument::new(Rc::clone(arg))) as BoxedOperator);
        let mut sub_bound: HashSet<String> = HashSet::new();
        for group in groups {
            for chain_plan in group {
                sub = Some(self.build_chain_ops(
                    segment,
                    sub,
                    &chain_plan.entry,
                    &chain_plan.traversals,
                    patterns,
                    filter,
                    &mut sub_bound,
                )?);
            }
        }
        let mut sub =
            sub.ok_or_else(|| QueryError::Internal("empty optional match".to_string()))?;
        if let Some(filter) = filter {
            let predicate = ExprNode::build(filter, &segment.layout.slots)?;
            sub = Box::new(Filter::new(sub, predicate));
        }
        segment.chain = Some(Box::new(Optional::new(
            upstream,
            sub,
            argument,
            segment.layout.width,
        )));
        for alias in sub_bound {
            segment.bound.insert(alias);
        }
        Ok(())
    }

    /// Entry + traversal descriptors -> operator chain; also applies
    /// inline property filters for the aliases this chain binds
    fn build_chain_ops(
        &mut self,
        segment: &Segment,
        upstream: Option<BoxedOperator>,
        entry: &EntryPoint,
        traversals: &[TraversalDescriptor],
        patterns: &[PathPattern],
        filter: Option<&Expr>,
        sub_bound: &mut HashSet<String>,
    ) -> QueryResult<BoxedOperator> {
        let mut chain: BoxedOperator = match entry {
            EntryPoint::Bound { alias } => {
                sub_bound.insert(alias.clone());
                let base = upstream.ok_or_else(|| {
                    QueryError::Internal(format!("bound entry '{alias}' without upstream"))
                })?;
                // a rebound alias must still satisfy this pattern's
                // labels
                add_label_filters(base, segment, patterns, alias, None)?
            }
            EntryPoint::Scan { alias, labels } => {
                let slot = segment.layout.slot(alias)?;
                let scan = self.build_scan(segment, alias, labels, slot, patterns, filter)?;
                sub_bound.insert(alias.clone());
                let base = match upstream {
                    None => scan,
                    Some(up) => Box::new(CartesianProduct::new(up, scan, vec![slot])),
                };
                // the scan guarantees its primary label only
                add_label_filters(base, segment, patterns, alias, labels.first())?
            }
        };
        if let EntryPoint::Scan { alias, .. } | EntryPoint::Bound { alias } = entry {
            if let Some(filter) = inline_props_filter(patterns, alias) {
                let predicate = ExprNode::build(&filter, &segment.layout.slots)?;
                chain = Box::new(Filter::new(chain, predicate));
            }
        }

        for desc in traversals {
            let src_slot = segment.layout.slot(&desc.src_alias)?;
            let dst_slot = segment.layout.slot(&desc.dst_alias)?;
            let edge_slot = match &desc.edge_alias {
                Some(alias) if !is_anonymous(alias) || edge_has_props(patterns, alias) => {
                    Some(segment.layout.slot(alias)?)
                }
                _ => None,
            };
            let dst_already_bound =
                sub_bound.contains(&desc.dst_alias) || segment.bound.contains(&desc.dst_alias);
            chain = if desc.is_variable_length() {
                Box::new(CondVarLenTraverse::new(
                    chain,
                    desc.clone(),
                    src_slot,
                    dst_slot,
                ))
            } else if dst_already_bound {
                Box::new(ExpandInto::new(
                    chain,
                    desc.clone(),
                    src_slot,
                    dst_slot,
                    edge_slot,
                ))
            } else {
                Box::new(CondTraverse::new(
                    chain,
                    desc.clone(),
                    src_slot,
                    dst_slot,
                    edge_slot,
                ))
            };
            sub_bound.insert(desc.dst_alias.clone());
            if let (Some(alias), Some(_)) = (&desc.edge_alias, edge_slot) {
                sub_bound.insert(alias.clone());
                if let Some(filter) = inline_edge_props_filter(patterns, alias) {
                    let predicate = ExprNode::build(&filter, &segment.layout.slots)?;
                    chain = Box::new(Filter::new(chain, predicate));
                }
            }
            if !dst_already_bound {
                chain = add_label_filters(chain, segment, patterns, &desc.dst_alias, None)?;
                if let Some(filter) = inline_props_filter(patterns, &desc.dst_alias) {
                    let predicate = ExprNode::build(&filter, &segment.layout.slots)?;
                    chain = Box::new(Filter::new(chain, predicate));
                }
            }
        }
        Ok(chain)
    }

    /// Pick the scan flavor for a chain entry: an index scan when a
    /// usable (label, property) predicate exists (inline equality or
    /// a WHERE comparison against a literal), then a label scan, then
    /// the all-node scan
    fn build_scan(
        &mut self,
        segment: &Segment,
        alias: &str,
        labels: &[String],
        slot: usize,
        patterns: &[PathPattern],
        filter: Option<&Expr>,
    ) -> QueryResult<BoxedOperator> {
        for label in labels {
            let Some(label_id) = self.graph.schema().label_id(label) else {
                continue;
            };
            let mut candidates: Vec<(String, IndexOp, crate::value::Value)> = Vec::new();
            for node in patterns.iter().flat_map(pattern_nodes) {
                if node.alias.as_deref() != Some(alias) {
                    continue;
                }
                for (key, expr) in &node.props {
                    if let Expr::Literal(value) = expr {
                        candidates.push((key.clone(), IndexOp::Eq, value.clone()));
                    }
                }
            }
            if let Some(filter) = filter {
                collect_filter_predicates(filter, alias, &mut candidates);
            }
            for (key, op, value) in candidates {
                let Some(prop_id) = self.graph.schema().prop_key_id(&key) else {
                    continue;
                };
                if self.graph.index_for(label_id, prop_id).is_some() {
                    return Ok(Box::new(NodeByIndexScan::new(
                        label.clone(),
                        key,
                        op,
                        value,
                        slot,
                        segment.layout.width,
                    )));
                }
            }
        }
        if let Some(label) = labels.first() {
            return Ok(Box::new(NodeByLabelScan::new(
                label.clone(),
                slot,
                segment.layout.width,
            )));
        }
        Ok(Box::new(AllNodeScan::new(slot, segment.layout.width)))
    }

    // -----------------------------------------------------------------
    // CREATE / MERGE
    // -----------------------------------------------------------------

    fn compile_pattern_spec(
        &mut self,
        segment: &Segment,
        pattern: &PathPattern,
    ) -> QueryResult<PatternSpec> {
        let mut spec = PatternSpec::default();
        let push_node = |node: &NodePattern, spec: &mut PatternSpec| -> QueryResult<()> {
            let alias = node.alias.as_deref().unwrap_or_default();
            let props = node
                .props
                .iter()
                .map(|(k, e)| Ok((k.clone(), ExprNode::build(e, &segment.layout.slots)?)))
                .collect::<QueryResult<Vec<_>>>()?;
            spec.nodes.push(EntitySpec {
                slot: segment.layout.slot(alias)?,
                labels: node.labels.clone(),
                props,
            });
            Ok(())
        };
        push_node(&pattern.start, &mut spec)?;
        let mut prev_alias = pattern.start.alias.clone().unwrap_or_default();
        for (edge, node) in &pattern.steps {
            push_node(node, &mut spec)?;
            let node_alias = node.alias.clone().unwrap_or_default();
            let edge_alias = edge.alias.clone().unwrap_or_default();
            let (src_alias, dst_alias) = match edge.direction {
                Direction::Incoming => (node_alias.clone(), prev_alias.clone()),
                _ => (prev_alias.clone(), node_alias.clone()),
            };
            let props = edge
                .props
                .iter()
                .map(|(k, e)| Ok((k.clone(), ExprNode::build(e, &segment.layout.slots)?)))
                .collect::<QueryResult<Vec<_>>>()?;
            spec.edges.push(EdgeSpec {
                slot: segment.layout.slot(&edge_alias)?,
                rel_type: edge.types.first().cloned().unwrap_or_default(),
                src_slot: segment.layout.slot(&src_alias)?,
                dst_slot: segment.layout.slot(&dst_alias)?,
                props,
            });
            prev_alias = node_alias;
        }
        Ok(spec)
    }

    fn plan_create(
        &mut self,
        segment: &mut Segment,
        patterns: &[PathPattern],
    ) -> QueryResult<()> {
        let specs = patterns
            .iter()
            .map(|p| self.compile_pattern_spec(segment, p))
            .collect::<QueryResult<Vec<_>>>()?;
        for pattern in patterns {
            for alias in pattern.aliases() {
                segment.bound.insert(alias.to_string());
            }
        }
        let child = segment.chain.take();
        segment.chain = Some(Box::new(CreateOp::new(child, specs, segment.layout.width)));
        Ok(())
    }

    fn plan_merge(&mut self, segment: &mut Segment, pattern: &PathPattern) -> QueryResult<()> {
        let upstream = segment.chain.take();
        let argument: Option<ArgumentSlot> = upstream
            .as_ref()
            .map(|_| Rc::new(RefCell::new(None)) as ArgumentSlot);
        let leaf: Option<BoxedOperator> = argument
            .as_ref()
            .map(|arg| Box::new(Argument::new(Rc::clone(arg))) as BoxedOperator);

        let qg = QueryGraph::build(std::slice::from_ref(pattern));
        let groups = planner::plan_match(&qg, &segment.bound);
        let mut sub = leaf;
        let mut sub_bound = HashSet::new();
        for group in groups {
            for chain_plan in group {
                sub = Some(self.build_chain_ops(
                    segment,
                    sub,
                    &chain_plan.entry,
                    &chain_plan.traversals,
                    std::slice::from_ref(pattern),
                    None,
                    &mut sub_bound,
                )?);
            }
        }
        let sub = sub.ok_or_else(|| QueryError::Internal("empty merge plan".to_string()))?;
        let spec = self.compile_pattern_spec(segment, pattern)?;
        for alias in pattern.aliases() {
            segment.bound.insert(alias.to_string());
        }
        segment.chain = Some(Box::new(MergeOp::new(
            upstream,
            sub,
            argument,
            spec,
            segment.layout.width,
        )));
        Ok(())
    }

    // -----------------------------------------------------------------
    // Projection segments
    // -----------------------------------------------------------------

    /// Build the Project/Aggregate + window chain for a WITH or
    /// RETURN. Output records are `next_width` wide (the following
    /// segment's layout) with hidden ORDER BY keys stashed after it.
    fn plan_projection(
        &mut self,
        mut segment: Segment,
        body: &ProjectionBody,
        next_width: usize,
        is_return: bool,
    ) -> QueryResult<(BoxedOperator, Vec<String>)> {
        let visible = body.items.len();
        let order_keys = order_plan(body);
        let hidden_count = order_keys
            .iter()
            .filter(|k| matches!(k, OrderKey::Hidden { .. }))
            .count();
        let hidden_base = next_width.max(visible);
        let out_width = hidden_base + hidden_count;

        // constant-only projections (RETURN 1) have no upstream chain
        if segment.chain.is_none() {
            segment.chain = Some(Box::new(Once::new()));
        }
        let child = take_chain(&mut segment)?;

        // projection items followed by the hidden key expressions;
        // hidden slots start at hidden_base, so the projection ops
        // place item i at slot i and hidden j at hidden_base + j
        let mut exprs: Vec<(Expr, usize)> = body
            .items
            .iter()
            .enumerate()
            .map(|(i, p)| (p.expr.clone(), i))
            .collect();
        let mut hidden_slot = hidden_base;
        for key in &order_keys {
            if let OrderKey::Hidden { expr, .. } = key {
                exprs.push((expr.clone(), hidden_slot));
                hidden_slot += 1;
            }
        }
        let aggregated = exprs.iter().any(|(e, _)| e.contains_aggregate());
        let placement: Vec<usize> = exprs.iter().map(|(_, slot)| *slot).collect();

        let mut chain: BoxedOperator = if aggregated {
            let compiled = exprs
                .iter()
                .map(|(expr, _)| {
                    Ok(ProjectionItem {
                        expr: ExprNode::build(expr, &segment.layout.slots)?,
                        is_aggregate: expr.contains_aggregate(),
                    })
                })
                .collect::<QueryResult<Vec<_>>>()?;
            Box::new(AggregateOp::new(child, compiled, placement, out_width))
        } else {
            let compiled = exprs
                .iter()
                .map(|(expr, _)| ExprNode::build(expr, &segment.layout.slots))
                .collect::<QueryResult<Vec<_>>>()?;
            Box::new(Project::new(child, compiled, placement, out_width))
        };

        if body.distinct {
            chain = Box::new(Distinct::new(chain, visible));
        }
        if !order_keys.is_empty() {
            let mut keys = Vec::new();
            let mut hidden_cursor = hidden_base;
            for key in &order_keys {
                match key {
                    OrderKey::Item { index, descending } => keys.push((*index, *descending)),
                    OrderKey::Hidden { descending, .. } => {
                        keys.push((hidden_cursor, *descending));
                        hidden_cursor += 1;
                    }
                }
            }
            chain = Box::new(Sort::new(chain, keys));
        }
        if let Some(skip) = body.skip {
            chain = Box::new(Skip::new(chain, skip as usize));
        }
        if let Some(limit) = body.limit {
            chain = Box::new(Limit::new(chain, limit as usize));
        }

        let names = projected_names(body);
        if is_return {
            chain = Box::new(ProduceResults::new(chain, visible));
        }
        Ok((chain, names))
    }
}

/// Single empty-record source for constant-only projections
#[derive(Debug)]
struct Once {
    done: bool,
}

impl Once {
    fn new() -> Self {
        Once { done: false }
    }
}

impl Operator for Once {
    fn name(&self) -> &'static str {
        "Once"
    }
    fn open(&mut self, _ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.done = false;
        Ok(())
    }
    fn consume(&mut self, _ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(Record::new(0)))
    }
    fn reset(&mut self) -> QueryResult<()> {
        self.done = false;
        Ok(())
    }
}

/// ORDER BY keys resolved against the projection: either an existing
/// item slot, or a hidden trailing slot computed alongside the items
#[derive(Debug, Clone)]
enum OrderKey {
    Item { index: usize, descending: bool },
    Hidden { expr: Expr, descending: bool },
}

fn order_plan(body: &ProjectionBody) -> Vec<OrderKey> {
    body.order_by
        .iter()
        .map(|order| {
            // an ORDER BY expression matching a projection item (by
            // alias or by text) sorts on that item's slot
            let found = body.items.iter().position(|item| {
                if let (Expr::Ident(name), Some(alias)) = (&order.expr, &item.alias) {
                    if name == alias {
                        return true;
                    }
                }
                item.expr.display_text() == order.expr.display_text()
            });
            match found {
                Some(index) => OrderKey::Item {
                    index,
                    descending: order.descending,
                },
                None => OrderKey::Hidden {
                    expr: order.expr.clone(),
                    descending: order.descending,
                },
            }
        })
        .collect()
}

fn take_chain(segment: &mut Segment) -> QueryResult<BoxedOperator> {
    segment
        .chain
        .take()
        .ok_or_else(|| QueryError::Internal("operator requires an upstream chain".to_string()))
}

fn pattern_nodes(pattern: &PathPattern) -> impl Iterator<Item = &NodePattern> {
    std::iter::once(&pattern.start).chain(pattern.steps.iter().map(|(_, n)| n))
}

fn pattern_edges(pattern: &PathPattern) -> impl Iterator<Item = &EdgePattern> {
    pattern.steps.iter().map(|(e, _)| e)
}

fn edge_has_props(patterns: &[PathPattern], alias: &str) -> bool {
    patterns
        .iter()
        .flat_map(pattern_edges)
        .any(|e| e.alias.as_deref() == Some(alias) && !e.props.is_empty())
}

/// Conjunction of `alias.key = value` over every inline property the
/// patterns attach to this node alias
fn inline_props_filter(patterns: &[PathPattern], alias: &str) -> Option<Expr> {
    let conjuncts: Vec<Expr> = patterns
        .iter()
        .flat_map(pattern_nodes)
        .filter(|n| n.alias.as_deref() == Some(alias))
        .flat_map(|n| n.props.iter())
        .map(|(key, value)| prop_eq(alias, key, value))
        .collect();
    fold_and(conjuncts)
}

fn inline_edge_props_filter(patterns: &[PathPattern], alias: &str) -> Option<Expr> {
    let conjuncts: Vec<Expr> = patterns
        .iter()
        .flat_map(pattern_edges)
        .filter(|e| e.alias.as_deref() == Some(alias))
        .flat_map(|e| e.props.iter())
        .map(|(key, value)| prop_eq(alias, key, value))
        .collect();
    fold_and(conjuncts)
}

/// Wrap the chain in label-test filters for every pattern label on
/// this alias that the scan (if any) did not already guarantee
fn add_label_filters(
    mut chain: BoxedOperator,
    segment: &Segment,
    patterns: &[PathPattern],
    alias: &str,
    guaranteed: Option<&String>,
) -> QueryResult<BoxedOperator> {
    let slot = segment.layout.slot(alias)?;
    let mut seen: Vec<&String> = Vec::new();
    for node in patterns.iter().flat_map(pattern_nodes) {
        if node.alias.as_deref() != Some(alias) {
            continue;
        }
        for label in &node.labels {
            if Some(label) == guaranteed || seen.contains(&label) {
                continue;
            }
            seen.push(label);
            chain = Box::new(Filter::new(
                chain,
                ExprNode::HasLabel {
                    slot,
                    label: label.clone(),
                },
            ));
        }
    }
    Ok(chain)
}

/// Walk the top-level AND conjuncts of a WHERE expression collecting
/// `alias.key <cmp> literal` predicates an index scan can serve
fn collect_filter_predicates(
    filter: &Expr,
    alias: &str,
    out: &mut Vec<(String, IndexOp, crate::value::Value)>,
) {
    match filter {
        Expr::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } => {
            collect_filter_predicates(lhs, alias, out);
            collect_filter_predicates(rhs, alias, out);
        }
        Expr::Binary { op, lhs, rhs } => {
            let index_op = match op {
                BinaryOp::Eq => IndexOp::Eq,
                BinaryOp::Lt => IndexOp::Lt,
                BinaryOp::Le => IndexOp::Le,
                BinaryOp::Gt => IndexOp::Gt,
                BinaryOp::Ge => IndexOp::Ge,
                _ => return,
            };
            match (lhs.as_ref(), rhs.as_ref()) {
                (Expr::Property { alias: a, key }, Expr::Literal(v)) if a == alias => {
                    out.push((key.clone(), index_op, v.clone()));
                }
                (Expr::Literal(v), Expr::Property { alias: a, key }) if a == alias => {
                    // flip the comparison around the literal
                    let flipped = match index_op {
                        IndexOp::Lt => IndexOp::Gt,
                        IndexOp::Le => IndexOp::Ge,
                        IndexOp::Gt => IndexOp::Lt,
                        IndexOp::Ge => IndexOp::Le,
                        IndexOp::Eq => IndexOp::Eq,
                    };
                    out.push((key.clone(), flipped, v.clone()));
                }
                _ => {}
            }
        }
        _ => {}
    }
}

fn prop_eq(alias: &str, key: &str, value: &Expr) -> Expr {
    Expr::Binary {
        op: BinaryOp::Eq,
        lhs: Box::new(Expr::Property {
            alias: alias.to_string(),
            key: key.to_string(),
        }),
        rhs: Box::new(value.clone()),
    }
}

fn fold_and(mut conjuncts: Vec<Expr>) -> Option<Expr> {
    let mut expr = conjuncts.pop()?;
    while let Some(next) = conjuncts.pop() {
        expr = Expr::Binary {
            op: BinaryOp::And,
            lhs: Box::new(next),
            rhs: Box::new(expr),
        };
    }
    Some(expr)
}
