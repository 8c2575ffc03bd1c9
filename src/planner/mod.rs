//! # Traversal Planner
//!
//! Turns the query graph of a MATCH clause into ordered traversal
//! descriptors:
//!
//! 1. chains written mostly right-to-left are reversed node-wise,
//!    inverting each edge, so the common walk direction matches the
//!    stored matrices;
//! 2. the entry point prefers a scan anchor (labeled node or inline
//!    property filter), then an alias bound by a prior clause, and
//!    ties break toward fewer transposed steps;
//! 3. walking against a stored edge direction records a transpose
//!    flag; nothing is materialized here.
//!
//! Fixed-length steps become one masked multiply each; `*min..max`
//! steps become frontier iterations in the variable-length operator.

use crate::ast::Direction;
use crate::query_graph::{Chain, QueryGraph};
use std::collections::HashSet;

/// One planned traversal step
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalDescriptor {
    pub src_alias: String,
    pub dst_alias: String,
    /// Some = bind matched edge ids to this slot (integer matrix
    /// path); None = existence-only traversal
    pub edge_alias: Option<String>,
    /// Relation type alternatives; empty = any type
    pub types: Vec<String>,
    /// Walk against the stored direction (matrix transposed)
    pub transpose: bool,
    /// Undirected pattern edge: both orientations union
    pub bidirectional: bool,
    pub min_hops: u32,
    /// None = unbounded
    pub max_hops: Option<u32>,
}

impl TraversalDescriptor {
    pub fn is_variable_length(&self) -> bool {
        !(self.min_hops == 1 && self.max_hops == Some(1))
    }
}

/// How a chain's first alias gets into the record
#[derive(Debug, Clone, PartialEq)]
pub enum EntryPoint {
    /// Alias already bound by a prior clause or chain
    Bound { alias: String },
    /// Needs a scan; the plan builder picks index / label / all-node
    Scan { alias: String, labels: Vec<String> },
}

/// One chain's plan: entry plus its traversal steps in order
#[derive(Debug, Clone)]
pub struct ChainPlan {
    pub entry: EntryPoint,
    pub traversals: Vec<TraversalDescriptor>,
}

/// Plan every chain of the clause.
///
/// Returns one group per connected component; chains within a group
/// extend the same record stream, groups combine via cartesian
/// product.
pub fn plan_match(qg: &QueryGraph, bound: &HashSet<String>) -> Vec<Vec<ChainPlan>> {
    let mut out = Vec::new();
    for component in qg.components() {
        let mut group = Vec::new();
        let mut component_bound: HashSet<String> = bound.clone();
        for chain_idx in component {
            let chain = &qg.chains[chain_idx];
            let plan = plan_chain(qg, chain, &component_bound);
            for alias in &chain.nodes {
                component_bound.insert(alias.clone());
            }
            group.push(plan);
        }
        out.push(group);
    }
    out
}

fn plan_chain(qg: &QueryGraph, chain: &Chain, bound: &HashSet<String>) -> ChainPlan {
    let chain = normalize_chain(qg, chain);

    // single lonely node: scan or reuse the binding
    if chain.steps.is_empty() {
        let alias = chain.nodes[0].clone();
        let entry = if bound.contains(&alias) {
            EntryPoint::Bound { alias }
        } else {
            let labels = qg.node(&alias).map(|n| n.labels.clone()).unwrap_or_default();
            EntryPoint::Scan { alias, labels }
        };
        return ChainPlan {
            entry,
            traversals: Vec::new(),
        };
    }

    let entry_idx = select_entry(qg, &chain, bound);
    let entry_alias = chain.nodes[entry_idx].clone();
    let entry = if bound.contains(&entry_alias) {
        EntryPoint::Bound { alias: entry_alias }
    } else {
        let labels = qg
            .node(&entry_alias)
            .map(|n| n.labels.clone())
            .unwrap_or_default();
        EntryPoint::Scan {
            alias: entry_alias,
            labels,
        }
    };

    let mut traversals = Vec::new();
    // forward arm from the entry toward the chain's end
    for i in entry_idx..chain.steps.len() {
        traversals.push(make_descriptor(qg, &chain, i, true));
    }
    // backward arm from the entry toward the chain's start
    for i in (0..entry_idx).rev() {
        traversals.push(make_descriptor(qg, &chain, i, false));
    }
    ChainPlan { entry, traversals }
}

/// A chain with step orientation resolved against node order
struct NormChain {
    nodes: Vec<String>,
    /// (edge index, direction as stored relative to walk order)
    steps: Vec<(usize, Direction)>,
}

/// Rule 1: if more than half the steps are written right-to-left,
/// reverse the chain node-wise and invert every edge
fn normalize_chain(qg: &QueryGraph, chain: &Chain) -> NormChain {
    let incoming = chain
        .edges
        .iter()
        .filter(|e| qg.edges[**e].direction == Direction::Incoming)
        .count();
    let reverse = incoming * 2 > chain.edges.len();

    if !reverse {
        NormChain {
            nodes: chain.nodes.clone(),
            steps: chain
                .edges
                .iter()
                .map(|e| (*e, qg.edges[*e].direction))
                .collect(),
        }
    } else {
        let nodes: Vec<String> = chain.nodes.iter().rev().cloned().collect();
        let steps = chain
            .edges
            .iter()
            .rev()
            .map(|e| {
                let dir = match qg.edges[*e].direction {
                    Direction::Outgoing => Direction::Incoming,
                    Direction::Incoming => Direction::Outgoing,
                    Direction::Both => Direction::Both,
                };
                (*e, dir)
            })
            .collect();
        NormChain { nodes, steps }
    }
}

/// Rule 2: anchors first, prior bindings second, fewest transposes on
/// ties
fn select_entry(qg: &QueryGraph, chain: &NormChain, bound: &HashSet<String>) -> usize {
    let mut best = 0;
    let mut best_key = (i32::MIN, i32::MIN);
    for (idx, alias) in chain.nodes.iter().enumerate() {
        let anchor = qg
            .node(alias)
            .map(|n| !n.labels.is_empty() || n.has_inline_filter)
            .unwrap_or(false);
        let score = if anchor {
            2
        } else if bound.contains(alias) {
            1
        } else {
            0
        };
        let transposes = transpose_count(chain, idx) as i32;
        let key = (score, -transposes);
        if key > best_key {
            best_key = key;
            best = idx;
        }
    }
    best
}

fn transpose_count(chain: &NormChain, entry_idx: usize) -> usize {
    let mut count = 0;
    for i in entry_idx..chain.steps.len() {
        if step_transposed(chain.steps[i].1, true) {
            count += 1;
        }
    }
    for i in 0..entry_idx {
        if step_transposed(chain.steps[i].1, false) {
            count += 1;
        }
    }
    count
}

/// Walking step `i` forward goes nodes[i] -> nodes[i+1]; backward
/// goes nodes[i+1] -> nodes[i]
fn step_transposed(dir: Direction, forward: bool) -> bool {
    match dir {
        Direction::Outgoing => !forward,
        Direction::Incoming => forward,
        Direction::Both => false,
    }
}

fn make_descriptor(
    qg: &QueryGraph,
    chain: &NormChain,
    step_idx: usize,
    forward: bool,
) -> TraversalDescriptor {
    let (edge_idx, dir) = chain.steps[step_idx];
    let edge = &qg.edges[edge_idx];
    let (src, dst) = if forward {
        (
            chain.nodes[step_idx].clone(),
            chain.nodes[step_idx + 1].clone(),
        )
    } else {
        (
            chain.nodes[step_idx + 1].clone(),
            chain.nodes[step_idx].clone(),
        )
    };
    let (min_hops, max_hops) = match edge.hops {
        None => (1, Some(1)),
        Some(range) => (range.min, range.max),
    };
    TraversalDescriptor {
        src_alias: src,
        dst_alias: dst,
        edge_alias: edge.alias.clone(),
        types: edge.types.clone(),
        transpose: step_transposed(dir, forward),
        bidirectional: dir == Direction::Both,
        min_hops,
        max_hops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Clause;
    use crate::parser::parse;

    fn plan(src: &str) -> Vec<Vec<ChainPlan>> {
        let q = parse(src).unwrap();
        let Clause::Match { patterns, .. } = &q.clauses[0] else {
            panic!("expected MATCH");
        };
        let qg = QueryGraph::build(patterns);
        plan_match(&qg, &HashSet::new())
    }

    #[test]
    fn test_forward_chain_no_transpose() {
        let plans = plan("MATCH (a:Person)-[:K]->(b)-[:K]->(c) RETURN a");
        let chain = &plans[0][0];
        assert!(matches!(&chain.entry, EntryPoint::Scan { alias, .. } if alias == "a"));
        assert_eq!(chain.traversals.len(), 2);
        assert!(chain.traversals.iter().all(|t| !t.transpose));
    }

    #[test]
    fn test_mostly_incoming_chain_reversed() {
        // both edges written right-to-left: the pattern is reversed,
        // so no step needs a transpose
        let plans = plan("MATCH (a)<-[:K]-(b)<-[:K]-(c:Person) RETURN a");
        let chain = &plans[0][0];
        assert!(matches!(&chain.entry, EntryPoint::Scan { alias, .. } if alias == "c"));
        let dirs: Vec<(&str, &str)> = chain
            .traversals
            .iter()
            .map(|t| (t.src_alias.as_str(), t.dst_alias.as_str()))
            .collect();
        assert_eq!(dirs, vec![("c", "b"), ("b", "a")]);
        assert!(chain.traversals.iter().all(|t| !t.transpose));
    }

    #[test]
    fn test_transpose_minimization_bound() {
        // one of three edges written backwards: at most one transpose
        let plans = plan("MATCH (a:L)-[:K]->(b)<-[:K]-(c)-[:K]->(d) RETURN a");
        let chain = &plans[0][0];
        let transposed = chain.traversals.iter().filter(|t| t.transpose).count();
        assert!(transposed * 2 <= chain.traversals.len());
    }

    #[test]
    fn test_labeled_anchor_preferred_over_plain_start() {
        let plans = plan("MATCH (a)-[:K]->(b:Person) RETURN a");
        let chain = &plans[0][0];
        assert!(matches!(&chain.entry, EntryPoint::Scan { alias, .. } if alias == "b"));
        // walking b -> a against the edge requires the transpose
        assert_eq!(chain.traversals.len(), 1);
        assert!(chain.traversals[0].transpose);
    }

    #[test]
    fn test_bound_alias_skips_scan() {
        let q = parse("MATCH (a)-[:K]->(b) RETURN a").unwrap();
        let Clause::Match { patterns, .. } = &q.clauses[0] else {
            panic!("expected MATCH");
        };
        let qg = QueryGraph::build(patterns);
        let mut bound = HashSet::new();
        bound.insert("a".to_string());
        let plans = plan_match(&qg, &bound);
        assert!(matches!(
            &plans[0][0].entry,
            EntryPoint::Bound { alias } if alias == "a"
        ));
    }

    #[test]
    fn test_varlen_descriptor_bounds() {
        let plans = plan("MATCH (a:Person)-[:K*2..3]->(z) RETURN z");
        let t = &plans[0][0].traversals[0];
        assert!(t.is_variable_length());
        assert_eq!((t.min_hops, t.max_hops), (2, Some(3)));
    }

    #[test]
    fn test_disconnected_components() {
        let plans = plan("MATCH (a:X)-[:K]->(b), (c:Y)-[:K]->(d) RETURN a");
        assert_eq!(plans.len(), 2);
    }

    #[test]
    fn test_shared_alias_second_chain_enters_bound() {
        let plans = plan("MATCH (a:X)-[:K]->(b), (b)-[:J]->(c) RETURN a");
        assert_eq!(plans.len(), 1);
        let group = &plans[0];
        assert_eq!(group.len(), 2);
        assert!(matches!(
            &group[1].entry,
            EntryPoint::Bound { alias } if alias == "b"
        ));
    }
}
