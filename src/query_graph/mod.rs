//! # Query Graph
//!
//! In-memory graph of pattern entities, built from the MATCH
//! patterns of one clause. Repeated aliases across chains merge into
//! a single entity (accumulating labels and inline-filter evidence),
//! and chains sharing an alias fall into the same connected
//! component, which is what decides cartesian-product boundaries
//! during planning.

use crate::ast::{Direction, HopRange, PathPattern};
use std::collections::HashMap;

/// A pattern node after alias merging
#[derive(Debug, Clone, Default)]
pub struct QGNode {
    pub alias: String,
    pub labels: Vec<String>,
    /// Any mention carried an inline property map
    pub has_inline_filter: bool,
}

/// A pattern edge, endpoints by alias
#[derive(Debug, Clone)]
pub struct QGEdge {
    pub alias: Option<String>,
    pub src: String,
    pub dst: String,
    pub types: Vec<String>,
    pub direction: Direction,
    pub hops: Option<HopRange>,
}

/// One node–edge–...–node chain, aliases only
#[derive(Debug, Clone)]
pub struct Chain {
    /// Node aliases in pattern order
    pub nodes: Vec<String>,
    /// Edge indices into the query graph, one per step
    pub edges: Vec<usize>,
}

/// The merged pattern graph for one MATCH clause
#[derive(Debug, Default)]
pub struct QueryGraph {
    nodes: Vec<QGNode>,
    by_alias: HashMap<String, usize>,
    pub edges: Vec<QGEdge>,
    pub chains: Vec<Chain>,
}

impl QueryGraph {
    /// Build from the patterns of one MATCH clause. Anonymous
    /// entities must have been assigned synthetic aliases already.
    pub fn build(patterns: &[PathPattern]) -> Self {
        let mut qg = QueryGraph::default();
        for pattern in patterns {
            let mut chain = Chain {
                nodes: Vec::new(),
                edges: Vec::new(),
            };
            let start_alias = pattern.start.alias.clone().unwrap_or_default();
            qg.merge_node(
                &start_alias,
                &pattern.start.labels,
                !pattern.start.props.is_empty(),
            );
            chain.nodes.push(start_alias.clone());
            let mut prev = start_alias;
            for (edge, node) in &pattern.steps {
                let node_alias = node.alias.clone().unwrap_or_default();
                qg.merge_node(&node_alias, &node.labels, !node.props.is_empty());
                let edge_idx = qg.edges.len();
                qg.edges.push(QGEdge {
                    alias: edge.alias.clone(),
                    src: prev.clone(),
                    dst: node_alias.clone(),
                    types: edge.types.clone(),
                    direction: edge.direction,
                    hops: edge.hops,
                });
                chain.edges.push(edge_idx);
                chain.nodes.push(node_alias.clone());
                prev = node_alias;
            }
            qg.chains.push(chain);
        }
        qg
    }

    fn merge_node(&mut self, alias: &str, labels: &[String], has_props: bool) {
        let idx = match self.by_alias.get(alias) {
            Some(i) => *i,
            None => {
                let i = self.nodes.len();
                self.nodes.push(QGNode {
                    alias: alias.to_string(),
                    ..QGNode::default()
                });
                self.by_alias.insert(alias.to_string(), i);
                i
            }
        };
        let node = &mut self.nodes[idx];
        for label in labels {
            if !node.labels.contains(label) {
                node.labels.push(label.clone());
            }
        }
        node.has_inline_filter |= has_props;
    }

    pub fn node(&self, alias: &str) -> Option<&QGNode> {
        self.by_alias.get(alias).map(|i| &self.nodes[*i])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Chain indices grouped into connected components (chains
    /// sharing a node alias connect)
    pub fn components(&self) -> Vec<Vec<usize>> {
        let n = self.chains.len();
        let mut component: Vec<Option<usize>> = vec![None; n];
        let mut next = 0;
        for i in 0..n {
            if component[i].is_some() {
                continue;
            }
            // flood from chain i over shared aliases
            let id = next;
            next += 1;
            component[i] = Some(id);
            let mut changed = true;
            while changed {
                changed = false;
                for j in 0..n {
                    if component[j].is_some() {
                        continue;
                    }
                    let shares = self.chains[j].nodes.iter().any(|a| {
                        component
                            .iter()
                            .zip(self.chains.iter())
                            .any(|(c, ch)| *c == Some(id) && ch.nodes.contains(a))
                    });
                    if shares {
                        component[j] = Some(id);
                        changed = true;
                    }
                }
            }
        }
        let mut out: Vec<Vec<usize>> = vec![Vec::new(); next];
        for (i, c) in component.into_iter().enumerate() {
            if let Some(id) = c {
                out[id].push(i);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Clause;
    use crate::parser::parse;

    fn patterns(src: &str) -> Vec<PathPattern> {
        let q = parse(src).unwrap();
        let Clause::Match { patterns, .. } = &q.clauses[0] else {
            panic!("expected MATCH");
        };
        patterns.clone()
    }

    #[test]
    fn test_alias_merging_accumulates_labels() {
        let p = patterns("MATCH (a:Person)-[:K]->(b), (a:Actor {x: 1})-[:K]->(c) RETURN a");
        let qg = QueryGraph::build(&p);
        let a = qg.node("a").unwrap();
        assert_eq!(a.labels, vec!["Person".to_string(), "Actor".to_string()]);
        assert!(a.has_inline_filter);
        assert_eq!(qg.node_count(), 3);
        assert_eq!(qg.edges.len(), 2);
    }

    #[test]
    fn test_components_split_disconnected_chains() {
        let p = patterns("MATCH (a)-[:K]->(b), (c)-[:K]->(d) RETURN a");
        let qg = QueryGraph::build(&p);
        assert_eq!(qg.components().len(), 2);
    }

    #[test]
    fn test_components_join_on_shared_alias() {
        let p = patterns("MATCH (a)-[:K]->(b), (b)-[:K]->(c) RETURN a");
        let qg = QueryGraph::build(&p);
        assert_eq!(qg.components().len(), 1);
    }
}
