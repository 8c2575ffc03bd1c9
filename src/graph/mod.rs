//! # Graph Store
//!
//! The process-lifetime graph: node and edge arenas, one boolean
//! diagonal matrix per label, one integer matrix per relation type
//! (entries hold the smallest edge id for the endpoint pair), a
//! type-blind adjacency matrix, and the secondary index registry.
//!
//! Mutations queue into each matrix's pending buffer; anything that
//! multiplies calls [`Graph::flush_pending`] first, which is the
//! synchronization point at which zombies disappear. Matrix
//! dimensions track the highest allocated node id and only grow while
//! a query runs.

pub mod entities;
pub mod index;
pub mod schema;

pub use entities::{Edge, Node};
pub use index::{IndexOp, PropIndex};
pub use schema::{LabelId, PropKeyId, RelTypeId, Schema};

use crate::error::{QueryError, QueryResult};
use crate::matrix::SparseMatrix;
use crate::value::{EdgeId, NodeId, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

const MIN_DIMS: u64 = 16;

/// The property graph over its matrix representation
#[derive(Debug, Default)]
pub struct Graph {
    schema: Schema,
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    next_node_id: NodeId,
    next_edge_id: EdgeId,
    /// Shared square dimension of every matrix
    dims: u64,
    /// label id -> diagonal selector matrix
    label_matrices: Vec<SparseMatrix<u64>>,
    /// relation type id -> edge-id matrix
    rel_matrices: Vec<SparseMatrix<u64>>,
    /// type-blind edge existence (smallest edge id)
    adjacency: SparseMatrix<u64>,
    /// every edge id for (type, src, dst), ascending; parallel edges
    /// beyond the matrix entry live here
    multi_edges: HashMap<(RelTypeId, NodeId, NodeId), Vec<EdgeId>>,
    /// incident edge ids per node, for cascading deletes
    node_edges: HashMap<NodeId, BTreeSet<EdgeId>>,
    indexes: Vec<PropIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            dims: MIN_DIMS,
            adjacency: SparseMatrix::new(MIN_DIMS, MIN_DIMS),
            ..Graph::default()
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Current square dimension of all matrices
    pub fn matrix_dims(&self) -> u64 {
        self.dims
    }

    fn grow_to_fit(&mut self, node_id: NodeId) {
        if node_id < self.dims {
            return;
        }
        let new_dims = (node_id + 1).next_power_of_two().max(MIN_DIMS);
        self.adjacency.resize(new_dims, new_dims);
        for m in &mut self.label_matrices {
            m.resize(new_dims, new_dims);
        }
        for m in &mut self.rel_matrices {
            m.resize(new_dims, new_dims);
        }
        self.dims = new_dims;
    }

    fn ensure_label_matrix(&mut self, label: LabelId) {
        while self.label_matrices.len() <= label {
            self.label_matrices
                .push(SparseMatrix::new(self.dims, self.dims));
        }
    }

    fn ensure_rel_matrix(&mut self, rel_type: RelTypeId) {
        while self.rel_matrices.len() <= rel_type {
            self.rel_matrices
                .push(SparseMatrix::new(self.dims, self.dims));
        }
    }

    // -----------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------

    /// Allocate a node, interning labels and property keys.
    /// Null-valued properties are not stored.
    pub fn create_node(
        &mut self,
        labels: &[String],
        props: Vec<(String, Value)>,
    ) -> QueryResult<NodeId> {
        let id = self.next_node_id;
        self.next_node_id += 1;
        self.grow_to_fit(id);

        let mut node = Node::new(id);
        for label in labels {
            let lid = self.schema.get_or_add_label(label);
            self.ensure_label_matrix(lid);
            self.label_matrices[lid].set_element(id, id, 1)?;
            node.labels.push(lid);
        }
        for (key, value) in props {
            if value.is_null() {
                continue;
            }
            let kid = self.schema.get_or_add_prop_key(&key);
            node.props.insert(kid, value);
        }
        for idx in &mut self.indexes {
            if node.has_label(idx.label) {
                if let Some(v) = node.property(idx.prop) {
                    idx.insert(v, id);
                }
            }
        }
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Allocate an edge between existing nodes
    pub fn create_edge(
        &mut self,
        rel_type: &str,
        src: NodeId,
        dst: NodeId,
        props: Vec<(String, Value)>,
    ) -> QueryResult<EdgeId> {
        if !self.nodes.contains_key(&src) || !self.nodes.contains_key(&dst) {
            return Err(QueryError::Constraint(format!(
                "cannot create edge ({src})-[:{rel_type}]->({dst}): endpoint missing"
            )));
        }
        let tid = self.schema.get_or_add_rel_type(rel_type);
        self.ensure_rel_matrix(tid);

        let id = self.next_edge_id;
        self.next_edge_id += 1;

        let mut edge = Edge::new(id, tid, src, dst);
        for (key, value) in props {
            if value.is_null() {
                continue;
            }
            let kid = self.schema.get_or_add_prop_key(&key);
            edge.props.insert(kid, value);
        }
        self.edges.insert(id, edge);

        // the matrix keeps the smallest edge id for the pair
        let current = self.rel_matrices[tid].get_element(src, dst);
        if current.is_none_or(|existing| id < existing) {
            self.rel_matrices[tid].set_element(src, dst, id)?;
        }
        let adj = self.adjacency.get_element(src, dst);
        if adj.is_none_or(|existing| id < existing) {
            self.adjacency.set_element(src, dst, id)?;
        }

        let bucket = self.multi_edges.entry((tid, src, dst)).or_default();
        let pos = bucket.partition_point(|e| *e < id);
        bucket.insert(pos, id);
        self.node_edges.entry(src).or_default().insert(id);
        self.node_edges.entry(dst).or_default().insert(id);
        Ok(id)
    }

    /// Delete one edge. Returns false when the id is absent.
    pub fn delete_edge(&mut self, id: EdgeId) -> QueryResult<bool> {
        let Some(edge) = self.edges.remove(&id) else {
            return Ok(false);
        };
        let key = (edge.rel_type, edge.src, edge.dst);
        let remaining_same_type = if let Some(bucket) = self.multi_edges.get_mut(&key) {
            bucket.retain(|e| *e != id);
            if bucket.is_empty() {
                self.multi_edges.remove(&key);
                None
            } else {
                Some(bucket[0])
            }
        } else {
            None
        };

        match remaining_same_type {
            Some(smallest) => {
                self.rel_matrices[edge.rel_type].set_element(edge.src, edge.dst, smallest)?;
            }
            None => {
                self.rel_matrices[edge.rel_type].remove_element(edge.src, edge.dst)?;
            }
        }

        // the adjacency entry survives while any type still connects
        let smallest_any_type = self
            .multi_edges
            .iter()
            .filter(|((_, s, d), _)| *s == edge.src && *d == edge.dst)
            .filter_map(|(_, bucket)| bucket.first().copied())
            .min();
        match smallest_any_type {
            Some(smallest) => {
                self.adjacency.set_element(edge.src, edge.dst, smallest)?;
            }
            None => {
                self.adjacency.remove_element(edge.src, edge.dst)?;
            }
        }

        if let Some(set) = self.node_edges.get_mut(&edge.src) {
            set.remove(&id);
        }
        if let Some(set) = self.node_edges.get_mut(&edge.dst) {
            set.remove(&id);
        }
        Ok(true)
    }

    /// Delete a node, cascading over its incident edges (the DETACH
    /// primitive; the bare-DELETE connectivity check lives in the
    /// Delete operator). Returns (node deleted, edges deleted).
    pub fn delete_node(&mut self, id: NodeId) -> QueryResult<(bool, usize)> {
        if !self.nodes.contains_key(&id) {
            return Ok((false, 0));
        }
        let incident: Vec<EdgeId> = self
            .node_edges
            .get(&id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        let mut edges_deleted = 0;
        for eid in incident {
            if self.delete_edge(eid)? {
                edges_deleted += 1;
            }
        }
        let node = match self.nodes.remove(&id) {
            Some(n) => n,
            None => return Ok((false, edges_deleted)),
        };
        for lid in &node.labels {
            self.label_matrices[*lid].remove_element(id, id)?;
        }
        for idx in &mut self.indexes {
            if node.has_label(idx.label) {
                if let Some(v) = node.property(idx.prop) {
                    idx.remove(v, id);
                }
            }
        }
        self.node_edges.remove(&id);
        Ok((true, edges_deleted))
    }

    /// SET a node property; a Null value removes the property.
    /// Returns true when a property was written or erased.
    pub fn set_node_property(
        &mut self,
        id: NodeId,
        key: &str,
        value: Value,
    ) -> QueryResult<bool> {
        let kid = self.schema.get_or_add_prop_key(key);
        let node = self.nodes.get_mut(&id).ok_or_else(|| {
            QueryError::Constraint(format!("cannot set property on missing node {id}"))
        })?;
        let old = if value.is_null() {
            node.props.remove(&kid)
        } else {
            node.props.insert(kid, value.clone())
        };
        let labels = node.labels.clone();
        for idx in &mut self.indexes {
            if idx.prop == kid && labels.contains(&idx.label) {
                if let Some(old_v) = &old {
                    idx.remove(old_v, id);
                }
                if !value.is_null() {
                    idx.insert(&value, id);
                }
            }
        }
        Ok(old.is_some() || !value.is_null())
    }

    /// SET an edge property; a Null value removes the property
    pub fn set_edge_property(
        &mut self,
        id: EdgeId,
        key: &str,
        value: Value,
    ) -> QueryResult<bool> {
        let kid = self.schema.get_or_add_prop_key(key);
        let edge = self.edges.get_mut(&id).ok_or_else(|| {
            QueryError::Constraint(format!("cannot set property on missing edge {id}"))
        })?;
        let old = if value.is_null() {
            edge.props.remove(&kid)
        } else {
            edge.props.insert(kid, value.clone())
        };
        Ok(old.is_some() || !value.is_null())
    }

    // -----------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// All nodes ascending by id (allocation order)
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Edge ids incident to a node, either direction
    pub fn incident_edges(&self, id: NodeId) -> Vec<EdgeId> {
        self.node_edges
            .get(&id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every edge id connecting src to dst, optionally restricted to
    /// one relation type; parallel edges are all reported
    pub fn edges_between(
        &self,
        src: NodeId,
        dst: NodeId,
        rel_type: Option<RelTypeId>,
    ) -> Vec<EdgeId> {
        match rel_type {
            Some(t) => self
                .multi_edges
                .get(&(t, src, dst))
                .cloned()
                .unwrap_or_default(),
            None => {
                let mut out: Vec<EdgeId> = self
                    .multi_edges
                    .iter()
                    .filter(|((_, s, d), _)| *s == src && *d == dst)
                    .flat_map(|(_, bucket)| bucket.iter().copied())
                    .collect();
                out.sort_unstable();
                out
            }
        }
    }

    /// Diagonal selector matrix for a label; requires a prior flush
    pub fn label_matrix(&self, label: LabelId) -> QueryResult<&SparseMatrix<u64>> {
        self.label_matrices
            .get(label)
            .ok_or_else(|| QueryError::Internal(format!("label matrix {label} missing")))
    }

    /// Edge-id matrix for a relation type; requires a prior flush
    pub fn relation_matrix(&self, rel_type: RelTypeId) -> QueryResult<&SparseMatrix<u64>> {
        self.rel_matrices
            .get(rel_type)
            .ok_or_else(|| QueryError::Internal(format!("relation matrix {rel_type} missing")))
    }

    /// Type-blind adjacency; requires a prior flush
    pub fn adjacency_matrix(&self) -> &SparseMatrix<u64> {
        &self.adjacency
    }

    /// Merge pending tuples and clear zombies across every matrix.
    /// Called before any multiply reads matrix state.
    pub fn flush_pending(&mut self) {
        self.adjacency.flush();
        for m in &mut self.label_matrices {
            m.flush();
        }
        for m in &mut self.rel_matrices {
            m.flush();
        }
    }

    /// Flush one relation matrix only
    pub fn flush_relation(&mut self, rel_type: RelTypeId) {
        if let Some(m) = self.rel_matrices.get_mut(rel_type) {
            m.flush();
        }
    }

    /// Drop all buffered matrix updates without applying them.
    /// Error-teardown path: whatever a failing writer queued after
    /// the last flush never becomes visible.
    pub fn discard_pending(&mut self) {
        self.adjacency.discard_pending();
        for m in &mut self.label_matrices {
            m.discard_pending();
        }
        for m in &mut self.rel_matrices {
            m.discard_pending();
        }
    }

    // -----------------------------------------------------------------
    // Indices
    // -----------------------------------------------------------------

    /// Register and synchronously populate an index
    pub fn create_index(&mut self, label: &str, prop: &str) -> QueryResult<()> {
        let lid = self.schema.get_or_add_label(label);
        self.ensure_label_matrix(lid);
        let kid = self.schema.get_or_add_prop_key(prop);
        if self.indexes.iter().any(|i| i.label == lid && i.prop == kid) {
            return Err(QueryError::Constraint(format!(
                "index on :{label}({prop}) already exists"
            )));
        }
        let mut idx = PropIndex::new(lid, kid);
        for node in self.nodes.values() {
            if node.has_label(lid) {
                if let Some(v) = node.property(kid) {
                    idx.insert(v, node.id);
                }
            }
        }
        debug!(label, prop, entries = idx.len(), "index created");
        self.indexes.push(idx);
        Ok(())
    }

    pub fn drop_index(&mut self, label: &str, prop: &str) -> QueryResult<()> {
        let lid = self.schema.label_id(label);
        let kid = self.schema.prop_key_id(prop);
        let pos = match (lid, kid) {
            (Some(l), Some(k)) => self.indexes.iter().position(|i| i.label == l && i.prop == k),
            _ => None,
        };
        match pos {
            Some(p) => {
                self.indexes.remove(p);
                Ok(())
            }
            None => Err(QueryError::Constraint(format!(
                "no index on :{label}({prop})"
            ))),
        }
    }

    pub fn index_for(&self, label: LabelId, prop: PropKeyId) -> Option<&PropIndex> {
        self.indexes.iter().find(|i| i.label == label && i.prop == prop)
    }

    /// (label name, property name) for every registered index
    pub fn indexes(&self) -> Vec<(String, String)> {
        self.indexes
            .iter()
            .filter_map(|i| {
                Some((
                    self.schema.label_name(i.label)?.to_string(),
                    self.schema.prop_key_name(i.prop)?.to_string(),
                ))
            })
            .collect()
    }

    /// Property lookup for whatever entity a value refers to
    pub fn entity_property(&self, value: &Value, key: &str) -> Value {
        let Some(kid) = self.schema.prop_key_id(key) else {
            return Value::Null;
        };
        match value {
            Value::Node(id) => self
                .get_node(*id)
                .and_then(|n| n.property(kid))
                .cloned()
                .unwrap_or(Value::Null),
            Value::Edge(id) => self
                .get_edge(*id)
                .and_then(|e| e.property(kid))
                .cloned()
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(graph: &mut Graph, name: &str) -> NodeId {
        graph
            .create_node(
                &["Person".to_string()],
                vec![("name".to_string(), Value::String(name.to_string()))],
            )
            .unwrap()
    }

    #[test]
    fn test_create_node_assigns_monotone_ids() {
        let mut g = Graph::new();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        assert_eq!((a, b), (0, 1));
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn test_label_matrix_diagonal() {
        let mut g = Graph::new();
        let a = person(&mut g, "A");
        g.flush_pending();
        let lid = g.schema().label_id("Person").unwrap();
        let m = g.label_matrix(lid).unwrap();
        assert_eq!(m.get_element(a, a), Some(1));
        assert_eq!(m.nvals(), 1);
    }

    #[test]
    fn test_create_edge_and_matrix_entry() {
        let mut g = Graph::new();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        let e = g.create_edge("KNOWS", a, b, vec![]).unwrap();
        g.flush_pending();
        let tid = g.schema().rel_type_id("KNOWS").unwrap();
        assert_eq!(g.relation_matrix(tid).unwrap().get_element(a, b), Some(e));
        assert_eq!(g.adjacency_matrix().get_element(a, b), Some(e));
    }

    #[test]
    fn test_edge_to_missing_endpoint_rejected() {
        let mut g = Graph::new();
        let a = person(&mut g, "A");
        assert!(matches!(
            g.create_edge("KNOWS", a, 99, vec![]),
            Err(QueryError::Constraint(_))
        ));
    }

    #[test]
    fn test_parallel_edges_keep_smallest_in_matrix() {
        let mut g = Graph::new();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        let e1 = g.create_edge("KNOWS", a, b, vec![]).unwrap();
        let e2 = g.create_edge("KNOWS", a, b, vec![]).unwrap();
        g.flush_pending();
        let tid = g.schema().rel_type_id("KNOWS").unwrap();
        assert_eq!(g.relation_matrix(tid).unwrap().get_element(a, b), Some(e1));
        assert_eq!(g.edges_between(a, b, Some(tid)), vec![e1, e2]);

        // deleting the first promotes the survivor into the matrix
        assert!(g.delete_edge(e1).unwrap());
        g.flush_pending();
        assert_eq!(g.relation_matrix(tid).unwrap().get_element(a, b), Some(e2));
    }

    #[test]
    fn test_delete_node_cascades() {
        let mut g = Graph::new();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        g.create_edge("KNOWS", a, b, vec![]).unwrap();
        g.create_edge("KNOWS", b, a, vec![]).unwrap();
        let (deleted, edges) = g.delete_node(a).unwrap();
        assert!(deleted);
        assert_eq!(edges, 2);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_set_property_updates_index() {
        let mut g = Graph::new();
        let a = person(&mut g, "A");
        g.create_index("Person", "name").unwrap();
        let lid = g.schema().label_id("Person").unwrap();
        let kid = g.schema().prop_key_id("name").unwrap();
        assert_eq!(
            g.index_for(lid, kid).unwrap().scan(IndexOp::Eq, &Value::String("A".into())),
            vec![a]
        );
        g.set_node_property(a, "name", Value::String("Z".into())).unwrap();
        let idx = g.index_for(lid, kid).unwrap();
        assert!(idx.scan(IndexOp::Eq, &Value::String("A".into())).is_empty());
        assert_eq!(idx.scan(IndexOp::Eq, &Value::String("Z".into())), vec![a]);
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut g = Graph::new();
        g.create_index("Person", "name").unwrap();
        assert!(matches!(
            g.create_index("Person", "name"),
            Err(QueryError::Constraint(_))
        ));
        g.drop_index("Person", "name").unwrap();
        assert!(matches!(
            g.drop_index("Person", "name"),
            Err(QueryError::Constraint(_))
        ));
    }

    #[test]
    fn test_matrix_growth_preserves_entries() {
        let mut g = Graph::new();
        let a = person(&mut g, "A");
        let b = person(&mut g, "B");
        let e = g.create_edge("KNOWS", a, b, vec![]).unwrap();
        // push past the initial dimension
        for i in 0..40 {
            person(&mut g, &format!("n{i}"));
        }
        g.flush_pending();
        assert!(g.matrix_dims() >= 42);
        let tid = g.schema().rel_type_id("KNOWS").unwrap();
        assert_eq!(g.relation_matrix(tid).unwrap().get_element(a, b), Some(e));
    }

    #[test]
    fn test_entity_property_lookup() {
        let mut g = Graph::new();
        let a = person(&mut g, "A");
        assert_eq!(
            g.entity_property(&Value::Node(a), "name"),
            Value::String("A".into())
        );
        assert_eq!(g.entity_property(&Value::Node(a), "missing"), Value::Null);
        assert_eq!(g.entity_property(&Value::Int(3), "name"), Value::Null);
    }
}
