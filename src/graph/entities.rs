//! Node and edge entities.
//!
//! Entities live in id-indexed arenas owned by the graph store;
//! records refer to them by id only, so store growth never
//! invalidates anything a record holds.

use crate::graph::schema::{LabelId, PropKeyId, RelTypeId};
use crate::value::{EdgeId, NodeId, Value};
use std::collections::BTreeMap;

/// A graph node: labels plus a property map
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub labels: Vec<LabelId>,
    /// Keyed by interned property-key id; BTreeMap keeps the
    /// serialized property order stable
    pub props: BTreeMap<PropKeyId, Value>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Node {
            id,
            labels: Vec::new(),
            props: BTreeMap::new(),
        }
    }

    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }

    pub fn property(&self, key: PropKeyId) -> Option<&Value> {
        self.props.get(&key)
    }
}

/// A typed, directed edge between two nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub rel_type: RelTypeId,
    pub src: NodeId,
    pub dst: NodeId,
    pub props: BTreeMap<PropKeyId, Value>,
}

impl Edge {
    pub fn new(id: EdgeId, rel_type: RelTypeId, src: NodeId, dst: NodeId) -> Self {
        Edge {
            id,
            rel_type,
            src,
            dst,
            props: BTreeMap::new(),
        }
    }

    pub fn property(&self, key: PropKeyId) -> Option<&Value> {
        self.props.get(&key)
    }
}
