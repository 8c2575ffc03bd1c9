//! Secondary indices over (label, property).
//!
//! A BTree keyed by the property value under the total value order,
//! so equality and range predicates both become tree scans. Cross-kind
//! neighbors in the key space are filtered back out with a real
//! comparison, keeping predicate semantics exact.

use crate::graph::schema::{LabelId, PropKeyId};
use crate::value::{NodeId, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Comparison operators an index scan supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Value wrapper ordered by [`Value::total_cmp`], usable as a BTree key
#[derive(Debug, Clone)]
pub struct OrderedValue(pub Value);

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One secondary index on (label, property)
#[derive(Debug, Clone)]
pub struct PropIndex {
    pub label: LabelId,
    pub prop: PropKeyId,
    entries: BTreeMap<OrderedValue, BTreeSet<NodeId>>,
}

impl PropIndex {
    pub fn new(label: LabelId, prop: PropKeyId) -> Self {
        PropIndex {
            label,
            prop,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, value: &Value, node: NodeId) {
        if value.is_null() {
            return;
        }
        self.entries
            .entry(OrderedValue(value.clone()))
            .or_default()
            .insert(node);
    }

    pub fn remove(&mut self, value: &Value, node: NodeId) {
        let key = OrderedValue(value.clone());
        if let Some(set) = self.entries.get_mut(&key) {
            set.remove(&node);
            if set.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Nodes whose indexed value satisfies `op value`, ascending by id
    /// within ascending key order
    pub fn scan(&self, op: IndexOp, value: &Value) -> Vec<NodeId> {
        let key = OrderedValue(value.clone());
        let mut out = Vec::new();
        let range: Box<dyn Iterator<Item = (&OrderedValue, &BTreeSet<NodeId>)> + '_> = match op {
            IndexOp::Eq => Box::new(self.entries.range(key.clone()..=key.clone())),
            IndexOp::Lt | IndexOp::Le => Box::new(self.entries.range(..=key.clone())),
            IndexOp::Gt | IndexOp::Ge => Box::new(self.entries.range(key.clone()..)),
        };
        for (k, nodes) in range {
            // the tree's rank order admits neighbors of other kinds;
            // keep only genuinely comparable matches
            let ord = match k.0.compare(value) {
                Some(o) => o,
                None => continue,
            };
            let keep = match op {
                IndexOp::Eq => ord == Ordering::Equal,
                IndexOp::Lt => ord == Ordering::Less,
                IndexOp::Le => ord != Ordering::Greater,
                IndexOp::Gt => ord == Ordering::Greater,
                IndexOp::Ge => ord != Ordering::Less,
            };
            if keep {
                out.extend(nodes.iter().copied());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PropIndex {
        let mut idx = PropIndex::new(0, 0);
        idx.insert(&Value::Int(1), 10);
        idx.insert(&Value::Int(2), 20);
        idx.insert(&Value::Int(2), 21);
        idx.insert(&Value::Int(5), 50);
        idx
    }

    #[test]
    fn test_eq_scan() {
        let idx = sample();
        assert_eq!(idx.scan(IndexOp::Eq, &Value::Int(2)), vec![20, 21]);
        assert!(idx.scan(IndexOp::Eq, &Value::Int(3)).is_empty());
    }

    #[test]
    fn test_range_scans() {
        let idx = sample();
        assert_eq!(idx.scan(IndexOp::Lt, &Value::Int(2)), vec![10]);
        assert_eq!(idx.scan(IndexOp::Le, &Value::Int(2)), vec![10, 20, 21]);
        assert_eq!(idx.scan(IndexOp::Gt, &Value::Int(2)), vec![50]);
        assert_eq!(idx.scan(IndexOp::Ge, &Value::Int(5)), vec![50]);
    }

    #[test]
    fn test_numeric_promotion_in_scan() {
        let idx = sample();
        assert_eq!(idx.scan(IndexOp::Eq, &Value::Double(2.0)), vec![20, 21]);
        assert_eq!(idx.scan(IndexOp::Lt, &Value::Double(1.5)), vec![10]);
    }

    #[test]
    fn test_string_keys_do_not_match_numeric_predicates() {
        let mut idx = sample();
        idx.insert(&Value::String("zz".into()), 99);
        // strings rank above numbers in the tree but are incomparable
        assert_eq!(idx.scan(IndexOp::Gt, &Value::Int(0)), vec![10, 20, 21, 50]);
    }

    #[test]
    fn test_remove() {
        let mut idx = sample();
        idx.remove(&Value::Int(2), 20);
        assert_eq!(idx.scan(IndexOp::Eq, &Value::Int(2)), vec![21]);
        idx.remove(&Value::Int(2), 21);
        assert!(idx.scan(IndexOp::Eq, &Value::Int(2)).is_empty());
    }

    #[test]
    fn test_null_not_indexed() {
        let mut idx = PropIndex::new(0, 0);
        idx.insert(&Value::Null, 1);
        assert!(idx.is_empty());
    }
}
