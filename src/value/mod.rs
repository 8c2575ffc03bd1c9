//! # Value Type System
//!
//! The tagged scalar carried in record slots and entity properties:
//! Null, Bool, Int, Double, String, Node, Edge, List.
//!
//! Comparison follows Cypher ordering: same-kind scalars compare
//! naturally, Int and Double cross-compare after promotion, anything
//! involving Null is incomparable, and sorting falls back to a stable
//! type rank so ORDER BY stays total.
//!
//! ## Usage
//!
//! ```rust
//! use quiver::value::Value;
//!
//! let a = Value::Int(3);
//! let b = Value::Double(3.0);
//! assert_eq!(a.compare(&b), Some(std::cmp::Ordering::Equal));
//! assert!(Value::Null.compare(&a).is_none());
//! ```

pub mod record;

pub use record::Record;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Node identifier in the graph store
pub type NodeId = u64;
/// Edge identifier in the graph store
pub type EdgeId = u64;

/// Discriminant of a [`Value`], used in error messages and typecasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Double,
    String,
    Node,
    Edge,
    List,
}

impl ValueKind {
    /// Stable rank used to order values of incomparable kinds.
    /// Null ranks last so it sorts last under ASC.
    fn type_rank(self) -> u8 {
        match self {
            ValueKind::Bool => 0,
            ValueKind::Int | ValueKind::Double => 1,
            ValueKind::String => 2,
            ValueKind::List => 3,
            ValueKind::Node => 4,
            ValueKind::Edge => 5,
            ValueKind::Null => 6,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "NULL",
            ValueKind::Bool => "BOOL",
            ValueKind::Int => "INT64",
            ValueKind::Double => "DOUBLE",
            ValueKind::String => "STRING",
            ValueKind::Node => "NODE",
            ValueKind::Edge => "EDGE",
            ValueKind::List => "LIST",
        };
        write!(f, "{name}")
    }
}

/// A tagged scalar value.
///
/// Node and Edge variants carry ids, not references; property access
/// goes through the graph store that owns the backing entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    /// Reference to a node by id
    Node(NodeId),
    /// Reference to an edge by id
    Edge(EdgeId),
    /// Ordered collection (UNWIND input, collect() output)
    List(Vec<Value>),
}

impl Value {
    /// The active tag
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Node(_) => ValueKind::Node,
            Value::Edge(_) => ValueKind::Edge,
            Value::List(_) => ValueKind::List,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric check (Int or Double)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    /// WHERE-clause truthiness: only a true boolean passes
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Numeric payload promoted to f64, if numeric
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Integer payload, if an Int
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Three-way comparison per Cypher semantics.
    ///
    /// Returns None when the operands are incomparable: any Null
    /// operand, or differing non-numeric kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Node(a), Value::Node(b)) => Some(a.cmp(b)),
            (Value::Edge(a), Value::Edge(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                // promote to f64; payloads are never NaN by construction
                let (x, y) = (a.as_f64()?, b.as_f64()?);
                x.partial_cmp(&y)
            }
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y) {
                        Some(Ordering::Equal) => {}
                        other => return other,
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Total order for ORDER BY and DISTINCT buffers.
    ///
    /// Comparable values use [`Value::compare`]; incomparable pairs
    /// fall back to the type rank (Null greatest, so it lands last
    /// under ASC and first under DESC).
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        if let Some(ord) = self.compare(other) {
            return ord;
        }
        let (ra, rb) = (self.kind().type_rank(), other.kind().type_rank());
        match ra.cmp(&rb) {
            Ordering::Equal => Ordering::Equal, // both Null
            ord => ord,
        }
    }

    /// Equality used by grouping keys and DISTINCT, where two Nulls
    /// collapse and Int 3 equals Double 3.0.
    pub fn group_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.group_eq(y))
            }
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Feed this value's canonical byte form into a hasher.
    ///
    /// Consistent with [`Value::group_eq`]: an integral Double hashes
    /// the same as the equal Int, and Null has a fixed tag.
    pub fn canonical_hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(2);
                state.write_i64(*i);
            }
            Value::Double(d) => {
                // hash integral doubles as their Int twin
                if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d <= i64::MAX as f64 {
                    state.write_u8(2);
                    state.write_i64(*d as i64);
                } else {
                    state.write_u8(3);
                    state.write_u64(d.to_bits());
                }
            }
            Value::String(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Value::Node(id) => {
                state.write_u8(5);
                state.write_u64(*id);
            }
            Value::Edge(id) => {
                state.write_u8(6);
                state.write_u64(*id);
            }
            Value::List(items) => {
                state.write_u8(7);
                state.write_u64(items.len() as u64);
                for item in items {
                    item.canonical_hash(state);
                }
            }
        }
    }

    /// Stand-alone fingerprint of a value sequence, used as the
    /// group-cache and DISTINCT lookup key (exact compare on collision).
    pub fn fingerprint(values: &[Value]) -> u64 {
        let mut hasher = DefaultHasher::new();
        for v in values {
            v.canonical_hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_kind_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(
            Value::String("a".into()).compare(&Value::String("b".into())),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Bool(false).compare(&Value::Bool(true)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(
            Value::Int(3).compare(&Value::Double(3.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Double(2.5).compare(&Value::Int(3)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_null_incomparable() {
        assert!(Value::Null.compare(&Value::Int(1)).is_none());
        assert!(Value::Int(1).compare(&Value::Null).is_none());
        assert!(Value::Null.compare(&Value::Null).is_none());
    }

    #[test]
    fn test_heterogeneous_incomparable() {
        assert!(Value::Int(1).compare(&Value::String("1".into())).is_none());
        assert!(Value::Bool(true).compare(&Value::Int(1)).is_none());
    }

    #[test]
    fn test_total_order_null_last() {
        let mut vals = vec![Value::Null, Value::Int(2), Value::Int(1)];
        vals.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(vals, vec![Value::Int(1), Value::Int(2), Value::Null]);
    }

    #[test]
    fn test_group_eq_null_collapse() {
        assert!(Value::Null.group_eq(&Value::Null));
        assert!(Value::Int(3).group_eq(&Value::Double(3.0)));
        assert!(!Value::Int(3).group_eq(&Value::Double(3.5)));
    }

    #[test]
    fn test_fingerprint_promotion_consistency() {
        // Int 3 and Double 3.0 are group-equal, so they must collide
        let a = Value::fingerprint(&[Value::Int(3)]);
        let b = Value::fingerprint(&[Value::Double(3.0)]);
        assert_eq!(a, b);
        let c = Value::fingerprint(&[Value::Double(3.5)]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Bool(true).is_true());
        assert!(!Value::Bool(false).is_true());
        assert!(!Value::Int(1).is_true());
        assert!(!Value::Null.is_true());
    }

    #[test]
    fn test_list_compare() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        let prefix = Value::List(vec![Value::Int(1)]);
        assert_eq!(prefix.compare(&a), Some(Ordering::Less));
    }
}
