//! Schema catalog: label, relation-type, and property-key interning.
//!
//! Names are interned to dense ids on first sight; the ids index the
//! per-label and per-type matrix vectors in the graph store.

use std::collections::HashMap;

/// Index into the per-label matrix vector
pub type LabelId = usize;
/// Index into the per-type relation matrix vector
pub type RelTypeId = usize;
/// Interned property key
pub type PropKeyId = usize;

#[derive(Debug, Clone, Default)]
struct Interner {
    names: Vec<String>,
    ids: HashMap<String, usize>,
}

impl Interner {
    fn get_or_add(&mut self, name: &str) -> usize {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    fn id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

/// The graph's name catalogs
#[derive(Debug, Clone, Default)]
pub struct Schema {
    labels: Interner,
    rel_types: Interner,
    prop_keys: Interner,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn get_or_add_label(&mut self, name: &str) -> LabelId {
        self.labels.get_or_add(name)
    }

    pub fn label_id(&self, name: &str) -> Option<LabelId> {
        self.labels.id(name)
    }

    pub fn label_name(&self, id: LabelId) -> Option<&str> {
        self.labels.name(id)
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// All label names in interning order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.names.iter().map(String::as_str)
    }

    pub fn get_or_add_rel_type(&mut self, name: &str) -> RelTypeId {
        self.rel_types.get_or_add(name)
    }

    pub fn rel_type_id(&self, name: &str) -> Option<RelTypeId> {
        self.rel_types.id(name)
    }

    pub fn rel_type_name(&self, id: RelTypeId) -> Option<&str> {
        self.rel_types.name(id)
    }

    pub fn rel_type_count(&self) -> usize {
        self.rel_types.len()
    }

    pub fn rel_types(&self) -> impl Iterator<Item = &str> {
        self.rel_types.names.iter().map(String::as_str)
    }

    pub fn get_or_add_prop_key(&mut self, name: &str) -> PropKeyId {
        self.prop_keys.get_or_add(name)
    }

    pub fn prop_key_id(&self, name: &str) -> Option<PropKeyId> {
        self.prop_keys.id(name)
    }

    pub fn prop_key_name(&self, id: PropKeyId) -> Option<&str> {
        self.prop_keys.name(id)
    }

    pub fn prop_keys(&self) -> impl Iterator<Item = &str> {
        self.prop_keys.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_idempotent() {
        let mut s = Schema::new();
        let a = s.get_or_add_label("Person");
        let b = s.get_or_add_label("Person");
        assert_eq!(a, b);
        assert_eq!(s.label_count(), 1);
        assert_eq!(s.label_name(a), Some("Person"));
    }

    #[test]
    fn test_separate_namespaces() {
        let mut s = Schema::new();
        let label = s.get_or_add_label("KNOWS");
        let rel = s.get_or_add_rel_type("KNOWS");
        // same dense id space start, different catalogs
        assert_eq!(label, 0);
        assert_eq!(rel, 0);
        assert_eq!(s.label_id("KNOWS"), Some(0));
        assert_eq!(s.rel_type_id("KNOWS"), Some(0));
        assert_eq!(s.prop_key_id("KNOWS"), None);
    }
}
