//! # Procedure Registry
//!
//! Named procedures invocable through `CALL ... YIELD ...`. A
//! procedure declares its input count and typed outputs; invocation
//! materializes its rows, which the CALL operator then streams with
//! the usual step-until-None contract.
//!
//! Built-ins: `db.labels()`, `db.relationshipTypes()`,
//! `db.propertyKeys()`, `db.indexes()`.

use crate::error::{QueryError, QueryResult};
use crate::graph::Graph;
use crate::value::{Value, ValueKind};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Row producer signature: materialize all output rows for one call
pub type ProcedureFn = fn(&Graph, &[Value]) -> QueryResult<Vec<Vec<Value>>>;

/// A registered procedure
#[derive(Clone, Copy)]
pub struct ProcedureDesc {
    pub name: &'static str,
    pub input_count: usize,
    /// Output column names with their declared kinds
    pub outputs: &'static [(&'static str, ValueKind)],
    pub invoke: ProcedureFn,
}

static REGISTRY: OnceLock<HashMap<String, ProcedureDesc>> = OnceLock::new();

/// Case-insensitive procedure lookup
pub fn lookup(name: &str) -> Option<ProcedureDesc> {
    registry().get(&name.to_lowercase()).copied()
}

fn registry() -> &'static HashMap<String, ProcedureDesc> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        let mut add = |desc: ProcedureDesc| {
            map.insert(desc.name.to_lowercase(), desc);
        };
        add(ProcedureDesc {
            name: "db.labels",
            input_count: 0,
            outputs: &[("label", ValueKind::String)],
            invoke: proc_labels,
        });
        add(ProcedureDesc {
            name: "db.relationshipTypes",
            input_count: 0,
            outputs: &[("relationshipType", ValueKind::String)],
            invoke: proc_relationship_types,
        });
        add(ProcedureDesc {
            name: "db.propertyKeys",
            input_count: 0,
            outputs: &[("propertyKey", ValueKind::String)],
            invoke: proc_property_keys,
        });
        add(ProcedureDesc {
            name: "db.indexes",
            input_count: 0,
            outputs: &[("label", ValueKind::String), ("property", ValueKind::String)],
            invoke: proc_indexes,
        });
        map
    })
}

/// One invocation's streaming state, consumed by the CALL operator
#[derive(Debug)]
pub struct ProcedureInstance {
    rows: Vec<Vec<Value>>,
    cursor: usize,
}

impl ProcedureInstance {
    /// Resolve and invoke a procedure, capturing its rows
    pub fn invoke(name: &str, graph: &Graph, args: &[Value]) -> QueryResult<Self> {
        let desc = lookup(name)
            .ok_or_else(|| QueryError::validation(format!("unknown procedure '{name}'")))?;
        let rows = (desc.invoke)(graph, args)?;
        Ok(ProcedureInstance { rows, cursor: 0 })
    }

    /// Next output row, None at exhaustion
    pub fn step(&mut self) -> Option<&[Value]> {
        let row = self.rows.get(self.cursor)?;
        self.cursor += 1;
        Some(row)
    }

    /// Rewind to the first row
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

fn proc_labels(graph: &Graph, _args: &[Value]) -> QueryResult<Vec<Vec<Value>>> {
    Ok(graph
        .schema()
        .labels()
        .map(|l| vec![Value::String(l.to_string())])
        .collect())
}

fn proc_relationship_types(graph: &Graph, _args: &[Value]) -> QueryResult<Vec<Vec<Value>>> {
    Ok(graph
        .schema()
        .rel_types()
        .map(|t| vec![Value::String(t.to_string())])
        .collect())
}

fn proc_property_keys(graph: &Graph, _args: &[Value]) -> QueryResult<Vec<Vec<Value>>> {
    Ok(graph
        .schema()
        .prop_keys()
        .map(|k| vec![Value::String(k.to_string())])
        .collect())
}

fn proc_indexes(graph: &Graph, _args: &[Value]) -> QueryResult<Vec<Vec<Value>>> {
    Ok(graph
        .indexes()
        .into_iter()
        .map(|(label, prop)| vec![Value::String(label), Value::String(prop)])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        assert!(lookup("db.labels").is_some());
        assert!(lookup("DB.LABELS").is_some());
        assert!(lookup("db.nothing").is_none());
    }

    #[test]
    fn test_db_labels_streams_in_intern_order() {
        let mut g = Graph::new();
        g.create_node(&["B".to_string()], vec![]).unwrap();
        g.create_node(&["A".to_string()], vec![]).unwrap();
        let mut inst = ProcedureInstance::invoke("db.labels", &g, &[]).unwrap();
        assert_eq!(inst.step(), Some(&[Value::String("B".into())][..]));
        assert_eq!(inst.step(), Some(&[Value::String("A".into())][..]));
        assert_eq!(inst.step(), None);
        inst.reset();
        assert_eq!(inst.step(), Some(&[Value::String("B".into())][..]));
    }

    #[test]
    fn test_db_indexes() {
        let mut g = Graph::new();
        g.create_index("Person", "name").unwrap();
        let mut inst = ProcedureInstance::invoke("db.indexes", &g, &[]).unwrap();
        assert_eq!(
            inst.step(),
            Some(&[Value::String("Person".into()), Value::String("name".into())][..])
        );
        assert_eq!(inst.step(), None);
    }
}
