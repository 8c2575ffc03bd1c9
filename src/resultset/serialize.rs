//! Textual result serialization.
//!
//! The stable row format clients and tests assert against:
//! - NULL -> `NULL`
//! - BOOL -> `true` | `false`
//! - INT -> decimal
//! - DOUBLE -> shortest round-trip decimal, always with a fraction
//! - STRING -> double-quoted, `"` and `\` escaped
//! - Node -> `(id:<id>:Label1:Label2 {k1:v1, k2:v2})`
//! - Edge -> `[id:<id>:TYPE {k1:v1}]`
//! - List -> `[v1, v2]`

use crate::graph::Graph;
use crate::value::Value;

/// Shortest round-trip form, with `.0` appended to integral values so
/// doubles stay distinguishable from integers
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{d}");
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{s}.0")
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Serialize one value; entity references are resolved through the
/// graph store that owns them
pub fn value_to_string(value: &Value, graph: &Graph) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Double(d) => format_double(*d),
        Value::String(s) => escape_string(s),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(|v| value_to_string(v, graph)).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Node(id) => match graph.get_node(*id) {
            None => format!("(id:{id})"),
            Some(node) => {
                let mut out = format!("(id:{id}");
                for lid in &node.labels {
                    if let Some(name) = graph.schema().label_name(*lid) {
                        out.push(':');
                        out.push_str(name);
                    }
                }
                out.push_str(&props_to_string(graph, node.props.iter()));
                out.push(')');
                out
            }
        },
        Value::Edge(id) => match graph.get_edge(*id) {
            None => format!("[id:{id}]"),
            Some(edge) => {
                let mut out = format!("[id:{id}");
                if let Some(name) = graph.schema().rel_type_name(edge.rel_type) {
                    out.push(':');
                    out.push_str(name);
                }
                out.push_str(&props_to_string(graph, edge.props.iter()));
                out.push(']');
                out
            }
        },
    }
}

fn props_to_string<'a>(
    graph: &Graph,
    props: impl Iterator<Item = (&'a usize, &'a Value)>,
) -> String {
    let rendered: Vec<String> = props
        .filter_map(|(kid, v)| {
            let key = graph.schema().prop_key_name(*kid)?;
            Some(format!("{key}:{}", value_to_string(v, graph)))
        })
        .collect();
    if rendered.is_empty() {
        String::new()
    } else {
        format!(" {{{}}}", rendered.join(", "))
    }
}

/// Comma-separated row form
pub fn row_to_string(values: &[Value], graph: &Graph) -> String {
    let fields: Vec<String> = values.iter().map(|v| value_to_string(v, graph)).collect();
    fields.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_forms() {
        let g = Graph::new();
        assert_eq!(value_to_string(&Value::Null, &g), "NULL");
        assert_eq!(value_to_string(&Value::Bool(true), &g), "true");
        assert_eq!(value_to_string(&Value::Int(-42), &g), "-42");
        assert_eq!(value_to_string(&Value::Double(3.0), &g), "3.0");
        assert_eq!(value_to_string(&Value::Double(2.5), &g), "2.5");
    }

    #[test]
    fn test_string_escaping() {
        let g = Graph::new();
        assert_eq!(
            value_to_string(&Value::String(r#"a"b\c"#.into()), &g),
            r#""a\"b\\c""#
        );
    }

    #[test]
    fn test_double_round_trip() {
        let g = Graph::new();
        let inputs = [0.1, 1e300, -2.5, 1.0 / 3.0];
        for x in inputs {
            let s = value_to_string(&Value::Double(x), &g);
            let parsed: f64 = s.parse().unwrap();
            assert_eq!(parsed, x, "round trip of {x}");
        }
    }

    #[test]
    fn test_node_form() {
        let mut g = Graph::new();
        let id = g
            .create_node(
                &["Person".to_string(), "Actor".to_string()],
                vec![
                    ("name".to_string(), Value::String("A".into())),
                    ("age".to_string(), Value::Int(30)),
                ],
            )
            .unwrap();
        assert_eq!(
            value_to_string(&Value::Node(id), &g),
            r#"(id:0:Person:Actor {name:"A", age:30})"#
        );
    }

    #[test]
    fn test_edge_form() {
        let mut g = Graph::new();
        let a = g.create_node(&[], vec![]).unwrap();
        let b = g.create_node(&[], vec![]).unwrap();
        let e = g
            .create_edge("KNOWS", a, b, vec![("w".to_string(), Value::Int(1))])
            .unwrap();
        assert_eq!(value_to_string(&Value::Edge(e), &g), "[id:0:KNOWS {w:1}]");
    }

    #[test]
    fn test_row_form() {
        let g = Graph::new();
        let row = vec![Value::Int(15), Value::Int(5), Value::Double(3.0)];
        assert_eq!(row_to_string(&row, &g), "15, 5, 3.0");
    }
}
