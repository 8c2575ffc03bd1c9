//! # Arithmetic Expression Engine
//!
//! A small tree interpreter over record slots. The plan builder turns
//! AST expressions into [`ExprNode`] trees with function pointers and
//! record slots resolved up front; execution walks the tree without
//! any name lookups.
//!
//! Three walks mirror the aggregate lifecycle:
//! - [`evaluate`] computes a scalar result (aggregate nodes read
//!   their frozen result);
//! - [`aggregate_step`] locates aggregate nodes and steps them with
//!   their evaluated child values;
//! - [`reduce`] finalizes every aggregate node, after which the tree
//!   must not be stepped again.

pub mod aggregate;
pub mod funcs;

pub use aggregate::{AggregateCtx, AggregateFunction};
pub use funcs::{ScalarFn, ScalarFuncDesc};

use crate::ast::{Expr, UnaryOp};
use crate::error::{QueryError, QueryResult};
use crate::graph::Graph;
use crate::value::{Record, Value};
use std::collections::HashMap;

/// A compiled expression tree node
#[derive(Debug, Clone)]
pub enum ExprNode {
    /// Literal value
    Constant(Value),
    /// List constructor
    ListExpr(Vec<ExprNode>),
    /// Record slot reference, optionally narrowed to a property
    Variadic {
        alias: String,
        slot: usize,
        prop: Option<String>,
    },
    /// Label test on the node in a slot; the plan builder emits these
    /// for pattern labels a scan could not already guarantee
    HasLabel { slot: usize, label: String },
    /// Scalar function call with the function pointer resolved
    ScalarOp {
        name: String,
        func: ScalarFn,
        args: Vec<ExprNode>,
    },
    /// Aggregate call site owning its per-group context
    AggregateOp {
        name: String,
        ctx: AggregateCtx,
        args: Vec<ExprNode>,
    },
}

impl ExprNode {
    /// Compile an AST expression against the record layout.
    ///
    /// Unknown names and bad argument counts were already rejected by
    /// validation; hitting them here is an internal error.
    pub fn build(expr: &Expr, slots: &HashMap<String, usize>) -> QueryResult<ExprNode> {
        match expr {
            Expr::Literal(v) => Ok(ExprNode::Constant(v.clone())),
            Expr::List(items) => {
                let nodes = items
                    .iter()
                    .map(|e| ExprNode::build(e, slots))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(ExprNode::ListExpr(nodes))
            }
            Expr::Ident(alias) => {
                let slot = *slots.get(alias).ok_or_else(|| {
                    QueryError::Internal(format!("alias '{alias}' missing from record map"))
                })?;
                Ok(ExprNode::Variadic {
                    alias: alias.clone(),
                    slot,
                    prop: None,
                })
            }
            Expr::Property { alias, key } => {
                let slot = *slots.get(alias).ok_or_else(|| {
                    QueryError::Internal(format!("alias '{alias}' missing from record map"))
                })?;
                Ok(ExprNode::Variadic {
                    alias: alias.clone(),
                    slot,
                    prop: Some(key.clone()),
                })
            }
            Expr::Unary { op, operand } => {
                let name = match op {
                    UnaryOp::Neg => "neg",
                    UnaryOp::Not => "not",
                };
                Self::build_scalar(name, std::slice::from_ref(operand.as_ref()), slots)
            }
            Expr::Binary { op, lhs, rhs } => Self::build_scalar(
                op.function_name(),
                &[lhs.as_ref().clone(), rhs.as_ref().clone()],
                slots,
            ),
            Expr::FnCall {
                name,
                args,
                distinct,
            } => {
                let nodes = args
                    .iter()
                    .map(|e| ExprNode::build(e, slots))
                    .collect::<QueryResult<Vec<_>>>()?;
                if let Some((kind, forced_distinct)) = aggregate::lookup(name) {
                    return Ok(ExprNode::AggregateOp {
                        name: name.clone(),
                        ctx: AggregateCtx::new(kind, *distinct || forced_distinct),
                        args: nodes,
                    });
                }
                let desc = funcs::lookup(name).ok_or_else(|| {
                    QueryError::Internal(format!("unknown function '{name}' reached build"))
                })?;
                Ok(ExprNode::ScalarOp {
                    name: desc.name.to_string(),
                    func: desc.func,
                    args: nodes,
                })
            }
        }
    }

    fn build_scalar(
        name: &str,
        args: &[Expr],
        slots: &HashMap<String, usize>,
    ) -> QueryResult<ExprNode> {
        let desc = funcs::lookup(name)
            .ok_or_else(|| QueryError::Internal(format!("operator function '{name}' missing")))?;
        let nodes = args
            .iter()
            .map(|e| ExprNode::build(e, slots))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(ExprNode::ScalarOp {
            name: desc.name.to_string(),
            func: desc.func,
            args: nodes,
        })
    }

    /// Clone the tree with every aggregate context reset to a fresh
    /// state; used to mint per-group instances from the template
    pub fn fresh(&self) -> ExprNode {
        match self {
            ExprNode::Constant(v) => ExprNode::Constant(v.clone()),
            ExprNode::ListExpr(items) => {
                ExprNode::ListExpr(items.iter().map(ExprNode::fresh).collect())
            }
            ExprNode::Variadic { alias, slot, prop } => ExprNode::Variadic {
                alias: alias.clone(),
                slot: *slot,
                prop: prop.clone(),
            },
            ExprNode::HasLabel { slot, label } => ExprNode::HasLabel {
                slot: *slot,
                label: label.clone(),
            },
            ExprNode::ScalarOp { name, func, args } => ExprNode::ScalarOp {
                name: name.clone(),
                func: *func,
                args: args.iter().map(ExprNode::fresh).collect(),
            },
            ExprNode::AggregateOp { name, ctx, args } => ExprNode::AggregateOp {
                name: name.clone(),
                ctx: ctx.fresh(),
                args: args.iter().map(ExprNode::fresh).collect(),
            },
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            ExprNode::AggregateOp { .. } => true,
            ExprNode::ScalarOp { args, .. } => args.iter().any(ExprNode::contains_aggregate),
            ExprNode::ListExpr(items) => items.iter().any(ExprNode::contains_aggregate),
            _ => false,
        }
    }
}

/// Evaluate the tree to a scalar over one record.
/// Aggregate nodes yield their frozen (post-[`reduce`]) result.
pub fn evaluate(node: &ExprNode, record: &Record, graph: &Graph) -> QueryResult<Value> {
    match node {
        ExprNode::Constant(v) => Ok(v.clone()),
        ExprNode::ListExpr(items) => {
            let values = items
                .iter()
                .map(|n| evaluate(n, record, graph))
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(Value::List(values))
        }
        ExprNode::Variadic { slot, prop, .. } => {
            let entity = record.get(*slot);
            match prop {
                None => Ok(entity.clone()),
                Some(key) => Ok(graph.entity_property(entity, key)),
            }
        }
        ExprNode::HasLabel { slot, label } => match record.get(*slot) {
            Value::Null => Ok(Value::Null),
            Value::Node(id) => {
                let holds = graph
                    .schema()
                    .label_id(label)
                    .and_then(|lid| graph.get_node(*id).map(|n| n.has_label(lid)))
                    .unwrap_or(false);
                Ok(Value::Bool(holds))
            }
            other => Err(QueryError::type_error(format!(
                "label test on {}",
                other.kind()
            ))),
        },
        ExprNode::ScalarOp { func, args, .. } => {
            let values = args
                .iter()
                .map(|n| evaluate(n, record, graph))
                .collect::<QueryResult<Vec<_>>>()?;
            func(&values)
        }
        ExprNode::AggregateOp { ctx, .. } => Ok(ctx.result()),
    }
}

/// Walk the tree and step every aggregate node with its evaluated
/// child values
pub fn aggregate_step(node: &mut ExprNode, record: &Record, graph: &Graph) -> QueryResult<()> {
    match node {
        ExprNode::AggregateOp { ctx, args, .. } => {
            let values = args
                .iter()
                .map(|n| evaluate(n, record, graph))
                .collect::<QueryResult<Vec<_>>>()?;
            ctx.step(&values)
        }
        ExprNode::ScalarOp { args, .. } => {
            for a in args {
                aggregate_step(a, record, graph)?;
            }
            Ok(())
        }
        ExprNode::ListExpr(items) => {
            for i in items {
                aggregate_step(i, record, graph)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Finalize every aggregate node in the tree
pub fn reduce(node: &mut ExprNode) {
    match node {
        ExprNode::AggregateOp { ctx, .. } => ctx.finalize(),
        ExprNode::ScalarOp { args, .. } => {
            for a in args {
                reduce(a);
            }
        }
        ExprNode::ListExpr(items) => {
            for i in items {
                reduce(i);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn compile(src: &str, slots: &[(&str, usize)]) -> ExprNode {
        // parse a RETURN to reuse the expression grammar
        let q = parser::parse(&format!("RETURN {src}")).unwrap();
        let crate::ast::Clause::Return(body) = &q.clauses[0] else {
            panic!("expected RETURN");
        };
        let map: HashMap<String, usize> =
            slots.iter().map(|(a, s)| ((*a).to_string(), *s)).collect();
        ExprNode::build(&body.items[0].expr, &map).unwrap()
    }

    #[test]
    fn test_constant_arithmetic() {
        let g = Graph::new();
        let r = Record::new(0);
        let node = compile("1 + 2 * 3", &[]);
        assert_eq!(evaluate(&node, &r, &g).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_variadic_property_lookup() {
        let mut g = Graph::new();
        let id = g
            .create_node(
                &["N".to_string()],
                vec![("v".to_string(), Value::Int(42))],
            )
            .unwrap();
        let mut r = Record::new(1);
        r.set(0, Value::Node(id));
        let node = compile("n.v", &[("n", 0)]);
        assert_eq!(evaluate(&node, &r, &g).unwrap(), Value::Int(42));
        // missing property reads as Null
        let node = compile("n.missing", &[("n", 0)]);
        assert_eq!(evaluate(&node, &r, &g).unwrap(), Value::Null);
    }

    #[test]
    fn test_aggregate_lifecycle() {
        let g = Graph::new();
        let mut node = compile("sum(n)", &[("n", 0)]);
        for v in 1..=5 {
            let mut r = Record::new(1);
            r.set(0, Value::Int(v));
            aggregate_step(&mut node, &r, &g).unwrap();
        }
        // unreduced aggregate reads as Null
        let empty = Record::new(1);
        assert_eq!(evaluate(&node, &empty, &g).unwrap(), Value::Null);
        reduce(&mut node);
        assert_eq!(evaluate(&node, &empty, &g).unwrap(), Value::Int(15));
    }

    #[test]
    fn test_aggregate_inside_scalar_expression() {
        let g = Graph::new();
        // count(n) + 10
        let mut node = compile("count(n) + 10", &[("n", 0)]);
        assert!(node.contains_aggregate());
        for v in 0..3 {
            let mut r = Record::new(1);
            r.set(0, Value::Int(v));
            aggregate_step(&mut node, &r, &g).unwrap();
        }
        reduce(&mut node);
        let empty = Record::new(1);
        assert_eq!(evaluate(&node, &empty, &g).unwrap(), Value::Int(13));
    }

    #[test]
    fn test_fresh_resets_aggregate_state() {
        let g = Graph::new();
        let mut node = compile("count(n)", &[("n", 0)]);
        let mut r = Record::new(1);
        r.set(0, Value::Int(1));
        aggregate_step(&mut node, &r, &g).unwrap();
        let mut clone = node.fresh();
        reduce(&mut node);
        reduce(&mut clone);
        let empty = Record::new(1);
        assert_eq!(evaluate(&node, &empty, &g).unwrap(), Value::Int(1));
        assert_eq!(evaluate(&clone, &empty, &g).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_list_expression() {
        let g = Graph::new();
        let r = Record::new(0);
        let node = compile("[1, 2 + 3]", &[]);
        assert_eq!(
            evaluate(&node, &r, &g).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(5)])
        );
    }
}
