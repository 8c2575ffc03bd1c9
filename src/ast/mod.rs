//! # Query AST
//!
//! The immutable tree the parser produces and the planner consumes.
//! Clause order is preserved as written; validation and pattern
//! normalization happen in later passes without mutating the input.

pub mod validate;

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Edge orientation as written in the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// `-[..]->`
    Outgoing,
    /// `<-[..]-`
    Incoming,
    /// `-[..]-`
    Both,
}

/// Variable-length hop bounds: `*`, `*n`, `*min..max`, `*..max`, `*min..`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopRange {
    pub min: u32,
    /// None = unbounded
    pub max: Option<u32>,
}

/// `(alias:Label {prop: value})`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodePattern {
    pub alias: Option<String>,
    pub labels: Vec<String>,
    pub props: Vec<(String, Expr)>,
}

/// `-[alias:TYPE*min..max {prop: value}]->`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgePattern {
    pub alias: Option<String>,
    /// Alternatives: `:T1|T2`
    pub types: Vec<String>,
    pub direction: Direction,
    pub hops: Option<HopRange>,
    pub props: Vec<(String, Expr)>,
}

/// A node–edge–node chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPattern {
    pub start: NodePattern,
    pub steps: Vec<(EdgePattern, NodePattern)>,
}

impl PathPattern {
    /// Every alias bound by this path, nodes and edges alike
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.start
            .alias
            .iter()
            .map(String::as_str)
            .chain(self.steps.iter().flat_map(|(e, n)| {
                e.alias
                    .iter()
                    .map(String::as_str)
                    .chain(n.alias.iter().map(String::as_str))
            }))
    }
}

/// Binary operators, arithmetic through boolean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Registry name of the scalar function implementing the operator
    pub fn function_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Pow => "pow",
            BinaryOp::Eq => "eq",
            BinaryOp::Neq => "neq",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Scalar / aggregate expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    /// `[e1, e2, ...]`
    List(Vec<Expr>),
    /// Bare alias reference
    Ident(String),
    /// `alias.key`
    Property { alias: String, key: String },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Function call; `distinct` carries `fn(DISTINCT arg)`
    FnCall {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
}

impl Expr {
    /// Does any node of this tree call an aggregate function?
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::FnCall { name, args, .. } => {
                crate::arithmetic::aggregate::is_aggregate(name)
                    || args.iter().any(Expr::contains_aggregate)
            }
            Expr::Unary { operand, .. } => operand.contains_aggregate(),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.contains_aggregate() || rhs.contains_aggregate()
            }
            Expr::List(items) => items.iter().any(Expr::contains_aggregate),
            _ => false,
        }
    }

    /// Aliases this expression reads
    pub fn referenced_aliases(&self, out: &mut Vec<String>) {
        match self {
            Expr::Ident(a) => out.push(a.clone()),
            Expr::Property { alias, .. } => out.push(alias.clone()),
            Expr::Unary { operand, .. } => operand.referenced_aliases(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.referenced_aliases(out);
                rhs.referenced_aliases(out);
            }
            Expr::FnCall { args, .. } => {
                for a in args {
                    a.referenced_aliases(out);
                }
            }
            Expr::List(items) => {
                for i in items {
                    i.referenced_aliases(out);
                }
            }
            Expr::Literal(_) => {}
        }
    }

    /// Canonical text form, used to match ORDER BY keys against
    /// projection items
    pub fn display_text(&self) -> String {
        match self {
            Expr::Literal(v) => format!("{v:?}"),
            Expr::List(items) => {
                let inner: Vec<String> = items.iter().map(Expr::display_text).collect();
                format!("[{}]", inner.join(", "))
            }
            Expr::Ident(a) => a.clone(),
            Expr::Property { alias, key } => format!("{alias}.{key}"),
            Expr::Unary { op, operand } => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "NOT ",
                };
                format!("{sym}{}", operand.display_text())
            }
            Expr::Binary { op, lhs, rhs } => format!(
                "{} {} {}",
                lhs.display_text(),
                op.function_name(),
                rhs.display_text()
            ),
            Expr::FnCall {
                name,
                args,
                distinct,
            } => {
                let inner: Vec<String> = args.iter().map(Expr::display_text).collect();
                let d = if *distinct { "DISTINCT " } else { "" };
                format!("{name}({d}{})", inner.join(", "))
            }
        }
    }
}

/// One RETURN / WITH item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl Projection {
    /// Column header: the explicit alias, or the expression text
    pub fn header_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.expr.display_text())
    }
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

/// Shared body of RETURN and WITH
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionBody {
    pub distinct: bool,
    pub items: Vec<Projection>,
    pub order_by: Vec<OrderItem>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// `SET alias.key = expr`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetItem {
    pub alias: String,
    pub key: String,
    pub expr: Expr,
}

/// A single query clause, in source order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    Match {
        optional: bool,
        patterns: Vec<PathPattern>,
        filter: Option<Expr>,
    },
    Create {
        patterns: Vec<PathPattern>,
    },
    Merge {
        pattern: PathPattern,
    },
    Set {
        items: Vec<SetItem>,
    },
    Delete {
        aliases: Vec<String>,
        /// DETACH DELETE: drop incident relationships with the node.
        /// Without it, deleting a still-connected node is an error.
        detach: bool,
    },
    With(ProjectionBody),
    Return(ProjectionBody),
    Unwind {
        expr: Expr,
        alias: String,
    },
    Call {
        procedure: String,
        args: Vec<Expr>,
        /// Explicit YIELD names; empty = all declared outputs
        yields: Vec<String>,
    },
    CreateIndex {
        label: String,
        prop: String,
    },
    DropIndex {
        label: String,
        prop: String,
    },
}

/// A parsed query: clauses in source order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub clauses: Vec<Clause>,
}

impl Query {
    /// Does any clause mutate the graph?
    pub fn is_write(&self) -> bool {
        self.clauses.iter().any(|c| {
            matches!(
                c,
                Clause::Create { .. }
                    | Clause::Merge { .. }
                    | Clause::Set { .. }
                    | Clause::Delete { .. }
                    | Clause::CreateIndex { .. }
                    | Clause::DropIndex { .. }
            )
        })
    }

    pub fn has_return(&self) -> bool {
        self.clauses.iter().any(|c| matches!(c, Clause::Return(_)))
    }
}
