//! Pre-planning validation.
//!
//! Everything caught here surfaces as a ValidationError before any
//! operator is built: undefined or ambiguous aliases, unknown
//! functions and procedures, aggregate calls outside projections,
//! malformed variable-length ranges, bad argument counts, negative
//! SKIP/LIMIT. Execution never re-checks these.

use crate::arithmetic::{aggregate, funcs};
use crate::ast::{Clause, Direction, Expr, PathPattern, ProjectionBody, Query};
use crate::error::{QueryError, QueryResult};
use crate::procedures;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AliasKind {
    Node,
    Edge,
    Scalar,
}

struct Scope {
    aliases: HashMap<String, AliasKind>,
}

impl Scope {
    fn new() -> Self {
        Scope {
            aliases: HashMap::new(),
        }
    }

    fn bind(&mut self, alias: &str, kind: AliasKind) -> QueryResult<()> {
        if let Some(existing) = self.aliases.get(alias) {
            if *existing != kind {
                return Err(QueryError::validation(format!(
                    "alias '{alias}' is ambiguous: bound as both {existing:?} and {kind:?}"
                )));
            }
        }
        self.aliases.insert(alias.to_string(), kind);
        Ok(())
    }

    fn is_bound(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }
}

/// Validate a parsed query; Ok(()) means planning may proceed
pub fn validate(query: &Query) -> QueryResult<()> {
    let mut scope = Scope::new();

    for (idx, clause) in query.clauses.iter().enumerate() {
        let is_last = idx == query.clauses.len() - 1;
        match clause {
            Clause::Match {
                patterns, filter, ..
            } => {
                for pattern in patterns {
                    bind_pattern(&mut scope, pattern, false)?;
                }
                if let Some(f) = filter {
                    check_expr(f, &scope, false)?;
                }
            }
            Clause::Create { patterns } => {
                for pattern in patterns {
                    validate_create_pattern(pattern)?;
                    bind_pattern(&mut scope, pattern, true)?;
                }
            }
            Clause::Merge { pattern } => {
                validate_create_pattern(pattern)?;
                bind_pattern(&mut scope, pattern, true)?;
            }
            Clause::Set { items } => {
                for item in items {
                    if !scope.is_bound(&item.alias) {
                        return Err(QueryError::validation(format!(
                            "SET references undefined alias '{}'",
                            item.alias
                        )));
                    }
                    check_expr(&item.expr, &scope, false)?;
                }
            }
            Clause::Delete { aliases, .. } => {
                for alias in aliases {
                    if !scope.is_bound(alias) {
                        return Err(QueryError::validation(format!(
                            "DELETE references undefined alias '{alias}'"
                        )));
                    }
                }
            }
            Clause::Unwind { expr, alias } => {
                check_expr(expr, &scope, false)?;
                scope.bind(alias, AliasKind::Scalar)?;
            }
            Clause::With(body) => {
                validate_projection(body, &scope)?;
                // WITH narrows the scope to its projected names
                let mut narrowed = Scope::new();
                for item in &body.items {
                    let name = match (&item.alias, &item.expr) {
                        (Some(a), _) => a.clone(),
                        (None, Expr::Ident(a)) => a.clone(),
                        (None, other) => {
                            return Err(QueryError::validation(format!(
                                "WITH expression '{}' requires an alias",
                                other.display_text()
                            )));
                        }
                    };
                    narrowed.bind(&name, AliasKind::Scalar)?;
                }
                scope = narrowed;
            }
            Clause::Return(body) => {
                validate_projection(body, &scope)?;
                if !is_last {
                    return Err(QueryError::validation(
                        "RETURN must be the final clause",
                    ));
                }
            }
            Clause::Call {
                procedure,
                args,
                yields,
            } => {
                let desc = procedures::lookup(procedure).ok_or_else(|| {
                    QueryError::validation(format!("unknown procedure '{procedure}'"))
                })?;
                if args.len() != desc.input_count {
                    return Err(QueryError::validation(format!(
                        "procedure '{procedure}' expects {} argument(s), got {}",
                        desc.input_count,
                        args.len()
                    )));
                }
                for arg in args {
                    check_expr(arg, &scope, false)?;
                }
                let outputs: Vec<&str> = desc.outputs.iter().map(|(n, _)| *n).collect();
                if yields.is_empty() {
                    for name in &outputs {
                        scope.bind(name, AliasKind::Scalar)?;
                    }
                } else {
                    for y in yields {
                        if !outputs.contains(&y.as_str()) {
                            return Err(QueryError::validation(format!(
                                "procedure '{procedure}' does not yield '{y}'"
                            )));
                        }
                        scope.bind(y, AliasKind::Scalar)?;
                    }
                }
            }
            Clause::CreateIndex { .. } | Clause::DropIndex { .. } => {}
        }
    }

    let index_clauses = query
        .clauses
        .iter()
        .filter(|c| matches!(c, Clause::CreateIndex { .. } | Clause::DropIndex { .. }))
        .count();
    if index_clauses > 0 && query.clauses.len() != index_clauses {
        return Err(QueryError::validation(
            "index operations cannot be combined with other clauses",
        ));
    }

    // a query must end in something that produces results or effects
    if let Some(last) = query.clauses.last() {
        if matches!(
            last,
            Clause::Match { .. } | Clause::With(_) | Clause::Unwind { .. }
        ) {
            return Err(QueryError::validation(
                "query cannot end with a non-returning clause",
            ));
        }
    }
    Ok(())
}

fn bind_pattern(scope: &mut Scope, pattern: &PathPattern, creating: bool) -> QueryResult<()> {
    if let Some(alias) = &pattern.start.alias {
        scope.bind(alias, AliasKind::Node)?;
    }
    for (edge, node) in &pattern.steps {
        if let Some(alias) = &edge.alias {
            if edge.hops.is_some() {
                return Err(QueryError::validation(format!(
                    "variable-length relationship '{alias}' cannot be bound to an alias"
                )));
            }
            if !creating && scope.is_bound(alias) {
                return Err(QueryError::validation(format!(
                    "relationship alias '{alias}' is already bound"
                )));
            }
            scope.bind(alias, AliasKind::Edge)?;
        }
        if let Some(range) = edge.hops {
            if let Some(max) = range.max {
                if range.min > max {
                    return Err(QueryError::validation(format!(
                        "variable-length range *{}..{max} is malformed",
                        range.min
                    )));
                }
            }
        }
        for (_, expr) in &edge.props {
            check_expr(expr, scope, false)?;
        }
        if let Some(alias) = &node.alias {
            scope.bind(alias, AliasKind::Node)?;
        }
        for (_, expr) in &node.props {
            check_expr(expr, scope, false)?;
        }
    }
    for (_, expr) in &pattern.start.props {
        check_expr(expr, scope, false)?;
    }
    Ok(())
}

fn validate_create_pattern(pattern: &PathPattern) -> QueryResult<()> {
    for (edge, _) in &pattern.steps {
        if edge.hops.is_some() {
            return Err(QueryError::validation(
                "variable-length relationships cannot be created",
            ));
        }
        if edge.direction == Direction::Both {
            return Err(QueryError::validation(
                "created relationships must have a direction",
            ));
        }
        if edge.types.len() != 1 {
            return Err(QueryError::validation(
                "created relationships must have exactly one type",
            ));
        }
    }
    Ok(())
}

fn validate_projection(body: &ProjectionBody, scope: &Scope) -> QueryResult<()> {
    for item in &body.items {
        check_expr(&item.expr, scope, true)?;
    }
    let has_aggregate = body.items.iter().any(|i| i.expr.contains_aggregate());
    for order in &body.order_by {
        // ORDER BY may reference projection aliases as well
        let mut order_scope = Scope {
            aliases: scope.aliases.clone(),
        };
        for item in &body.items {
            if let Some(alias) = &item.alias {
                order_scope.bind(alias, AliasKind::Scalar)?;
            }
        }
        check_expr(&order.expr, &order_scope, has_aggregate)?;
        if has_aggregate && !order.expr.contains_aggregate() {
            // a sort key in an aggregating projection must be one of
            // the projected expressions; anything else would smuggle
            // in an extra grouping key
            let matches_item = body.items.iter().any(|item| {
                if let (Expr::Ident(name), Some(alias)) = (&order.expr, &item.alias) {
                    if name == alias {
                        return true;
                    }
                }
                item.expr.display_text() == order.expr.display_text()
            });
            if !matches_item {
                return Err(QueryError::validation(format!(
                    "ORDER BY expression '{}' must appear in the aggregating projection",
                    order.expr.display_text()
                )));
            }
        }
    }
    if let Some(skip) = body.skip {
        if skip < 0 {
            return Err(QueryError::validation("SKIP must not be negative"));
        }
    }
    if let Some(limit) = body.limit {
        if limit < 0 {
            return Err(QueryError::validation("LIMIT must not be negative"));
        }
    }
    Ok(())
}

fn check_expr(expr: &Expr, scope: &Scope, allow_aggregates: bool) -> QueryResult<()> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::List(items) => {
            for i in items {
                check_expr(i, scope, allow_aggregates)?;
            }
            Ok(())
        }
        Expr::Ident(alias) | Expr::Property { alias, .. } => {
            if scope.is_bound(alias) {
                Ok(())
            } else {
                Err(QueryError::validation(format!(
                    "undefined alias '{alias}'"
                )))
            }
        }
        Expr::Unary { operand, .. } => check_expr(operand, scope, allow_aggregates),
        Expr::Binary { lhs, rhs, .. } => {
            check_expr(lhs, scope, allow_aggregates)?;
            check_expr(rhs, scope, allow_aggregates)
        }
        Expr::FnCall { name, args, .. } => {
            if aggregate::is_aggregate(name) {
                if !allow_aggregates {
                    return Err(QueryError::validation(format!(
                        "aggregate function '{name}' is only allowed in RETURN or WITH"
                    )));
                }
                let expected = match aggregate::lookup(name).map(|(k, _)| k) {
                    Some(
                        crate::arithmetic::AggregateFunction::PercentileCont
                        | crate::arithmetic::AggregateFunction::PercentileDisc,
                    ) => 2,
                    Some(crate::arithmetic::AggregateFunction::Count) => {
                        // count(*) parses to zero arguments
                        if args.is_empty() {
                            0
                        } else {
                            1
                        }
                    }
                    _ => 1,
                };
                if args.len() != expected {
                    return Err(QueryError::validation(format!(
                        "aggregate '{name}' expects {expected} argument(s), got {}",
                        args.len()
                    )));
                }
                // aggregates must not nest
                for arg in args {
                    if arg.contains_aggregate() {
                        return Err(QueryError::validation(format!(
                            "aggregate '{name}' cannot contain another aggregate"
                        )));
                    }
                    check_expr(arg, scope, false)?;
                }
                Ok(())
            } else if let Some(desc) = funcs::lookup(name) {
                if args.len() < desc.min_args
                    || desc.max_args.is_some_and(|max| args.len() > max)
                {
                    return Err(QueryError::validation(format!(
                        "function '{name}' called with {} argument(s)",
                        args.len()
                    )));
                }
                for arg in args {
                    check_expr(arg, scope, allow_aggregates)?;
                }
                Ok(())
            } else {
                Err(QueryError::validation(format!(
                    "unknown function '{name}'"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn check(src: &str) -> QueryResult<()> {
        validate(&parse(src).unwrap())
    }

    #[test]
    fn test_valid_queries_pass() {
        assert!(check("MATCH (p:Person) RETURN p.name").is_ok());
        assert!(check("MATCH (a)-[:KNOWS]->(b) WHERE a.age > 20 RETURN b").is_ok());
        assert!(check("MATCH (n:N) RETURN sum(n.v), count(n)").is_ok());
        assert!(check("CREATE (a:X {k: 1})-[:R]->(b:X {k: 2}) RETURN a.k + b.k").is_ok());
        assert!(check("UNWIND [1,2] AS x RETURN x").is_ok());
        assert!(check("CALL db.labels() YIELD label RETURN label").is_ok());
    }

    #[test]
    fn test_undefined_alias() {
        let err = check("MATCH (a) RETURN b.name").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("undefined alias 'b'")));
    }

    #[test]
    fn test_unknown_function() {
        let err = check("MATCH (a) RETURN frobnicate(a)").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("unknown function")));
    }

    #[test]
    fn test_aggregate_in_where_rejected() {
        let err = check("MATCH (a) WHERE count(a) > 1 RETURN a").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("only allowed")));
    }

    #[test]
    fn test_nested_aggregate_rejected() {
        let err = check("MATCH (a) RETURN sum(count(a))").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("another aggregate")));
    }

    #[test]
    fn test_malformed_varlen_range() {
        let err = check("MATCH (a)-[:K*3..2]->(b) RETURN b").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("malformed")));
    }

    #[test]
    fn test_varlen_alias_rejected() {
        let err = check("MATCH (a)-[e:K*1..2]->(b) RETURN e").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("cannot be bound")));
    }

    #[test]
    fn test_negative_window_rejected() {
        assert!(check("MATCH (n) RETURN n LIMIT -1").is_err());
        assert!(check("MATCH (n) RETURN n SKIP -2").is_err());
    }

    #[test]
    fn test_ambiguous_alias() {
        let err = check("MATCH (x)-[x:K]->(b) RETURN b").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("ambiguous")));
    }

    #[test]
    fn test_unknown_procedure_and_yield() {
        assert!(check("CALL db.nothing() RETURN 1").is_err());
        let err = check("CALL db.labels() YIELD wrong RETURN wrong").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("does not yield")));
    }

    #[test]
    fn test_with_scoping() {
        assert!(check("MATCH (n:N) WITH n.v AS v RETURN v").is_ok());
        // n is out of scope past the WITH
        let err = check("MATCH (n:N) WITH n.v AS v RETURN n.v").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("undefined alias 'n'")));
        // expressions in WITH require aliases
        assert!(check("MATCH (n:N) WITH n.v RETURN 1").is_err());
    }

    #[test]
    fn test_create_shape_rules() {
        assert!(check("CREATE (a)-[:R*1..2]->(b)").is_err());
        assert!(check("CREATE (a)-[:R]-(b)").is_err());
        assert!(check("MATCH (a) SET a.x = 1").is_ok());
        assert!(check("MATCH (a) SET b.x = 1").is_err());
    }

    #[test]
    fn test_trailing_clause_rules() {
        assert!(check("MATCH (n)").is_err());
        assert!(check("MATCH (n) WITH n AS m").is_err());
        let err = check("MATCH (n) RETURN n MATCH (m) RETURN m").unwrap_err();
        assert!(matches!(err, QueryError::Validation(m) if m.contains("final clause")));
    }

    #[test]
    fn test_bad_arity() {
        assert!(check("RETURN toUpper()").is_err());
        assert!(check("RETURN toUpper('a', 'b')").is_err());
        assert!(check("MATCH (n) RETURN percentileCont(n.v)").is_err());
    }
}
