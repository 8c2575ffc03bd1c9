//! # Cypher-subset Parser
//!
//! Hand-rolled recursive descent over the token stream from
//! [`lexer`]. Produces the immutable [`Query`] AST; all semantic
//! checking happens in the validation pass, not here.
//!
//! Accepted clauses: MATCH, OPTIONAL MATCH, WHERE (after MATCH),
//! CREATE, MERGE, SET, DELETE, RETURN, WITH, UNWIND, CALL ... YIELD,
//! ORDER BY / SKIP / LIMIT / DISTINCT, CREATE|DROP INDEX ON
//! :Label(prop).

pub mod lexer;

use crate::ast::{
    BinaryOp, Clause, Direction, EdgePattern, Expr, HopRange, NodePattern, OrderItem,
    PathPattern, Projection, ProjectionBody, Query, SetItem, UnaryOp,
};
use crate::error::{QueryError, QueryResult};
use crate::value::Value;
use lexer::{Token, TokenKind};

/// Parse a query string into its AST
pub fn parse(input: &str) -> QueryResult<Query> {
    let tokens = lexer::tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_query()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn here(&self) -> usize {
        self.tokens[self.pos].pos
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, expected: &TokenKind) -> QueryResult<()> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(QueryError::parse(
                format!("expected {expected:?}, found {:?}", self.peek()),
                self.here(),
            ))
        }
    }

    fn eat_if(&mut self, expected: &TokenKind) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Case-insensitive keyword check
    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn at_keyword_at(&self, offset: usize, kw: &str) -> bool {
        matches!(self.peek_at(offset), TokenKind::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> QueryResult<()> {
        if self.at_keyword(kw) {
            self.advance();
            Ok(())
        } else {
            Err(QueryError::parse(
                format!("expected {kw}, found {:?}", self.peek()),
                self.here(),
            ))
        }
    }

    fn eat_keyword_if(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn identifier(&mut self, what: &str) -> QueryResult<String> {
        match self.peek() {
            TokenKind::Ident(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            other => Err(QueryError::parse(
                format!("expected {what}, found {other:?}"),
                self.here(),
            )),
        }
    }

    // -----------------------------------------------------------------
    // Clauses
    // -----------------------------------------------------------------

    fn parse_query(&mut self) -> QueryResult<Query> {
        let mut clauses = Vec::new();
        while self.peek() != &TokenKind::Eof {
            clauses.push(self.parse_clause()?);
        }
        if clauses.is_empty() {
            return Err(QueryError::parse("empty query", 0));
        }
        Ok(Query { clauses })
    }

    fn parse_clause(&mut self) -> QueryResult<Clause> {
        if self.at_keyword("OPTIONAL") {
            self.advance();
            self.eat_keyword("MATCH")?;
            return self.parse_match(true);
        }
        if self.eat_keyword_if("MATCH") {
            return self.parse_match(false);
        }
        if self.at_keyword("CREATE") {
            if self.at_keyword_at(1, "INDEX") {
                self.advance();
                self.advance();
                let (label, prop) = self.parse_index_target()?;
                return Ok(Clause::CreateIndex { label, prop });
            }
            self.advance();
            let patterns = self.parse_pattern_list()?;
            return Ok(Clause::Create { patterns });
        }
        if self.at_keyword("DROP") {
            self.advance();
            self.eat_keyword("INDEX")?;
            let (label, prop) = self.parse_index_target()?;
            return Ok(Clause::DropIndex { label, prop });
        }
        if self.eat_keyword_if("MERGE") {
            let pattern = self.parse_path_pattern()?;
            return Ok(Clause::Merge { pattern });
        }
        if self.eat_keyword_if("SET") {
            return self.parse_set();
        }
        if self.at_keyword("DETACH") {
            self.advance();
            self.eat_keyword("DELETE")?;
            return self.parse_delete(true);
        }
        if self.eat_keyword_if("DELETE") {
            return self.parse_delete(false);
        }
        if self.eat_keyword_if("RETURN") {
            return Ok(Clause::Return(self.parse_projection_body()?));
        }
        if self.eat_keyword_if("WITH") {
            return Ok(Clause::With(self.parse_projection_body()?));
        }
        if self.eat_keyword_if("UNWIND") {
            let expr = self.parse_expr()?;
            self.eat_keyword("AS")?;
            let alias = self.identifier("alias after AS")?;
            return Ok(Clause::Unwind { expr, alias });
        }
        if self.eat_keyword_if("CALL") {
            return self.parse_call();
        }
        Err(QueryError::parse(
            format!("unexpected token {:?}", self.peek()),
            self.here(),
        ))
    }

    fn parse_match(&mut self, optional: bool) -> QueryResult<Clause> {
        let patterns = self.parse_pattern_list()?;
        let filter = if self.eat_keyword_if("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Clause::Match {
            optional,
            patterns,
            filter,
        })
    }

    fn parse_index_target(&mut self) -> QueryResult<(String, String)> {
        self.eat_keyword("ON")?;
        self.eat(&TokenKind::Colon)?;
        let label = self.identifier("label")?;
        self.eat(&TokenKind::LParen)?;
        let prop = self.identifier("property")?;
        self.eat(&TokenKind::RParen)?;
        Ok((label, prop))
    }

    fn parse_set(&mut self) -> QueryResult<Clause> {
        let mut items = Vec::new();
        loop {
            let alias = self.identifier("alias in SET")?;
            self.eat(&TokenKind::Dot)?;
            let key = self.identifier("property in SET")?;
            self.eat(&TokenKind::Eq)?;
            let expr = self.parse_expr()?;
            items.push(SetItem { alias, key, expr });
            if !self.eat_if(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Clause::Set { items })
    }

    fn parse_delete(&mut self, detach: bool) -> QueryResult<Clause> {
        let mut aliases = vec![self.identifier("alias in DELETE")?];
        while self.eat_if(&TokenKind::Comma) {
            aliases.push(self.identifier("alias in DELETE")?);
        }
        Ok(Clause::Delete { aliases, detach })
    }

    fn parse_call(&mut self) -> QueryResult<Clause> {
        let mut procedure = self.identifier("procedure name")?;
        while self.eat_if(&TokenKind::Dot) {
            procedure.push('.');
            procedure.push_str(&self.identifier("procedure name segment")?);
        }
        self.eat(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek() != &TokenKind::RParen {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat_if(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.eat(&TokenKind::RParen)?;
        let mut yields = Vec::new();
        if self.eat_keyword_if("YIELD") {
            yields.push(self.identifier("yield name")?);
            while self.eat_if(&TokenKind::Comma) {
                yields.push(self.identifier("yield name")?);
            }
        }
        Ok(Clause::Call {
            procedure,
            args,
            yields,
        })
    }

    fn parse_projection_body(&mut self) -> QueryResult<ProjectionBody> {
        let distinct = self.eat_keyword_if("DISTINCT");
        let mut items = vec![self.parse_projection_item()?];
        while self.eat_if(&TokenKind::Comma) {
            items.push(self.parse_projection_item()?);
        }
        let mut order_by = Vec::new();
        if self.at_keyword("ORDER") {
            self.advance();
            self.eat_keyword("BY")?;
            loop {
                let expr = self.parse_expr()?;
                let descending = if self.eat_keyword_if("DESC") {
                    true
                } else {
                    self.eat_keyword_if("ASC");
                    false
                };
                order_by.push(OrderItem { expr, descending });
                if !self.eat_if(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let skip = if self.eat_keyword_if("SKIP") {
            Some(self.parse_signed_integer()?)
        } else {
            None
        };
        let limit = if self.eat_keyword_if("LIMIT") {
            Some(self.parse_signed_integer()?)
        } else {
            None
        };
        Ok(ProjectionBody {
            distinct,
            items,
            order_by,
            skip,
            limit,
        })
    }

    fn parse_projection_item(&mut self) -> QueryResult<Projection> {
        let expr = self.parse_expr()?;
        let alias = if self.eat_keyword_if("AS") {
            Some(self.identifier("alias after AS")?)
        } else {
            None
        };
        Ok(Projection { expr, alias })
    }

    fn parse_signed_integer(&mut self) -> QueryResult<i64> {
        let negative = self.eat_if(&TokenKind::Minus);
        match self.advance() {
            TokenKind::Integer(n) => Ok(if negative { -n } else { n }),
            other => Err(QueryError::parse(
                format!("expected integer, found {other:?}"),
                self.here(),
            )),
        }
    }

    // -----------------------------------------------------------------
    // Patterns
    // -----------------------------------------------------------------

    fn parse_pattern_list(&mut self) -> QueryResult<Vec<PathPattern>> {
        let mut patterns = vec![self.parse_path_pattern()?];
        while self.eat_if(&TokenKind::Comma) {
            patterns.push(self.parse_path_pattern()?);
        }
        Ok(patterns)
    }

    fn parse_path_pattern(&mut self) -> QueryResult<PathPattern> {
        let start = self.parse_node_pattern()?;
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Minus | TokenKind::Lt => {
                    let edge = self.parse_edge_pattern()?;
                    let node = self.parse_node_pattern()?;
                    steps.push((edge, node));
                }
                _ => break,
            }
        }
        Ok(PathPattern { start, steps })
    }

    fn parse_node_pattern(&mut self) -> QueryResult<NodePattern> {
        self.eat(&TokenKind::LParen)?;
        let mut node = NodePattern::default();
        if let TokenKind::Ident(s) = self.peek() {
            node.alias = Some(s.clone());
            self.advance();
        }
        while self.eat_if(&TokenKind::Colon) {
            node.labels.push(self.identifier("label")?);
        }
        if self.peek() == &TokenKind::LBrace {
            node.props = self.parse_property_map()?;
        }
        self.eat(&TokenKind::RParen)?;
        Ok(node)
    }

    fn parse_edge_pattern(&mut self) -> QueryResult<EdgePattern> {
        // <-[...]-  vs  -[...]->  vs  -[...]-
        let incoming_head = self.eat_if(&TokenKind::Lt);
        self.eat(&TokenKind::Minus)?;
        self.eat(&TokenKind::LBracket)?;

        let mut edge = EdgePattern {
            alias: None,
            types: Vec::new(),
            direction: Direction::Both,
            hops: None,
            props: Vec::new(),
        };
        if let TokenKind::Ident(s) = self.peek() {
            edge.alias = Some(s.clone());
            self.advance();
        }
        if self.eat_if(&TokenKind::Colon) {
            edge.types.push(self.identifier("relationship type")?);
            while self.eat_if(&TokenKind::Pipe) {
                // both :T1|T2 and :T1|:T2 are accepted
                self.eat_if(&TokenKind::Colon);
                edge.types.push(self.identifier("relationship type")?);
            }
        }
        if self.eat_if(&TokenKind::Star) {
            edge.hops = Some(self.parse_hop_range()?);
        }
        if self.peek() == &TokenKind::LBrace {
            edge.props = self.parse_property_map()?;
        }
        self.eat(&TokenKind::RBracket)?;
        self.eat(&TokenKind::Minus)?;

        let outgoing_tail = self.eat_if(&TokenKind::Gt);
        edge.direction = match (incoming_head, outgoing_tail) {
            (true, false) => Direction::Incoming,
            (false, true) => Direction::Outgoing,
            (false, false) => Direction::Both,
            (true, true) => {
                return Err(QueryError::parse(
                    "edge cannot point both ways",
                    self.here(),
                ));
            }
        };
        Ok(edge)
    }

    fn parse_hop_range(&mut self) -> QueryResult<HopRange> {
        // *  |  *n  |  *min..max  |  *..max  |  *min..
        let min = if let TokenKind::Integer(n) = self.peek() {
            let n = *n;
            self.advance();
            Some(n)
        } else {
            None
        };
        if self.eat_if(&TokenKind::DotDot) {
            let max = if let TokenKind::Integer(n) = self.peek() {
                let n = *n;
                self.advance();
                Some(u32::try_from(n).map_err(|_| {
                    QueryError::parse("hop bound out of range", self.here())
                })?)
            } else {
                None
            };
            let min = min.unwrap_or(1);
            let min = u32::try_from(min)
                .map_err(|_| QueryError::parse("hop bound out of range", self.here()))?;
            Ok(HopRange { min, max })
        } else {
            match min {
                // bare `*` is one-or-more
                None => Ok(HopRange { min: 1, max: None }),
                Some(n) => {
                    let n = u32::try_from(n)
                        .map_err(|_| QueryError::parse("hop bound out of range", self.here()))?;
                    Ok(HopRange {
                        min: n,
                        max: Some(n),
                    })
                }
            }
        }
    }

    fn parse_property_map(&mut self) -> QueryResult<Vec<(String, Expr)>> {
        self.eat(&TokenKind::LBrace)?;
        let mut props = Vec::new();
        if self.peek() != &TokenKind::RBrace {
            loop {
                let key = self.identifier("property key")?;
                self.eat(&TokenKind::Colon)?;
                let value = self.parse_expr()?;
                props.push((key, value));
                if !self.eat_if(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.eat(&TokenKind::RBrace)?;
        Ok(props)
    }

    // -----------------------------------------------------------------
    // Expressions (precedence climbing)
    // -----------------------------------------------------------------

    fn parse_expr(&mut self) -> QueryResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> QueryResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword_if("OR") {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> QueryResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword_if("AND") {
            let rhs = self.parse_not()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> QueryResult<Expr> {
        if self.eat_keyword_if("NOT") {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> QueryResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Neq => BinaryOp::Neq,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> QueryResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> QueryResult<Expr> {
        let mut lhs = self.parse_power()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_power()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_power(&mut self) -> QueryResult<Expr> {
        let lhs = self.parse_unary()?;
        if self.eat_if(&TokenKind::Caret) {
            // right-associative
            let rhs = self.parse_power()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> QueryResult<Expr> {
        if self.eat_if(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> QueryResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.peek() == &TokenKind::Dot {
                let alias = match &expr {
                    Expr::Ident(a) => a.clone(),
                    _ => {
                        return Err(QueryError::parse(
                            "property access requires an alias",
                            self.here(),
                        ));
                    }
                };
                self.advance();
                let key = self.identifier("property key")?;
                expr = Expr::Property { alias, key };
            } else if self.at_keyword("IS") {
                // IS NULL / IS NOT NULL
                self.advance();
                let negated = self.eat_keyword_if("NOT");
                self.eat_keyword("NULL")?;
                expr = Expr::FnCall {
                    name: if negated { "isNotNull" } else { "isNull" }.to_string(),
                    args: vec![expr],
                    distinct: false,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> QueryResult<Expr> {
        match self.peek().clone() {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(n)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Value::Double(f)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.eat(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if self.peek() != &TokenKind::RBracket {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat_if(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.eat(&TokenKind::RBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::Ident(name) => {
                if name.eq_ignore_ascii_case("true") {
                    self.advance();
                    return Ok(Expr::Literal(Value::Bool(true)));
                }
                if name.eq_ignore_ascii_case("false") {
                    self.advance();
                    return Ok(Expr::Literal(Value::Bool(false)));
                }
                if name.eq_ignore_ascii_case("null") {
                    self.advance();
                    return Ok(Expr::Literal(Value::Null));
                }
                self.advance();
                if self.peek() == &TokenKind::LParen {
                    self.parse_call_args(name)
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            other => Err(QueryError::parse(
                format!("unexpected token {other:?} in expression"),
                self.here(),
            )),
        }
    }

    fn parse_call_args(&mut self, name: String) -> QueryResult<Expr> {
        self.eat(&TokenKind::LParen)?;
        // count(*) counts records rather than values
        if name.eq_ignore_ascii_case("count") && self.peek() == &TokenKind::Star {
            self.advance();
            self.eat(&TokenKind::RParen)?;
            return Ok(Expr::FnCall {
                name,
                args: Vec::new(),
                distinct: false,
            });
        }
        let distinct = self.eat_keyword_if("DISTINCT");
        let mut args = Vec::new();
        if self.peek() != &TokenKind::RParen {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat_if(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.eat(&TokenKind::RParen)?;
        Ok(Expr::FnCall {
            name,
            args,
            distinct,
        })
    }
}
