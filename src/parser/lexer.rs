//! Tokenizer for the Cypher-like grammar.
//!
//! Keywords are recognized case-insensitively by the parser; the
//! lexer only distinguishes identifiers, literals, and punctuation.
//! Every token carries its byte offset for error reporting.

use crate::error::{QueryError, QueryResult};

/// Token payloads
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Integer(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Pipe,
    Dot,
    DotDot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

/// A token with its byte offset into the query text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

/// Tokenize the whole query up front
pub fn tokenize(input: &str) -> QueryResult<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let pos = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '/' if bytes.get(i + 1) == Some(&b'/') => {
                // line comment
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, pos });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, pos });
                i += 1;
            }
            '[' => {
                tokens.push(Token { kind: TokenKind::LBracket, pos });
                i += 1;
            }
            ']' => {
                tokens.push(Token { kind: TokenKind::RBracket, pos });
                i += 1;
            }
            '{' => {
                tokens.push(Token { kind: TokenKind::LBrace, pos });
                i += 1;
            }
            '}' => {
                tokens.push(Token { kind: TokenKind::RBrace, pos });
                i += 1;
            }
            ',' => {
                tokens.push(Token { kind: TokenKind::Comma, pos });
                i += 1;
            }
            ':' => {
                tokens.push(Token { kind: TokenKind::Colon, pos });
                i += 1;
            }
            '|' => {
                tokens.push(Token { kind: TokenKind::Pipe, pos });
                i += 1;
            }
            '+' => {
                tokens.push(Token { kind: TokenKind::Plus, pos });
                i += 1;
            }
            '-' => {
                tokens.push(Token { kind: TokenKind::Minus, pos });
                i += 1;
            }
            '*' => {
                tokens.push(Token { kind: TokenKind::Star, pos });
                i += 1;
            }
            '/' => {
                tokens.push(Token { kind: TokenKind::Slash, pos });
                i += 1;
            }
            '%' => {
                tokens.push(Token { kind: TokenKind::Percent, pos });
                i += 1;
            }
            '^' => {
                tokens.push(Token { kind: TokenKind::Caret, pos });
                i += 1;
            }
            '=' => {
                tokens.push(Token { kind: TokenKind::Eq, pos });
                i += 1;
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::Le, pos });
                    i += 2;
                } else if bytes.get(i + 1) == Some(&b'>') {
                    tokens.push(Token { kind: TokenKind::Neq, pos });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Lt, pos });
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::Ge, pos });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Gt, pos });
                    i += 1;
                }
            }
            '.' => {
                if bytes.get(i + 1) == Some(&b'.') {
                    tokens.push(Token { kind: TokenKind::DotDot, pos });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Dot, pos });
                    i += 1;
                }
            }
            '\'' | '"' => {
                let (s, consumed) = lex_string(&input[i..], c, pos)?;
                tokens.push(Token { kind: TokenKind::Str(s), pos });
                i += consumed;
            }
            c if c.is_ascii_digit() => {
                let (kind, consumed) = lex_number(&input[i..], pos)?;
                tokens.push(Token { kind, pos });
                i += consumed;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() {
                    let ch = bytes[i] as char;
                    if ch.is_alphanumeric() || ch == '_' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(input[start..i].to_string()),
                    pos,
                });
            }
            other => {
                return Err(QueryError::parse(
                    format!("unexpected character '{other}'"),
                    pos,
                ));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: bytes.len(),
    });
    Ok(tokens)
}

fn lex_string(rest: &str, quote: char, pos: usize) -> QueryResult<(String, usize)> {
    let mut out = String::new();
    let mut chars = rest.char_indices().skip(1).peekable();
    while let Some((idx, c)) = chars.next() {
        if c == quote {
            return Ok((out, idx + quote.len_utf8()));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            }
        } else {
            out.push(c);
        }
    }
    Err(QueryError::parse("unterminated string literal", pos))
}

fn lex_number(rest: &str, pos: usize) -> QueryResult<(TokenKind, usize)> {
    let bytes = rest.as_bytes();
    let mut end = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    // a '..' after the integer part is a hop range, not a float
    let mut is_float = false;
    if end < bytes.len() && bytes[end] == b'.' && bytes.get(end + 1) != Some(&b'.') {
        if bytes
            .get(end + 1)
            .is_some_and(|b| b.is_ascii_digit())
        {
            is_float = true;
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if bytes.get(exp_end) == Some(&b'+') || bytes.get(exp_end) == Some(&b'-') {
            exp_end += 1;
        }
        if bytes.get(exp_end).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            end = exp_end;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }

    let text = &rest[..end];
    if is_float {
        let f: f64 = text
            .parse()
            .map_err(|_| QueryError::parse(format!("bad float literal '{text}'"), pos))?;
        Ok((TokenKind::Float(f), end))
    } else {
        let n: i64 = text
            .parse()
            .map_err(|_| QueryError::parse(format!("integer literal '{text}' out of range"), pos))?;
        Ok((TokenKind::Integer(n), end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_pattern_tokens() {
        let ks = kinds("(a:Person)-[:KNOWS]->(b)");
        assert_eq!(
            ks,
            vec![
                TokenKind::LParen,
                TokenKind::Ident("a".into()),
                TokenKind::Colon,
                TokenKind::Ident("Person".into()),
                TokenKind::RParen,
                TokenKind::Minus,
                TokenKind::LBracket,
                TokenKind::Colon,
                TokenKind::Ident("KNOWS".into()),
                TokenKind::RBracket,
                TokenKind::Minus,
                TokenKind::Gt,
                TokenKind::LParen,
                TokenKind::Ident("b".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_ranges() {
        assert_eq!(
            kinds("1.5 2 *2..3"),
            vec![
                TokenKind::Float(1.5),
                TokenKind::Integer(2),
                TokenKind::Star,
                TokenKind::Integer(2),
                TokenKind::DotDot,
                TokenKind::Integer(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b" 'c'"#),
            vec![
                TokenKind::Str("a\"b".into()),
                TokenKind::Str("c".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds("< <= > >= = <>"),
            vec![
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string_errors() {
        assert!(matches!(
            tokenize("RETURN 'oops"),
            Err(QueryError::Parse { .. })
        ));
    }

    #[test]
    fn test_line_comment_skipped() {
        assert_eq!(
            kinds("RETURN 1 // trailing"),
            vec![
                TokenKind::Ident("RETURN".into()),
                TokenKind::Integer(1),
                TokenKind::Eof
            ]
        );
    }
}
