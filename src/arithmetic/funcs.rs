//! Scalar function repository.
//!
//! Name → function resolution happens once at plan-build time; the
//! resolved pointer is cached on the expression node so execution
//! never dispatches on strings. Names are case-insensitive.
//!
//! All functions are pure; Null propagates through arithmetic and
//! string functions, while the predicate functions (isNull,
//! isNotNull) and the three-valued boolean connectives handle Null
//! explicitly.

use crate::error::{QueryError, QueryResult};
use crate::value::{Value, ValueKind};
use rand::Rng;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Signature of every scalar builtin
pub type ScalarFn = fn(&[Value]) -> QueryResult<Value>;

/// Registry entry: resolved function plus its arity contract
#[derive(Clone, Copy)]
pub struct ScalarFuncDesc {
    pub name: &'static str,
    pub func: ScalarFn,
    pub min_args: usize,
    /// None = variadic
    pub max_args: Option<usize>,
}

static REGISTRY: OnceLock<HashMap<String, ScalarFuncDesc>> = OnceLock::new();

/// Case-insensitive lookup
pub fn lookup(name: &str) -> Option<ScalarFuncDesc> {
    registry().get(&name.to_lowercase()).copied()
}

pub fn is_scalar(name: &str) -> bool {
    registry().contains_key(&name.to_lowercase())
}

fn registry() -> &'static HashMap<String, ScalarFuncDesc> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        let mut add = |name: &'static str, func: ScalarFn, min: usize, max: Option<usize>| {
            map.insert(
                name.to_lowercase(),
                ScalarFuncDesc {
                    name,
                    func,
                    min_args: min,
                    max_args: max,
                },
            );
        };

        // operators
        add("add", fn_add, 2, Some(2));
        add("sub", fn_sub, 2, Some(2));
        add("mul", fn_mul, 2, Some(2));
        add("div", fn_div, 2, Some(2));
        add("mod", fn_mod, 2, Some(2));
        add("neg", fn_neg, 1, Some(1));
        add("eq", fn_eq, 2, Some(2));
        add("neq", fn_neq, 2, Some(2));
        add("lt", fn_lt, 2, Some(2));
        add("le", fn_le, 2, Some(2));
        add("gt", fn_gt, 2, Some(2));
        add("ge", fn_ge, 2, Some(2));
        add("and", fn_and, 2, Some(2));
        add("or", fn_or, 2, Some(2));
        add("not", fn_not, 1, Some(1));

        // arithmetic
        add("abs", fn_abs, 1, Some(1));
        add("ceil", fn_ceil, 1, Some(1));
        add("floor", fn_floor, 1, Some(1));
        add("round", fn_round, 1, Some(1));
        add("sign", fn_sign, 1, Some(1));
        add("signum", fn_sign, 1, Some(1));
        add("pow", fn_pow, 2, Some(2));
        add("sqrt", fn_sqrt, 1, Some(1));
        add("log", fn_log, 1, Some(1));
        add("exp", fn_exp, 1, Some(1));
        add("rand", fn_rand, 0, Some(0));

        // strings
        add("left", fn_left, 2, Some(2));
        add("right", fn_right, 2, Some(2));
        add("ltrim", fn_ltrim, 1, Some(1));
        add("rtrim", fn_rtrim, 1, Some(1));
        add("trim", fn_trim, 1, Some(1));
        add("reverse", fn_reverse, 1, Some(1));
        add("substring", fn_substring, 2, Some(3));
        add("toLower", fn_to_lower, 1, Some(1));
        add("toUpper", fn_to_upper, 1, Some(1));
        add("toString", fn_to_string, 1, Some(1));
        add("replace", fn_replace, 3, Some(3));
        add("split", fn_split, 2, Some(2));
        add("concat", fn_concat, 1, None);
        add("size", fn_size, 1, Some(1));

        // predicates
        add("isNull", fn_is_null, 1, Some(1));
        add("isNotNull", fn_is_not_null, 1, Some(1));

        // entity accessors
        add("id", fn_id, 1, Some(1));

        map
    })
}

fn type_mismatch(fname: &str, v: &Value) -> QueryError {
    QueryError::type_error(format!("{fname}: unexpected {} operand", v.kind()))
}

fn numeric_pair(fname: &str, a: &Value, b: &Value) -> QueryResult<Option<(f64, f64, bool)>> {
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    let both_int = a.kind() == ValueKind::Int && b.kind() == ValueKind::Int;
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(Some((x, y, both_int))),
        _ => {
            let bad = if a.is_numeric() { b } else { a };
            Err(type_mismatch(fname, bad))
        }
    }
}

// ---------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------

fn fn_add(args: &[Value]) -> QueryResult<Value> {
    match (&args[0], &args[1]) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::List(out))
        }
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| QueryError::type_error("integer overflow in add")),
        (a, b) => match numeric_pair("add", a, b)? {
            Some((x, y, _)) => Ok(Value::Double(x + y)),
            None => Ok(Value::Null),
        },
    }
}

fn fn_sub(args: &[Value]) -> QueryResult<Value> {
    match (&args[0], &args[1]) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => a
            .checked_sub(*b)
            .map(Value::Int)
            .ok_or_else(|| QueryError::type_error("integer overflow in sub")),
        (a, b) => match numeric_pair("sub", a, b)? {
            Some((x, y, _)) => Ok(Value::Double(x - y)),
            None => Ok(Value::Null),
        },
    }
}

fn fn_mul(args: &[Value]) -> QueryResult<Value> {
    match (&args[0], &args[1]) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => a
            .checked_mul(*b)
            .map(Value::Int)
            .ok_or_else(|| QueryError::type_error("integer overflow in mul")),
        (a, b) => match numeric_pair("mul", a, b)? {
            Some((x, y, _)) => Ok(Value::Double(x * y)),
            None => Ok(Value::Null),
        },
    }
}

fn fn_div(args: &[Value]) -> QueryResult<Value> {
    match (&args[0], &args[1]) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(QueryError::type_error("division by zero"));
            }
            Ok(Value::Int(a / b))
        }
        (a, b) => match numeric_pair("div", a, b)? {
            // IEEE semantics once either side is a double
            Some((x, y, _)) => Ok(Value::Double(x / y)),
            None => Ok(Value::Null),
        },
    }
}

fn fn_mod(args: &[Value]) -> QueryResult<Value> {
    match (&args[0], &args[1]) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(QueryError::type_error("division by zero"));
            }
            Ok(Value::Int(a % b))
        }
        (a, b) => match numeric_pair("mod", a, b)? {
            Some((x, y, _)) => Ok(Value::Double(x % y)),
            None => Ok(Value::Null),
        },
    }
}

fn fn_neg(args: &[Value]) -> QueryResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => Ok(Value::Int(-i)),
        Value::Double(d) => Ok(Value::Double(-d)),
        other => Err(type_mismatch("neg", other)),
    }
}

fn compare_to_bool(
    a: &Value,
    b: &Value,
    pred: fn(std::cmp::Ordering) -> bool,
) -> Value {
    match a.compare(b) {
        Some(ord) => Value::Bool(pred(ord)),
        None => Value::Null,
    }
}

fn fn_eq(args: &[Value]) -> QueryResult<Value> {
    Ok(compare_to_bool(&args[0], &args[1], |o| o.is_eq()))
}

fn fn_neq(args: &[Value]) -> QueryResult<Value> {
    Ok(compare_to_bool(&args[0], &args[1], |o| o.is_ne()))
}

fn fn_lt(args: &[Value]) -> QueryResult<Value> {
    Ok(compare_to_bool(&args[0], &args[1], |o| o.is_lt()))
}

fn fn_le(args: &[Value]) -> QueryResult<Value> {
    Ok(compare_to_bool(&args[0], &args[1], |o| o.is_le()))
}

fn fn_gt(args: &[Value]) -> QueryResult<Value> {
    Ok(compare_to_bool(&args[0], &args[1], |o| o.is_gt()))
}

fn fn_ge(args: &[Value]) -> QueryResult<Value> {
    Ok(compare_to_bool(&args[0], &args[1], |o| o.is_ge()))
}

fn as_tribool(v: &Value) -> QueryResult<Option<bool>> {
    match v {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(type_mismatch("boolean operator", other)),
    }
}

fn fn_and(args: &[Value]) -> QueryResult<Value> {
    let (a, b) = (as_tribool(&args[0])?, as_tribool(&args[1])?);
    Ok(match (a, b) {
        (Some(false), _) | (_, Some(false)) => Value::Bool(false),
        (Some(true), Some(true)) => Value::Bool(true),
        _ => Value::Null,
    })
}

fn fn_or(args: &[Value]) -> QueryResult<Value> {
    let (a, b) = (as_tribool(&args[0])?, as_tribool(&args[1])?);
    Ok(match (a, b) {
        (Some(true), _) | (_, Some(true)) => Value::Bool(true),
        (Some(false), Some(false)) => Value::Bool(false),
        _ => Value::Null,
    })
}

fn fn_not(args: &[Value]) -> QueryResult<Value> {
    Ok(match as_tribool(&args[0])? {
        Some(b) => Value::Bool(!b),
        None => Value::Null,
    })
}

// ---------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------

fn fn_abs(args: &[Value]) -> QueryResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Double(d) => Ok(Value::Double(d.abs())),
        other => Err(type_mismatch("abs", other)),
    }
}

fn unary_double(fname: &'static str, f: fn(f64) -> f64) -> impl Fn(&[Value]) -> QueryResult<Value> {
    move |args| match &args[0] {
        Value::Null => Ok(Value::Null),
        v => match v.as_f64() {
            Some(x) => Ok(Value::Double(f(x))),
            None => Err(type_mismatch(fname, v)),
        },
    }
}

fn fn_ceil(args: &[Value]) -> QueryResult<Value> {
    unary_double("ceil", f64::ceil)(args)
}

fn fn_floor(args: &[Value]) -> QueryResult<Value> {
    unary_double("floor", f64::floor)(args)
}

fn fn_round(args: &[Value]) -> QueryResult<Value> {
    unary_double("round", f64::round)(args)
}

fn fn_sqrt(args: &[Value]) -> QueryResult<Value> {
    unary_double("sqrt", f64::sqrt)(args)
}

fn fn_log(args: &[Value]) -> QueryResult<Value> {
    unary_double("log", f64::ln)(args)
}

fn fn_exp(args: &[Value]) -> QueryResult<Value> {
    unary_double("exp", f64::exp)(args)
}

fn fn_sign(args: &[Value]) -> QueryResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => Ok(Value::Int(i.signum())),
        Value::Double(d) => Ok(Value::Int(if *d > 0.0 {
            1
        } else if *d < 0.0 {
            -1
        } else {
            0
        })),
        other => Err(type_mismatch("sign", other)),
    }
}

fn fn_pow(args: &[Value]) -> QueryResult<Value> {
    match numeric_pair("pow", &args[0], &args[1])? {
        Some((x, y, _)) => Ok(Value::Double(x.powf(y))),
        None => Ok(Value::Null),
    }
}

fn fn_rand(_args: &[Value]) -> QueryResult<Value> {
    Ok(Value::Double(rand::thread_rng().gen::<f64>()))
}

// ---------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------

fn string_arg<'a>(fname: &str, v: &'a Value) -> QueryResult<Option<&'a str>> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(type_mismatch(fname, other)),
    }
}

fn int_arg(fname: &str, v: &Value) -> QueryResult<Option<i64>> {
    match v {
        Value::Null => Ok(None),
        Value::Int(i) => Ok(Some(*i)),
        other => Err(type_mismatch(fname, other)),
    }
}

fn fn_left(args: &[Value]) -> QueryResult<Value> {
    let (Some(s), Some(n)) = (string_arg("left", &args[0])?, int_arg("left", &args[1])?) else {
        return Ok(Value::Null);
    };
    if n < 0 {
        return Err(QueryError::type_error("left: negative length"));
    }
    Ok(Value::String(s.chars().take(n as usize).collect()))
}

fn fn_right(args: &[Value]) -> QueryResult<Value> {
    let (Some(s), Some(n)) = (string_arg("right", &args[0])?, int_arg("right", &args[1])?) else {
        return Ok(Value::Null);
    };
    if n < 0 {
        return Err(QueryError::type_error("right: negative length"));
    }
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n as usize);
    Ok(Value::String(chars[start..].iter().collect()))
}

fn fn_ltrim(args: &[Value]) -> QueryResult<Value> {
    Ok(match string_arg("ltrim", &args[0])? {
        Some(s) => Value::String(s.trim_start().to_string()),
        None => Value::Null,
    })
}

fn fn_rtrim(args: &[Value]) -> QueryResult<Value> {
    Ok(match string_arg("rtrim", &args[0])? {
        Some(s) => Value::String(s.trim_end().to_string()),
        None => Value::Null,
    })
}

fn fn_trim(args: &[Value]) -> QueryResult<Value> {
    Ok(match string_arg("trim", &args[0])? {
        Some(s) => Value::String(s.trim().to_string()),
        None => Value::Null,
    })
}

fn fn_reverse(args: &[Value]) -> QueryResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
        other => Err(type_mismatch("reverse", other)),
    }
}

fn fn_substring(args: &[Value]) -> QueryResult<Value> {
    let (Some(s), Some(start)) = (
        string_arg("substring", &args[0])?,
        int_arg("substring", &args[1])?,
    ) else {
        return Ok(Value::Null);
    };
    if start < 0 {
        return Err(QueryError::type_error("substring: negative start"));
    }
    let len = match args.get(2) {
        Some(v) => match int_arg("substring", v)? {
            Some(l) if l < 0 => {
                return Err(QueryError::type_error("substring: negative length"));
            }
            Some(l) => Some(l as usize),
            None => return Ok(Value::Null),
        },
        None => None,
    };
    let iter = s.chars().skip(start as usize);
    let out: String = match len {
        Some(l) => iter.take(l).collect(),
        None => iter.collect(),
    };
    Ok(Value::String(out))
}

fn fn_to_lower(args: &[Value]) -> QueryResult<Value> {
    Ok(match string_arg("toLower", &args[0])? {
        Some(s) => Value::String(s.to_lowercase()),
        None => Value::Null,
    })
}

fn fn_to_upper(args: &[Value]) -> QueryResult<Value> {
    Ok(match string_arg("toUpper", &args[0])? {
        Some(s) => Value::String(s.to_uppercase()),
        None => Value::Null,
    })
}

fn fn_to_string(args: &[Value]) -> QueryResult<Value> {
    Ok(match &args[0] {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Int(i) => Value::String(i.to_string()),
        Value::Double(d) => Value::String(crate::resultset::serialize::format_double(*d)),
        other => return Err(type_mismatch("toString", other)),
    })
}

fn fn_replace(args: &[Value]) -> QueryResult<Value> {
    let (Some(s), Some(search), Some(repl)) = (
        string_arg("replace", &args[0])?,
        string_arg("replace", &args[1])?,
        string_arg("replace", &args[2])?,
    ) else {
        return Ok(Value::Null);
    };
    Ok(Value::String(s.replace(search, repl)))
}

fn fn_split(args: &[Value]) -> QueryResult<Value> {
    let (Some(s), Some(delim)) = (
        string_arg("split", &args[0])?,
        string_arg("split", &args[1])?,
    ) else {
        return Ok(Value::Null);
    };
    let parts = s
        .split(delim)
        .map(|p| Value::String(p.to_string()))
        .collect();
    Ok(Value::List(parts))
}

fn fn_concat(args: &[Value]) -> QueryResult<Value> {
    let mut out = String::new();
    for v in args {
        match string_arg("concat", v)? {
            Some(s) => out.push_str(s),
            None => return Ok(Value::Null),
        }
    }
    Ok(Value::String(out))
}

fn fn_size(args: &[Value]) -> QueryResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        other => Err(type_mismatch("size", other)),
    }
}

// ---------------------------------------------------------------------
// Predicates and accessors
// ---------------------------------------------------------------------

fn fn_is_null(args: &[Value]) -> QueryResult<Value> {
    Ok(Value::Bool(args[0].is_null()))
}

fn fn_is_not_null(args: &[Value]) -> QueryResult<Value> {
    Ok(Value::Bool(!args[0].is_null()))
}

fn fn_id(args: &[Value]) -> QueryResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Node(id) | Value::Edge(id) => Ok(Value::Int(*id as i64)),
        other => Err(type_mismatch("id", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> QueryResult<Value> {
        (lookup(name).unwrap().func)(args)
    }

    #[test]
    fn test_lookup_case_insensitive() {
        assert!(lookup("ToUpper").is_some());
        assert!(lookup("TOUPPER").is_some());
        assert!(lookup("no_such_fn").is_none());
    }

    #[test]
    fn test_add_promotion() {
        assert_eq!(call("add", &[Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(3));
        assert_eq!(
            call("add", &[Value::Int(1), Value::Double(0.5)]).unwrap(),
            Value::Double(1.5)
        );
        assert_eq!(
            call("add", &[Value::String("a".into()), Value::String("b".into())]).unwrap(),
            Value::String("ab".into())
        );
        assert_eq!(call("add", &[Value::Null, Value::Int(1)]).unwrap(), Value::Null);
    }

    #[test]
    fn test_int_division_by_zero_is_type_error() {
        assert!(matches!(
            call("div", &[Value::Int(1), Value::Int(0)]),
            Err(QueryError::Type(_))
        ));
        // doubles follow IEEE
        let v = call("div", &[Value::Double(1.0), Value::Int(0)]).unwrap();
        assert_eq!(v, Value::Double(f64::INFINITY));
    }

    #[test]
    fn test_comparisons_and_null() {
        assert_eq!(call("lt", &[Value::Int(1), Value::Int(2)]).unwrap(), Value::Bool(true));
        assert_eq!(call("eq", &[Value::Null, Value::Int(2)]).unwrap(), Value::Null);
        // heterogeneous kinds are incomparable
        assert_eq!(
            call("eq", &[Value::Int(1), Value::String("1".into())]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(call("and", &[Value::Bool(false), Value::Null]).unwrap(), Value::Bool(false));
        assert_eq!(call("and", &[Value::Bool(true), Value::Null]).unwrap(), Value::Null);
        assert_eq!(call("or", &[Value::Bool(true), Value::Null]).unwrap(), Value::Bool(true));
        assert_eq!(call("or", &[Value::Bool(false), Value::Null]).unwrap(), Value::Null);
        assert_eq!(call("not", &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            call("left", &[Value::String("hello".into()), Value::Int(2)]).unwrap(),
            Value::String("he".into())
        );
        assert_eq!(
            call("right", &[Value::String("hello".into()), Value::Int(2)]).unwrap(),
            Value::String("lo".into())
        );
        assert_eq!(
            call("substring", &[Value::String("hello".into()), Value::Int(1), Value::Int(3)]).unwrap(),
            Value::String("ell".into())
        );
        assert_eq!(
            call("reverse", &[Value::String("abc".into())]).unwrap(),
            Value::String("cba".into())
        );
        assert_eq!(
            call("split", &[Value::String("a,b".into()), Value::String(",".into())]).unwrap(),
            Value::List(vec![Value::String("a".into()), Value::String("b".into())])
        );
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(call("abs", &[Value::Int(-5)]).unwrap(), Value::Int(5));
        assert_eq!(call("ceil", &[Value::Double(1.2)]).unwrap(), Value::Double(2.0));
        assert_eq!(call("floor", &[Value::Double(1.8)]).unwrap(), Value::Double(1.0));
        assert_eq!(call("sign", &[Value::Double(-0.5)]).unwrap(), Value::Int(-1));
        assert_eq!(call("pow", &[Value::Int(2), Value::Int(10)]).unwrap(), Value::Double(1024.0));
    }

    #[test]
    fn test_rand_in_unit_interval() {
        for _ in 0..16 {
            let Value::Double(x) = call("rand", &[]).unwrap() else {
                panic!("rand must return a double");
            };
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_predicates_see_null() {
        assert_eq!(call("isNull", &[Value::Null]).unwrap(), Value::Bool(true));
        assert_eq!(call("isNotNull", &[Value::Null]).unwrap(), Value::Bool(false));
        assert_eq!(call("isNull", &[Value::Int(0)]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_type_mismatch_is_error() {
        assert!(matches!(
            call("abs", &[Value::String("x".into())]),
            Err(QueryError::Type(_))
        ));
        assert!(matches!(
            call("and", &[Value::Int(1), Value::Bool(true)]),
            Err(QueryError::Type(_))
        ));
    }
}
