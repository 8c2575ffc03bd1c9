//! Aggregate function contexts.
//!
//! Each aggregate call site owns one context per group; the state is
//! a tagged variant per aggregate kind. `step` folds one argument
//! tuple in, `finalize` freezes the result, and a finalized context
//! is never stepped again.
//!
//! Null inputs are skipped (so `collect` never collects Null and
//! `count` counts only non-Null values); `count(*)` steps with an
//! empty argument list and counts records. The `distinct` flag
//! deduplicates argument tuples before stepping, with an exact
//! compare behind the fingerprint to rule out hash collisions.

use crate::error::{QueryError, QueryResult};
use crate::value::Value;
use std::collections::HashMap;

/// Aggregate kinds known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Collect,
    PercentileCont,
    PercentileDisc,
    StDev,
    StDevP,
}

/// Case-insensitive aggregate lookup.
/// Returns the kind plus whether the name itself forces DISTINCT
/// (countDistinct, collectDistinct).
pub fn lookup(name: &str) -> Option<(AggregateFunction, bool)> {
    match name.to_lowercase().as_str() {
        "count" => Some((AggregateFunction::Count, false)),
        "countdistinct" => Some((AggregateFunction::Count, true)),
        "sum" => Some((AggregateFunction::Sum, false)),
        "avg" => Some((AggregateFunction::Avg, false)),
        "min" => Some((AggregateFunction::Min, false)),
        "max" => Some((AggregateFunction::Max, false)),
        "collect" => Some((AggregateFunction::Collect, false)),
        "collectdistinct" => Some((AggregateFunction::Collect, true)),
        "percentilecont" => Some((AggregateFunction::PercentileCont, false)),
        "percentiledisc" => Some((AggregateFunction::PercentileDisc, false)),
        "stdev" => Some((AggregateFunction::StDev, false)),
        "stdevp" => Some((AggregateFunction::StDevP, false)),
        _ => None,
    }
}

pub fn is_aggregate(name: &str) -> bool {
    lookup(name).is_some()
}

/// Per-kind running state
#[derive(Debug, Clone)]
enum AggState {
    Count {
        count: i64,
    },
    Sum {
        int_sum: i64,
        float_sum: f64,
        saw_float: bool,
    },
    Avg {
        sum: f64,
        count: i64,
    },
    Extreme {
        want_max: bool,
        best: Option<Value>,
    },
    Collect {
        items: Vec<Value>,
    },
    Percentile {
        values: Vec<f64>,
        pct: f64,
        continuous: bool,
    },
    StDev {
        values: Vec<f64>,
        population: bool,
    },
}

/// One aggregate call site's state for one group
#[derive(Debug, Clone)]
pub struct AggregateCtx {
    kind: AggregateFunction,
    distinct: bool,
    state: AggState,
    /// fingerprint -> argument tuples already stepped (exact compare)
    seen: HashMap<u64, Vec<Vec<Value>>>,
    result: Option<Value>,
}

impl AggregateCtx {
    pub fn new(kind: AggregateFunction, distinct: bool) -> Self {
        let state = match kind {
            AggregateFunction::Count => AggState::Count { count: 0 },
            AggregateFunction::Sum => AggState::Sum {
                int_sum: 0,
                float_sum: 0.0,
                saw_float: false,
            },
            AggregateFunction::Avg => AggState::Avg { sum: 0.0, count: 0 },
            AggregateFunction::Min => AggState::Extreme {
                want_max: false,
                best: None,
            },
            AggregateFunction::Max => AggState::Extreme {
                want_max: true,
                best: None,
            },
            AggregateFunction::Collect => AggState::Collect { items: Vec::new() },
            AggregateFunction::PercentileCont => AggState::Percentile {
                values: Vec::new(),
                pct: 0.0,
                continuous: true,
            },
            AggregateFunction::PercentileDisc => AggState::Percentile {
                values: Vec::new(),
                pct: 0.0,
                continuous: false,
            },
            AggregateFunction::StDev => AggState::StDev {
                values: Vec::new(),
                population: false,
            },
            AggregateFunction::StDevP => AggState::StDev {
                values: Vec::new(),
                population: true,
            },
        };
        AggregateCtx {
            kind,
            distinct,
            state,
            seen: HashMap::new(),
            result: None,
        }
    }

    /// A fresh context with the same kind and distinct flag
    pub fn fresh(&self) -> Self {
        AggregateCtx::new(self.kind, self.distinct)
    }

    pub fn is_finalized(&self) -> bool {
        self.result.is_some()
    }

    fn numeric(&self, v: &Value, fname: &str) -> QueryResult<f64> {
        v.as_f64().ok_or_else(|| {
            QueryError::type_error(format!("{fname}: non-numeric input {}", v.kind()))
        })
    }

    /// Fold one argument tuple into the running state
    pub fn step(&mut self, args: &[Value]) -> QueryResult<()> {
        debug_assert!(self.result.is_none(), "step after finalize");

        // Null inputs never contribute
        if !args.is_empty() && args[0].is_null() {
            return Ok(());
        }

        if self.distinct {
            let fp = Value::fingerprint(args);
            let bucket = self.seen.entry(fp).or_default();
            if bucket.iter().any(|prev| {
                prev.len() == args.len()
                    && prev.iter().zip(args.iter()).all(|(a, b)| a.group_eq(b))
            }) {
                return Ok(());
            }
            bucket.push(args.to_vec());
        }

        match &mut self.state {
            AggState::Count { count } => {
                *count += 1;
            }
            AggState::Sum {
                int_sum,
                float_sum,
                saw_float,
            } => match &args[0] {
                Value::Int(i) => {
                    *int_sum = int_sum.wrapping_add(*i);
                    *float_sum += *i as f64;
                }
                Value::Double(d) => {
                    *saw_float = true;
                    *float_sum += d;
                }
                other => {
                    return Err(QueryError::type_error(format!(
                        "sum: non-numeric input {}",
                        other.kind()
                    )));
                }
            },
            AggState::Avg { sum, count } => {
                let x = args[0].as_f64().ok_or_else(|| {
                    QueryError::type_error(format!("avg: non-numeric input {}", args[0].kind()))
                })?;
                *sum += x;
                *count += 1;
            }
            AggState::Extreme { want_max, best } => {
                let candidate = &args[0];
                let replace = match best {
                    None => true,
                    Some(current) => match candidate.compare(current) {
                        Some(ord) => {
                            if *want_max {
                                ord.is_gt()
                            } else {
                                ord.is_lt()
                            }
                        }
                        None => false,
                    },
                };
                if replace {
                    *best = Some(candidate.clone());
                }
            }
            AggState::Collect { items } => {
                items.push(args[0].clone());
            }
            AggState::Percentile {
                values,
                pct,
                continuous: _,
            } => {
                if args.len() < 2 {
                    return Err(QueryError::type_error(
                        "percentile requires a value and a percentile argument",
                    ));
                }
                let v = args[0]
                    .as_f64()
                    .ok_or_else(|| QueryError::type_error("percentile: non-numeric input"))?;
                let p = args[1]
                    .as_f64()
                    .ok_or_else(|| QueryError::type_error("percentile: non-numeric percentile"))?;
                if !(0.0..=1.0).contains(&p) {
                    return Err(QueryError::type_error(
                        "percentile must be between 0.0 and 1.0",
                    ));
                }
                *pct = p;
                values.push(v);
            }
            AggState::StDev { values, .. } => {
                let kind = self.kind;
                let v = args[0].as_f64().ok_or_else(|| {
                    QueryError::type_error(format!("{kind:?}: non-numeric input"))
                })?;
                values.push(v);
            }
        }
        Ok(())
    }

    /// Freeze the result; further `result()` calls return it
    pub fn finalize(&mut self) {
        if self.result.is_some() {
            return;
        }
        let result = match &mut self.state {
            AggState::Count { count } => Value::Int(*count),
            AggState::Sum {
                int_sum,
                float_sum,
                saw_float,
            } => {
                if *saw_float {
                    Value::Double(*float_sum)
                } else {
                    Value::Int(*int_sum)
                }
            }
            AggState::Avg { sum, count } => {
                if *count == 0 {
                    Value::Null
                } else {
                    Value::Double(*sum / *count as f64)
                }
            }
            AggState::Extreme { best, .. } => best.take().unwrap_or(Value::Null),
            AggState::Collect { items } => Value::List(std::mem::take(items)),
            AggState::Percentile {
                values,
                pct,
                continuous,
            } => {
                if values.is_empty() {
                    Value::Null
                } else {
                    values.sort_by(f64::total_cmp);
                    if *continuous {
                        let rank = *pct * (values.len() - 1) as f64;
                        let lo = rank.floor() as usize;
                        let hi = rank.ceil() as usize;
                        if lo == hi {
                            Value::Double(values[lo])
                        } else {
                            let frac = rank - lo as f64;
                            Value::Double(values[lo] * (1.0 - frac) + values[hi] * frac)
                        }
                    } else {
                        let rank = (*pct * values.len() as f64).ceil() as usize;
                        let idx = rank.saturating_sub(1).min(values.len() - 1);
                        Value::Double(values[idx])
                    }
                }
            }
            AggState::StDev { values, population } => {
                let n = values.len();
                if n < 2 {
                    Value::Double(0.0)
                } else {
                    let mean = values.iter().sum::<f64>() / n as f64;
                    let sq_sum: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
                    let denom = if *population { n } else { n - 1 } as f64;
                    Value::Double((sq_sum / denom).sqrt())
                }
            }
        };
        self.result = Some(result);
    }

    /// The frozen result; Null until finalize ran
    pub fn result(&self) -> Value {
        self.result.clone().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kind: AggregateFunction, distinct: bool, inputs: &[Value]) -> Value {
        let mut ctx = AggregateCtx::new(kind, distinct);
        for v in inputs {
            ctx.step(std::slice::from_ref(v)).unwrap();
        }
        ctx.finalize();
        ctx.result()
    }

    #[test]
    fn test_count_skips_null() {
        let out = run(
            AggregateFunction::Count,
            false,
            &[Value::Int(1), Value::Null, Value::Int(2)],
        );
        assert_eq!(out, Value::Int(2));
    }

    #[test]
    fn test_count_star_counts_records() {
        let mut ctx = AggregateCtx::new(AggregateFunction::Count, false);
        for _ in 0..3 {
            ctx.step(&[]).unwrap();
        }
        ctx.finalize();
        assert_eq!(ctx.result(), Value::Int(3));
    }

    #[test]
    fn test_sum_stays_integer_until_float() {
        let out = run(AggregateFunction::Sum, false, &[Value::Int(1), Value::Int(2)]);
        assert_eq!(out, Value::Int(3));
        let out = run(
            AggregateFunction::Sum,
            false,
            &[Value::Int(1), Value::Double(0.5)],
        );
        assert_eq!(out, Value::Double(1.5));
        // empty sum is integer zero
        assert_eq!(run(AggregateFunction::Sum, false, &[]), Value::Int(0));
    }

    #[test]
    fn test_avg() {
        let vals: Vec<Value> = (1..=5).map(Value::Int).collect();
        assert_eq!(run(AggregateFunction::Avg, false, &vals), Value::Double(3.0));
        assert_eq!(run(AggregateFunction::Avg, false, &[]), Value::Null);
    }

    #[test]
    fn test_min_max() {
        let vals = [Value::Int(3), Value::Int(1), Value::Int(2)];
        assert_eq!(run(AggregateFunction::Min, false, &vals), Value::Int(1));
        assert_eq!(run(AggregateFunction::Max, false, &vals), Value::Int(3));
        assert_eq!(run(AggregateFunction::Min, false, &[]), Value::Null);
    }

    #[test]
    fn test_collect_skips_null() {
        let out = run(
            AggregateFunction::Collect,
            false,
            &[Value::Int(1), Value::Null, Value::Int(2)],
        );
        assert_eq!(out, Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_distinct_dedup() {
        let vals = [Value::Int(1), Value::Int(1), Value::Int(2)];
        assert_eq!(run(AggregateFunction::Count, true, &vals), Value::Int(2));
        assert_eq!(
            run(AggregateFunction::Collect, true, &vals),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_percentile_disc() {
        let mut ctx = AggregateCtx::new(AggregateFunction::PercentileDisc, false);
        for v in 1..=4 {
            ctx.step(&[Value::Int(v), Value::Double(0.5)]).unwrap();
        }
        ctx.finalize();
        assert_eq!(ctx.result(), Value::Double(2.0));
    }

    #[test]
    fn test_percentile_cont_interpolates() {
        let mut ctx = AggregateCtx::new(AggregateFunction::PercentileCont, false);
        for v in [10.0, 20.0] {
            ctx.step(&[Value::Double(v), Value::Double(0.5)]).unwrap();
        }
        ctx.finalize();
        assert_eq!(ctx.result(), Value::Double(15.0));
    }

    #[test]
    fn test_stdev_sample_vs_population() {
        let vals: Vec<Value> = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]
            .iter()
            .map(|v| Value::Double(*v))
            .collect();
        let Value::Double(p) = run(AggregateFunction::StDevP, false, &vals) else {
            panic!("stDevP must return a double");
        };
        assert!((p - 2.0).abs() < 1e-9);
        let Value::Double(s) = run(AggregateFunction::StDev, false, &vals) else {
            panic!("stDev must return a double");
        };
        assert!(s > p);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut ctx = AggregateCtx::new(AggregateFunction::Count, false);
        ctx.step(&[Value::Int(1)]).unwrap();
        ctx.finalize();
        ctx.finalize();
        assert_eq!(ctx.result(), Value::Int(1));
        assert!(ctx.is_finalized());
    }

    #[test]
    fn test_registry_names() {
        assert!(is_aggregate("SUM"));
        assert!(is_aggregate("countDistinct"));
        assert_eq!(
            lookup("collectDistinct"),
            Some((AggregateFunction::Collect, true))
        );
        assert!(!is_aggregate("toUpper"));
    }
}
