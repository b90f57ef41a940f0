// src/builtins.rs

//! Work table used by the `taskgraph` binary and its process workers.
//!
//! | key        | result                                                    |
//! |------------|-----------------------------------------------------------|
//! | `value`    | the `value` keyword, or null                              |
//! | `sum`      | sum of every numeric argument                             |
//! | `product`  | product of every numeric argument                         |
//! | `concat`   | positional arguments joined with the `sep` keyword        |
//! | `tuple`    | positional arguments as a tuple                           |
//! | `identity` | the first positional argument, or null                    |
//! | `sleep`    | sleeps `ms` milliseconds, then behaves like `identity`    |
//! | `fail`     | fails with the `message` keyword                          |

use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::value::{Args, Value};
use crate::work::{Work, WorkTable};

pub fn builtin_table() -> WorkTable {
    WorkTable::new()
        .with("value", Work::sync(|args| Ok(args.kwarg("value").cloned().unwrap_or_default())))
        .with("sum", Work::sync(|args| fold_numbers(&args, 0, i64::checked_add, |a, b| a + b)))
        .with("product", Work::sync(|args| fold_numbers(&args, 1, i64::checked_mul, |a, b| a * b)))
        .with("concat", Work::sync(concat))
        .with("tuple", Work::sync(|args| Ok(Value::Tuple(args.positional))))
        .with("identity", Work::sync(|args| Ok(first_or_null(args))))
        .with("sleep", Work::sync(sleep))
        .with("fail", Work::sync(fail))
}

/// Fold every argument, positional then keyword. Stays integral until a
/// float shows up; integer overflow is an error.
fn fold_numbers(
    args: &Args,
    init: i64,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    let mut acc = Value::Int(init);
    for value in args.values() {
        let next = match (&acc, value) {
            (Value::Int(a), Value::Int(b)) => match int_op(*a, *b) {
                Some(n) => Value::Int(n),
                None => bail!("integer overflow combining {a} and {b}"),
            },
            (_, Value::Int(_) | Value::Float(_)) => {
                let a = acc.as_f64().unwrap_or_default();
                let b = value.as_f64().unwrap_or_default();
                Value::Float(float_op(a, b))
            }
            (_, other) => bail!("expected a numeric argument, got {other:?}"),
        };
        acc = next;
    }
    Ok(acc)
}

fn concat(args: Args) -> Result<Value> {
    let sep = match args.kwarg("sep") {
        Some(Value::Str(sep)) => sep.clone(),
        Some(other) => bail!("'sep' must be a string, got {other:?}"),
        None => String::new(),
    };
    let parts: Vec<String> = args
        .positional
        .iter()
        .map(|value| match value {
            Value::Str(s) => s.clone(),
            other => other.to_json().to_string(),
        })
        .collect();
    Ok(Value::Str(parts.join(&sep)))
}

fn first_or_null(args: Args) -> Value {
    args.positional.into_iter().next().unwrap_or_default()
}

fn sleep(args: Args) -> Result<Value> {
    let ms = match args.kwarg("ms") {
        Some(value) => value
            .as_i64()
            .filter(|ms| *ms >= 0)
            .ok_or_else(|| anyhow!("'ms' must be a non-negative integer"))?,
        None => 10,
    };
    std::thread::sleep(Duration::from_millis(ms.unsigned_abs()));
    Ok(first_or_null(args))
}

fn fail(args: Args) -> Result<Value> {
    let message = args
        .kwarg("message")
        .and_then(Value::as_str)
        .unwrap_or("task failed");
    Err(anyhow!("{message}"))
}
