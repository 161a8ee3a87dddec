//! ABOUTME: Pure tree-walking evaluator over JSON values
//! ABOUTME: Python-flavored semantics: truthiness, short-circuit and/or, / yields float

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::expr_error;
use agentloom_core::error::{ExpressionErrorKind, Result};
use serde_json::{Map, Number, Value};

/// Truthiness used by predicates: non-empty, non-zero, not false/null.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn bad_type(message: impl Into<String>) -> agentloom_core::LoomError {
    expr_error(ExpressionErrorKind::BadType, message)
}

fn as_f64(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| bad_type(format!("expected a number, got {value}")))
}

fn float_value(f: f64) -> Result<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| bad_type("arithmetic produced a non-finite number"))
}

/// Evaluate a parsed expression against the context. Pure over its inputs.
pub fn evaluate_ast(expr: &Expr, context: &Map<String, Value>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Ident(name) => context.get(name).cloned().ok_or_else(|| {
            expr_error(
                ExpressionErrorKind::UnknownName,
                format!("name '{name}' is not defined"),
            )
        }),

        Expr::Attr { base, name } => {
            let base = evaluate_ast(base, context)?;
            match base {
                Value::Object(map) => map.get(name).cloned().ok_or_else(|| {
                    expr_error(
                        ExpressionErrorKind::UnknownName,
                        format!("object has no attribute '{name}'"),
                    )
                }),
                other => Err(bad_type(format!(
                    "attribute access on non-object value {other}"
                ))),
            }
        }

        Expr::Index { base, index } => {
            let base = evaluate_ast(base, context)?;
            let index = evaluate_ast(index, context)?;
            match (&base, &index) {
                (Value::Object(map), Value::String(key)) => {
                    map.get(key).cloned().ok_or_else(|| {
                        expr_error(
                            ExpressionErrorKind::UnknownName,
                            format!("object has no key '{key}'"),
                        )
                    })
                }
                (Value::Array(items), Value::Number(n)) => {
                    let raw = n
                        .as_i64()
                        .ok_or_else(|| bad_type("array index must be an integer"))?;
                    let len = items.len() as i64;
                    let idx = if raw < 0 { raw + len } else { raw };
                    if idx < 0 || idx >= len {
                        return Err(bad_type(format!("array index {raw} out of range")));
                    }
                    Ok(items[idx as usize].clone())
                }
                _ => Err(bad_type(format!("cannot subscript {base} with {index}"))),
            }
        }

        Expr::Unary { op, operand } => {
            let value = evaluate_ast(operand, context)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Neg => match &value {
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            Ok(Value::from(-i))
                        } else {
                            float_value(-as_f64(&value)?)
                        }
                    }
                    other => Err(bad_type(format!("cannot negate {other}"))),
                },
            }
        }

        Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::And => {
                let left = evaluate_ast(lhs, context)?;
                if truthy(&left) {
                    evaluate_ast(rhs, context)
                } else {
                    Ok(left)
                }
            }
            BinaryOp::Or => {
                let left = evaluate_ast(lhs, context)?;
                if truthy(&left) {
                    Ok(left)
                } else {
                    evaluate_ast(rhs, context)
                }
            }
            _ => {
                let left = evaluate_ast(lhs, context)?;
                let right = evaluate_ast(rhs, context)?;
                apply_binary(*op, &left, &right)
            }
        },

        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate_ast(arg, context)?);
            }
            call_function(name, &values)
        }

        Expr::Filter { input, name } => {
            let value = evaluate_ast(input, context)?;
            apply_filter(name, &value)
        }
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Array(a), Value::Array(b)) => {
                let mut merged = a.clone();
                merged.extend(b.iter().cloned());
                Ok(Value::Array(merged))
            }
            _ => numeric_op(left, right, |a, b| a + b, |a, b| a.checked_add(b)),
        },
        BinaryOp::Sub => numeric_op(left, right, |a, b| a - b, |a, b| a.checked_sub(b)),
        BinaryOp::Mul => numeric_op(left, right, |a, b| a * b, |a, b| a.checked_mul(b)),
        BinaryOp::Div => {
            let b = as_f64(right)?;
            if b == 0.0 {
                return Err(bad_type("division by zero"));
            }
            float_value(as_f64(left)? / b)
        }
        BinaryOp::Mod => match (left.as_i64(), right.as_i64()) {
            (Some(a), Some(b)) => {
                if b == 0 {
                    Err(bad_type("modulo by zero"))
                } else {
                    Ok(Value::from(a.rem_euclid(b)))
                }
            }
            _ => {
                let b = as_f64(right)?;
                if b == 0.0 {
                    return Err(bad_type("modulo by zero"));
                }
                float_value(as_f64(left)?.rem_euclid(b))
            }
        },
        BinaryOp::Pow => match (left.as_i64(), right.as_i64()) {
            (Some(a), Some(b)) if (0..=u32::MAX as i64).contains(&b) => a
                .checked_pow(b as u32)
                .map(Value::from)
                .ok_or_else(|| bad_type("integer exponent overflow")),
            _ => float_value(as_f64(left)?.powf(as_f64(right)?)),
        },
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare_values(left, right)?;
            let holds = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(holds))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited in evaluate_ast"),
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    float_op: impl Fn(f64, f64) -> f64,
    int_op: impl Fn(i64, i64) -> Option<i64>,
) -> Result<Value> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return int_op(a, b)
            .map(Value::from)
            .ok_or_else(|| bad_type("integer overflow"));
    }
    float_value(float_op(as_f64(left)?, as_f64(right)?))
}

/// Numeric equality ignores representation (1 == 1.0); everything else is
/// structural.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Result<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            let (a, b) = (as_f64(left)?, as_f64(right)?);
            a.partial_cmp(&b)
                .ok_or_else(|| bad_type("numbers are not comparable"))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(bad_type(format!("cannot order {left} against {right}"))),
    }
}

fn call_function(name: &str, args: &[Value]) -> Result<Value> {
    let arity = |expected: std::ops::RangeInclusive<usize>| -> Result<()> {
        if expected.contains(&args.len()) {
            Ok(())
        } else {
            Err(bad_type(format!(
                "{name}() takes {expected:?} arguments, got {}",
                args.len()
            )))
        }
    };

    match name {
        "range" => {
            arity(1..=2)?;
            let bound = |v: &Value| {
                v.as_i64()
                    .ok_or_else(|| bad_type("range() bounds must be integers"))
            };
            let (start, end) = if args.len() == 1 {
                (0, bound(&args[0])?)
            } else {
                (bound(&args[0])?, bound(&args[1])?)
            };
            Ok(Value::Array((start..end).map(Value::from).collect()))
        }
        "len" => {
            arity(1..=1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                other => return Err(bad_type(format!("len() of {other}"))),
            };
            Ok(Value::from(len))
        }
        "str" => {
            arity(1..=1)?;
            Ok(Value::String(to_display_string(&args[0])))
        }
        "int" => {
            arity(1..=1)?;
            match &args[0] {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .map(Value::from)
                    .ok_or_else(|| bad_type("number not representable as int")),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| bad_type(format!("cannot parse '{s}' as int"))),
                Value::Bool(b) => Ok(Value::from(i64::from(*b))),
                other => Err(bad_type(format!("int() of {other}"))),
            }
        }
        "float" => {
            arity(1..=1)?;
            match &args[0] {
                Value::Number(_) => float_value(as_f64(&args[0])?),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| bad_type(format!("cannot parse '{s}' as float")))
                    .and_then(float_value),
                Value::Bool(b) => float_value(if *b { 1.0 } else { 0.0 }),
                other => Err(bad_type(format!("float() of {other}"))),
            }
        }
        "bool" => {
            arity(1..=1)?;
            Ok(Value::Bool(truthy(&args[0])))
        }
        "list" => {
            arity(1..=1)?;
            match &args[0] {
                Value::Array(a) => Ok(Value::Array(a.clone())),
                Value::String(s) => Ok(Value::Array(
                    s.chars().map(|c| Value::String(c.to_string())).collect(),
                )),
                Value::Object(o) => Ok(Value::Array(
                    o.keys().map(|k| Value::String(k.clone())).collect(),
                )),
                other => Err(bad_type(format!("list() of {other}"))),
            }
        }
        "dict" => {
            arity(0..=1)?;
            match args.first() {
                None => Ok(Value::Object(Map::new())),
                Some(Value::Object(o)) => Ok(Value::Object(o.clone())),
                Some(other) => Err(bad_type(format!("dict() of {other}"))),
            }
        }
        // The parser enforces the allowlist before this point.
        other => Err(expr_error(
            ExpressionErrorKind::UnknownFunction,
            format!("function '{other}' is not allowed"),
        )),
    }
}

fn apply_filter(name: &str, value: &Value) -> Result<Value> {
    match name {
        "tojson" => serde_json::to_string(value)
            .map(Value::String)
            .map_err(|e| bad_type(format!("tojson failed: {e}"))),
        "fromjson" => match value {
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| bad_type(format!("fromjson failed: {e}"))),
            other => Err(bad_type(format!("fromjson expects a string, got {other}"))),
        },
        other => Err(expr_error(
            ExpressionErrorKind::UnknownFilter,
            format!("filter '{other}' is not allowed"),
        )),
    }
}

/// Stringification used by str() and mixed-template interpolation. Strings
/// render bare; everything else renders as JSON.
pub(crate) fn to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
