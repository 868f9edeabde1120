//! Expression evaluator

use super::ast::{ArithOp, CompareOp, Expression, Literal};
use crate::error::WorkflowError;
use crate::workflow::scope::Scope;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Evaluate an expression against a scope
pub fn evaluate(expr: &Expression, scope: &Scope<'_>) -> Result<Value, WorkflowError> {
    match expr {
        Expression::Literal(literal) => literal_value(literal),
        Expression::Path(segments) => Ok(scope
            .lookup(segments)
            .map(|v| v.into_owned())
            .unwrap_or(Value::Null)),
        Expression::Compare { left, op, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            compare(&left, *op, &right).map(Value::Bool)
        }
        Expression::Arithmetic { left, op, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            arithmetic(&left, *op, &right)
        }
        Expression::Negate(inner) => match evaluate(inner, scope)? {
            Value::Number(n) => number_value(-as_f64(&n)),
            other => Err(WorkflowError::evaluation(format!(
                "cannot negate {}",
                type_name(&other)
            ))),
        },
        Expression::And(left, right) => {
            if !evaluate_bool(left, scope)? {
                return Ok(Value::Bool(false));
            }
            evaluate_bool(right, scope).map(Value::Bool)
        }
        Expression::Or(left, right) => {
            if evaluate_bool(left, scope)? {
                return Ok(Value::Bool(true));
            }
            evaluate_bool(right, scope).map(Value::Bool)
        }
        Expression::Not(inner) => evaluate_bool(inner, scope).map(|b| Value::Bool(!b)),
    }
}

/// Evaluate an expression that must produce a boolean
pub fn evaluate_bool(expr: &Expression, scope: &Scope<'_>) -> Result<bool, WorkflowError> {
    match evaluate(expr, scope)? {
        Value::Bool(b) => Ok(b),
        other => Err(WorkflowError::evaluation(format!(
            "expected a boolean, got {} ({})",
            type_name(&other),
            other
        ))),
    }
}

/// Apply a comparison operator to two resolved values
pub fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, WorkflowError> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::NotEq => Ok(!values_equal(left, right)),
        CompareOp::Gt => order(left, op, right).map(|o| o == Ordering::Greater),
        CompareOp::Gte => order(left, op, right).map(|o| o != Ordering::Less),
        CompareOp::Lt => order(left, op, right).map(|o| o == Ordering::Less),
        CompareOp::Lte => order(left, op, right).map(|o| o != Ordering::Greater),
        CompareOp::Contains => Ok(check_contains(left, right)),
    }
}

/// Deep equality where numbers compare by value regardless of representation
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (as_integer(a), as_integer(b)) {
            (Some(a), Some(b)) => a == b,
            _ => (as_f64(a) - as_f64(b)).abs() < f64::EPSILON,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => left == right,
    }
}

fn order(left: &Value, op: CompareOp, right: &Value) -> Result<Ordering, WorkflowError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (as_integer(a), as_integer(b)) {
            (Some(a), Some(b)) => Ok(a.cmp(&b)),
            _ => as_f64(a)
                .partial_cmp(&as_f64(b))
                .ok_or_else(|| WorkflowError::evaluation("cannot order NaN")),
        },
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(WorkflowError::evaluation(format!(
            "cannot compare {} {} {}",
            type_name(left),
            op,
            type_name(right)
        ))),
    }
}

fn check_contains(left: &Value, right: &Value) -> bool {
    match (left, right) {
        // String contains substring
        (Value::String(s), Value::String(substr)) => s.contains(substr.as_str()),
        // Array contains value
        (Value::Array(arr), needle) => arr.iter().any(|v| values_equal(v, needle)),
        // Object has key
        (Value::Object(obj), Value::String(key)) => obj.contains_key(key),
        _ => false,
    }
}

fn arithmetic(left: &Value, op: ArithOp, right: &Value) -> Result<Value, WorkflowError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (as_f64(a), as_f64(b));
            let result = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div | ArithOp::Rem if b == 0.0 => {
                    return Err(WorkflowError::evaluation(format!("{} by zero", op)))
                }
                ArithOp::Div => a / b,
                ArithOp::Rem => a % b,
            };
            number_value(result)
        }
        (Value::String(a), Value::String(b)) if op == ArithOp::Add => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        _ => Err(WorkflowError::evaluation(format!(
            "cannot apply {} to {} and {}",
            op,
            type_name(left),
            type_name(right)
        ))),
    }
}

fn literal_value(literal: &Literal) -> Result<Value, WorkflowError> {
    match literal {
        Literal::String(s) => Ok(Value::String(s.clone())),
        Literal::Number(n) => number_value(*n),
        Literal::Boolean(b) => Ok(Value::Bool(*b)),
        Literal::Null => Ok(Value::Null),
    }
}

/// Whole numbers become JSON integers so results serialize the way inputs did
fn number_value(n: f64) -> Result<Value, WorkflowError> {
    if !n.is_finite() {
        return Err(WorkflowError::evaluation(format!(
            "arithmetic produced a non-finite number ({})",
            n
        )));
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| WorkflowError::evaluation(format!("invalid number {}", n)))
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

/// Integers compare exactly; i128 holds both the i64 and u64 ranges
fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
