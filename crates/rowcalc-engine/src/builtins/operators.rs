//! Spreadsheet operator semantics.
//!
//! Errors in operands propagate, left operand first.

use std::cmp::Ordering;

use crate::engine::{ErrorCode, FormulaError, Operator, UnaryOp, Value};

fn scalar(value: &Value) -> Result<&Value, FormulaError> {
    match value {
        Value::Error(e) => Err(e.clone()),
        Value::Array(_) => Err(FormulaError::new(
            ErrorCode::Value,
            "A range or array cannot be used as a single value",
        )),
        other => Ok(other),
    }
}

pub(crate) fn binary(op: Operator, lhs: &Value, rhs: &Value) -> Value {
    match apply_binary(op, lhs, rhs) {
        Ok(value) => value,
        Err(e) => Value::Error(e),
    }
}

fn apply_binary(op: Operator, lhs: &Value, rhs: &Value) -> Result<Value, FormulaError> {
    let lhs = scalar(lhs)?;
    let rhs = scalar(rhs)?;
    match op {
        Operator::Concat => Ok(Value::Text(format!("{}{}", lhs.as_text()?, rhs.as_text()?))),
        Operator::Eq => Ok(Value::Boolean(compare(lhs, rhs) == Ordering::Equal)),
        Operator::Ne => Ok(Value::Boolean(compare(lhs, rhs) != Ordering::Equal)),
        Operator::Lt => Ok(Value::Boolean(compare(lhs, rhs) == Ordering::Less)),
        Operator::Le => Ok(Value::Boolean(compare(lhs, rhs) != Ordering::Greater)),
        Operator::Gt => Ok(Value::Boolean(compare(lhs, rhs) == Ordering::Greater)),
        Operator::Ge => Ok(Value::Boolean(compare(lhs, rhs) != Ordering::Less)),
        Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Pow => {
            arithmetic(op, lhs.as_number()?, rhs.as_number()?)
        }
    }
}

pub(crate) fn arithmetic(op: Operator, a: f64, b: f64) -> Result<Value, FormulaError> {
    let n = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mul => a * b,
        Operator::Div if b == 0.0 => return Err(FormulaError::from_code(ErrorCode::Div0)),
        Operator::Div => a / b,
        Operator::Pow if a == 0.0 && b < 0.0 => {
            return Err(FormulaError::from_code(ErrorCode::Div0));
        }
        Operator::Pow => a.powf(b),
        _ => return Err(FormulaError::from_code(ErrorCode::Value)),
    };
    Ok(Value::number(n))
}

pub(crate) fn unary(op: UnaryOp, value: &Value) -> Value {
    let result = scalar(value).and_then(|v| match op {
        UnaryOp::Neg => Ok(Value::number(-v.as_number()?)),
        UnaryOp::Plus => Ok(v.clone()),
    });
    result.unwrap_or_else(Value::Error)
}

pub(crate) fn percent(value: &Value) -> Value {
    scalar(value)
        .and_then(Value::as_number)
        .map(|n| Value::number(n / 100.0))
        .unwrap_or_else(Value::Error)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::Text(_) => 1,
        Value::Boolean(_) => 2,
        _ => 3,
    }
}

/// Blank takes on the type of the other side.
fn blank_as(other: &Value) -> Value {
    match other {
        Value::Number(_) => Value::Number(0.0),
        Value::Text(_) => Value::Text(String::new()),
        Value::Boolean(_) => Value::Boolean(false),
        _ => Value::Empty,
    }
}

/// Spreadsheet ordering: numbers before text before booleans, text
/// compared case-insensitively.
pub(crate) fn compare(lhs: &Value, rhs: &Value) -> Ordering {
    let lhs = if lhs.is_empty() { blank_as(rhs) } else { lhs.clone() };
    let rhs = if rhs.is_empty() { blank_as(&lhs) } else { rhs.clone() };
    match (&lhs, &rhs) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Text(a), Value::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        _ => type_rank(&lhs).cmp(&type_rank(&rhs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> Value {
        Value::Number(v)
    }

    fn t(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_arithmetic_coerces_numeric_text() {
        assert_eq!(binary(Operator::Add, &t("2"), &n(3.0)), n(5.0));
        assert_eq!(binary(Operator::Mul, &Value::Boolean(true), &n(4.0)), n(4.0));
        assert_eq!(binary(Operator::Sub, &Value::Empty, &n(1.0)), n(-1.0));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert!(matches!(
            binary(Operator::Div, &n(1.0), &n(0.0)),
            Value::Error(e) if e.code == ErrorCode::Div0
        ));
        assert!(matches!(
            binary(Operator::Add, &t("abc"), &n(1.0)),
            Value::Error(e) if e.code == ErrorCode::Value
        ));
        assert!(matches!(
            binary(Operator::Pow, &n(-8.0), &n(0.5)),
            Value::Error(e) if e.code == ErrorCode::Num
        ));
    }

    #[test]
    fn test_errors_propagate_left_first() {
        let na = Value::Error(FormulaError::from_code(ErrorCode::NotAvailable));
        let r = Value::Error(FormulaError::from_code(ErrorCode::Ref));
        assert_eq!(binary(Operator::Add, &na, &r), na);
        assert_eq!(binary(Operator::Concat, &n(1.0), &r), r);
    }

    #[test]
    fn test_concat_formats_numbers() {
        assert_eq!(binary(Operator::Concat, &t("x"), &n(2.0)), t("x2"));
        assert_eq!(binary(Operator::Concat, &Value::Boolean(false), &Value::Empty), t("FALSE"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(binary(Operator::Eq, &t("abc"), &t("ABC")), Value::Boolean(true));
        assert_eq!(binary(Operator::Lt, &n(10.0), &t("1")), Value::Boolean(true));
        assert_eq!(binary(Operator::Gt, &Value::Boolean(false), &t("zzz")), Value::Boolean(true));
        assert_eq!(binary(Operator::Eq, &Value::Empty, &n(0.0)), Value::Boolean(true));
        assert_eq!(binary(Operator::Eq, &Value::Empty, &t("")), Value::Boolean(true));
        assert_eq!(binary(Operator::Ne, &n(1.0), &n(2.0)), Value::Boolean(true));
    }

    #[test]
    fn test_unary_and_percent() {
        assert_eq!(unary(UnaryOp::Neg, &t("3")), n(-3.0));
        assert_eq!(unary(UnaryOp::Plus, &t("x")), t("x"));
        assert_eq!(percent(&n(50.0)), n(0.5));
    }
}
