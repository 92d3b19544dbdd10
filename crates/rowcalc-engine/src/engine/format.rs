use super::value::Value;

/// Format a value for display.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Empty => String::new(),
        Value::Number(n) => format_number(*n),
        Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Text(s) => s.clone(),
        Value::Error(e) => e.code.to_string(),
        Value::Array(rows) => {
            let rows: Vec<String> = rows
                .iter()
                .map(|row| row.iter().map(format_value).collect::<Vec<_>>().join(","))
                .collect();
            format!("{{{}}}", rows.join(";"))
        }
    }
}

/// Format a number for display.
///
/// Integral values print without decimals, others are rounded to ten places
/// with trailing zeros dropped. Very large or very small magnitudes use
/// exponent notation.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        "#NUM!".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e15 || n.abs() < 1e-9 {
        format!("{:e}", n)
    } else if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        let fixed = format!("{:.10}", n);
        let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
        if trimmed == "-0" {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::{ErrorCode, FormulaError};

    #[test]
    fn test_format_number_integers_and_fractions() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-12.0), "-12");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn test_format_number_extremes() {
        assert_eq!(format_number(1e20), "1e20");
        assert_eq!(format_number(1.5e-12), "1.5e-12");
        assert_eq!(format_number(f64::NAN), "#NUM!");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::Empty), "");
        assert_eq!(format_value(&Value::Boolean(true)), "TRUE");
        assert_eq!(
            format_value(&Value::Error(FormulaError::from_code(ErrorCode::Div0))),
            "#DIV/0!"
        );
        assert_eq!(
            format_value(&Value::Array(vec![
                vec![Value::Number(1.0), Value::Number(2.0)],
                vec![Value::Text("a".into()), Value::Empty],
            ])),
            "{1,2;a,}"
        );
    }
}
