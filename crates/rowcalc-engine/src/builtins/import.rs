//! `IMPORTDATA`: delimited text pulled in through a host data source.

use std::io;
use std::path::Path;
use tracing::debug;

use crate::engine::{ErrorCode, FormulaError, FunctionArgument, FunctionOutput, Value};

/// Largest payload the file source will read.
const MAX_IMPORT_BYTES: u64 = 10 * 1024 * 1024;

/// Where `IMPORTDATA` gets its text from.
pub trait DataSource: Send + Sync {
    fn fetch(&self, location: &str) -> io::Result<String>;
}

/// Reads local files, given as a plain path or a `file://` URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDataSource;

impl DataSource for FileDataSource {
    fn fetch(&self, location: &str) -> io::Result<String> {
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        let len = std::fs::metadata(path)?.len();
        if len > MAX_IMPORT_BYTES {
            return Err(io::Error::other(format!(
                "{} is too large to import ({} bytes)",
                path.display(),
                len
            )));
        }
        std::fs::read_to_string(path)
    }
}

pub(crate) fn importdata(
    source: &dyn DataSource,
    args: &[FunctionArgument],
) -> Result<FunctionOutput, FormulaError> {
    let location = match args.first().map(|a| &a.value) {
        None | Some(Value::Empty) => None,
        Some(value) => Some(value.as_text()?).filter(|s| !s.is_empty()),
    };
    let Some(location) = location else {
        return Err(FormulaError::new(
            ErrorCode::NotAvailable,
            "Wrong number of arguments provided.",
        ));
    };

    debug!(%location, "importing data");
    let content = source
        .fetch(&location)
        .map_err(|e| FormulaError::new(ErrorCode::NotAvailable, e.to_string()))?;

    let separator = if location.ends_with("tsv") { '\t' } else { ',' };
    let mut rows: Vec<Vec<Value>> = content
        .lines()
        .map(|line| {
            parse_delimited_line(line, separator)
                .into_iter()
                .map(|field| field_value(&field))
                .collect()
        })
        .collect();
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, Value::Empty);
    }
    Ok(FunctionOutput::Value(Value::Array(rows)))
}

fn field_value(field: &str) -> Value {
    if field.is_empty() {
        return Value::Empty;
    }
    match field.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Text(field.to_string()),
    }
}

/// Split one line on `separator`, honouring double-quoted fields with `""`
/// escapes. Unquoted fields are trimmed.
pub fn parse_delimited_line(line: &str, separator: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut field_was_quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            if current.trim().is_empty() {
                current.clear();
            }
            in_quotes = true;
            field_was_quoted = true;
        } else if c == separator {
            fields.push(finish_field(&mut current, field_was_quoted));
            field_was_quoted = false;
        } else if field_was_quoted && c.is_whitespace() {
            // Padding after a closing quote.
        } else {
            current.push(c);
        }
    }
    fields.push(finish_field(&mut current, field_was_quoted));
    fields
}

fn finish_field(current: &mut String, quoted: bool) -> String {
    let field = std::mem::take(current);
    if quoted {
        field
    } else {
        field.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Fixed(&'static str);

    impl DataSource for Fixed {
        fn fetch(&self, _location: &str) -> io::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    impl DataSource for Failing {
        fn fetch(&self, _location: &str) -> io::Result<String> {
            Err(io::Error::other("Not Found"))
        }
    }

    fn url(s: &str) -> FunctionArgument {
        FunctionArgument::value(Value::Text(s.to_string()))
    }

    #[test]
    fn test_parse_delimited_line_quotes() {
        assert_eq!(
            parse_delimited_line(r#"a, "b,c" ,"say ""hi""""#, ','),
            vec!["a", "b,c", "say \"hi\""]
        );
        assert_eq!(parse_delimited_line("x\ty", '\t'), vec!["x", "y"]);
        assert_eq!(parse_delimited_line("", ','), vec![""]);
    }

    #[test]
    fn test_importdata_csv() {
        let out = importdata(&Fixed("name,qty\napple,3\npear\n"), &[url("http://x/data.csv")])
            .unwrap();
        assert_eq!(
            out,
            FunctionOutput::Value(Value::Array(vec![
                vec![Value::Text("name".into()), Value::Text("qty".into())],
                vec![Value::Text("apple".into()), Value::Number(3.0)],
                vec![Value::Text("pear".into()), Value::Empty],
            ]))
        );
    }

    #[test]
    fn test_importdata_tsv_separator() {
        let out = importdata(&Fixed("1\t2"), &[url("http://x/data.tsv")]).unwrap();
        assert_eq!(
            out,
            FunctionOutput::Value(Value::Array(vec![vec![
                Value::Number(1.0),
                Value::Number(2.0)
            ]]))
        );
    }

    #[test]
    fn test_importdata_missing_argument() {
        let err = importdata(&Fixed(""), &[]).unwrap_err();
        assert_eq!(
            err,
            FormulaError::new(ErrorCode::NotAvailable, "Wrong number of arguments provided.")
        );
    }

    #[test]
    fn test_importdata_fetch_failure() {
        let err = importdata(&Failing, &[url("http://x")]).unwrap_err();
        assert_eq!(err, FormulaError::new(ErrorCode::NotAvailable, "Not Found"));
    }

    #[test]
    fn test_file_source_reads_file_url() {
        let path = std::env::temp_dir().join(format!("rowcalc-import-{}.csv", std::process::id()));
        std::fs::write(&path, "1,2\n").unwrap();
        let text = FileDataSource
            .fetch(&format!("file://{}", path.display()))
            .unwrap();
        assert_eq!(text, "1,2\n");
        let _ = std::fs::remove_file(path);
    }
}
