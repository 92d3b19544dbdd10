//! Plain-text workbook format: one `SHEET!CELL: INPUT` line per cell.
//!
//! ```text
//! # rowcalc workbook
//! Sheet1!A1: 42
//! Sheet1!B1: =A1*2
//! 'My Data'!A1: "007"
//! ```
//!
//! Inputs are what a user would type: formulas keep their `=`, text is
//! double-quoted. The sheet prefix may be left out, in which case the
//! default sheet is used.

use crate::error::{Result, RowcalcError};
use rowcalc_engine::engine::{CellConfig, CellsBySheet, DataType, Reference};
use std::fs;
use std::path::Path;

/// Parse a workbook file
pub fn parse_cells(path: &Path, default_sheet: &str) -> Result<CellsBySheet> {
    let content = fs::read_to_string(path)?;
    parse_cells_content(&content, default_sheet)
}

/// Parse workbook content from a string
pub fn parse_cells_content(content: &str, default_sheet: &str) -> Result<CellsBySheet> {
    let mut cells = CellsBySheet::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((address, input)) = separator(line).map(|i| line.split_at(i)) else {
            return Err(RowcalcError::Parse {
                line: line_num + 1,
                message: "Expected 'CELL: INPUT' format".to_string(),
            });
        };
        let input = input[1..].trim();

        let position = match Reference::parse(address.trim(), default_sheet) {
            Ok(Reference::Cell(position)) => position,
            _ => {
                return Err(RowcalcError::Parse {
                    line: line_num + 1,
                    message: format!("Invalid cell reference: {}", address.trim()),
                });
            }
        };

        let cell = CellConfig::from_input(input);
        if !cell.is_blank() {
            cells.insert_at(&position, cell);
        }
    }

    Ok(cells)
}

/// Byte offset of the ':' ending the cell address. A quoted sheet name
/// may itself contain ':'.
fn separator(line: &str) -> Option<usize> {
    let mut start = 0;
    if line.starts_with('\'') {
        let bytes = line.as_bytes();
        let mut i = 1;
        loop {
            match bytes.get(i)? {
                b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
                b'\'' => break,
                _ => i += 1,
            }
        }
        start = i + 1;
    }
    line[start..].find(':').map(|i| start + i)
}

/// Write cells to a workbook file
pub fn write_cells(path: &Path, cells: &CellsBySheet) -> Result<()> {
    fs::write(path, write_cells_content(cells))?;
    Ok(())
}

/// Write cells to workbook format. Only inputs are written, never results.
pub fn write_cells_content(cells: &CellsBySheet) -> String {
    let mut lines = vec!["# rowcalc workbook".to_string()];

    // CellsBySheet iterates sheet, row, column in order.
    for (position, cell) in cells.iter() {
        let Some(text) = cell.text.as_deref() else {
            continue;
        };
        let input = match cell.datatype {
            Some(DataType::Text) => format!("\"{}\"", text),
            _ => text.to_string(),
        };
        lines.push(format!("{}: {}", position, input));
    }

    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_values() {
        let cells = parse_cells_content(
            "# comment\nA1: 42\nSheet2!B2: =A1*2\n'My Data'!C3: \"007\"\n\nA2: TRUE",
            "Sheet1",
        )
        .unwrap();
        assert_eq!(cells.len(), 4);
        assert_eq!(cells.get("Sheet1", 1, 1), Some(&CellConfig::from_input("42")));
        assert_eq!(
            cells.get("Sheet2", 2, 2).and_then(|c| c.text.as_deref()),
            Some("=A1*2")
        );
        let text = cells.get("My Data", 3, 3).unwrap();
        assert_eq!(text.text.as_deref(), Some("007"));
        assert_eq!(text.datatype, Some(DataType::Text));
        assert_eq!(cells.get("Sheet1", 2, 1).unwrap().datatype, Some(DataType::Boolean));
    }

    #[test]
    fn test_value_may_contain_colons() {
        let cells = parse_cells_content("A1: \"10:30\"", "Sheet1").unwrap();
        assert_eq!(cells.get("Sheet1", 1, 1).and_then(|c| c.text.as_deref()), Some("10:30"));
    }

    #[test]
    fn test_quoted_sheet_may_contain_colons() {
        let cells = parse_cells_content("'Q1: sales'!B2: 5", "Sheet1").unwrap();
        assert_eq!(cells.get("Q1: sales", 2, 2), Some(&CellConfig::from_input("5")));
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = parse_cells_content("A1: 1\nnot a line", "Sheet1").unwrap_err();
        assert!(matches!(err, RowcalcError::Parse { line: 2, .. }));

        let err = parse_cells_content("A0: 1", "Sheet1").unwrap_err();
        assert!(matches!(err, RowcalcError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_write_round_trip() {
        let content = "# rowcalc workbook\n\
                       'My Data'!A1: \"hello\"\n\
                       Sheet1!A1: 1\n\
                       Sheet1!B1: =A1+'My Data'!A1\n\
                       Sheet1!A2: \"42\"\n";
        let cells = parse_cells_content(content, "Sheet1").unwrap();
        assert_eq!(write_cells_content(&cells), content);
    }
}
