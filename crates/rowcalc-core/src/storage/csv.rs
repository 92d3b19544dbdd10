//! CSV import/export functionality

use crate::error::Result;
use crate::workbook::Workbook;
use rowcalc_engine::builtins::parse_delimited_line;
use rowcalc_engine::engine::{CellConfig, CellPosition, CellsBySheet, DataType};
use std::io::Write;
use std::path::Path;

/// Parse a CSV file into cells of `sheet`, starting at the given 1-based offset
pub fn parse_csv(
    path: &Path,
    sheet: &str,
    start_row: usize,
    start_col: usize,
) -> Result<CellsBySheet> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_csv_str(&content, sheet, start_row, start_col))
}

pub fn parse_csv_str(content: &str, sheet: &str, start_row: usize, start_col: usize) -> CellsBySheet {
    let mut cells = CellsBySheet::new();
    for (row_idx, line) in content.lines().enumerate() {
        for (col_idx, field) in parse_delimited_line(line, ',').into_iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            let position = CellPosition::new(sheet, start_row + row_idx, start_col + col_idx);
            cells.insert_at(&position, parse_csv_field(&field));
        }
    }
    cells
}

/// Parse a CSV field into a cell config
/// - Empty string -> skip (handled by caller)
/// - `=`-prefixed -> Formula
/// - Valid number -> Number (unless it has leading zeros like "007")
/// - Otherwise -> Text (TRUE/FALSE become booleans)
pub(crate) fn parse_csv_field(field: &str) -> CellConfig {
    // Keep explicit surrounding whitespace (typically from quoted CSV fields).
    let trimmed = field.trim();
    if field != trimmed {
        return text_cell(field);
    }

    // Preserve strings that look like numbers but have leading zeros (e.g., "007", "00123")
    // unless they're just "0" or start with "0."
    if trimmed.starts_with('0')
        && trimmed.len() > 1
        && !trimmed.starts_with("0.")
        && trimmed.chars().nth(1).is_some_and(|c| c.is_ascii_digit())
    {
        return text_cell(trimmed);
    }

    // A quoted field that happens to look like a string literal stays verbatim.
    if trimmed.starts_with('"') {
        return text_cell(trimmed);
    }

    CellConfig::from_input(trimmed)
}

fn text_cell(text: &str) -> CellConfig {
    CellConfig {
        text: Some(text.to_string()),
        datatype: Some(DataType::Text),
        ..Default::default()
    }
}

/// Render one sheet as CSV using evaluated display values.
pub fn csv_string(workbook: &Workbook, sheet: &str) -> String {
    // Output starts at A1 so cell positions survive a round trip.
    let Some((_, _, max_row, max_col)) = workbook.store().extent(sheet) else {
        return String::new();
    };

    let mut out = String::new();
    for row in 1..=max_row {
        let fields: Vec<String> = (1..=max_col)
            .map(|col| escape_csv_field(&workbook.display_value(&CellPosition::new(sheet, row, col))))
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Export one sheet to CSV format using evaluated display values.
pub fn write_csv(path: &Path, workbook: &Workbook, sheet: &str) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(csv_string(workbook, sheet).as_bytes())?;
    Ok(())
}

/// Escape a field for CSV output
fn escape_csv_field(field: &str) -> String {
    // Guard against CSV formula injection in spreadsheet apps. Plain
    // negative numbers are data, not formulas.
    let first_non_space = field.trim_start_matches([' ', '\t']).chars().next();
    let safe_field = if matches!(first_non_space, Some('=' | '+' | '-' | '@'))
        && field.trim().parse::<f64>().is_err()
    {
        format!("'{}", field)
    } else {
        field.to_string()
    };

    if safe_field.contains(',')
        || safe_field.contains('"')
        || safe_field.contains('\n')
        || safe_field.contains('\r')
    {
        format!("\"{}\"", safe_field.replace('"', "\"\""))
    } else {
        safe_field
    }
}
