//! Workbook file formats.

pub mod cells;
pub mod csv;

pub use cells::{parse_cells, parse_cells_content, write_cells, write_cells_content};
pub use csv::{csv_string, parse_csv, parse_csv_str, write_csv};

use std::path::Path;

/// Whether `path` should be read and written as CSV rather than the
/// workbook format.
pub fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}
