use super::Workbook;
use crate::error::{Result, RowcalcError};
use crate::storage::{is_csv, parse_cells, parse_csv, write_cells, write_csv};
use std::path::{Path, PathBuf};
use tracing::info;

const MAX_FUNCTION_FILE_BYTES: u64 = 1_048_576; // 1 MiB

fn read_functions_file(path: &Path) -> Result<String> {
    let meta = std::fs::metadata(path)?;
    if meta.len() > MAX_FUNCTION_FILE_BYTES {
        return Err(RowcalcError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Refusing to read {}: functions file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_FUNCTION_FILE_BYTES
            ),
        )));
    }
    Ok(std::fs::read_to_string(path)?)
}

impl Workbook {
    /// Compile a Rhai script of custom functions and recalculate every
    /// formula with them. Replaces previously loaded functions; on a compile
    /// error the old ones stay active.
    pub fn load_functions(&mut self, script: &str) -> Result<()> {
        self.evaluator.load_custom_functions(script)?;
        self.recalculate_all();
        Ok(())
    }

    /// Load custom Rhai functions from files, concatenated in order.
    /// Returns the canonical paths loaded.
    pub fn load_functions_files(&mut self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut loaded = Vec::new();
        let mut merged = String::new();
        for path in paths {
            let path_buf = std::fs::canonicalize(path)?;
            if loaded.contains(&path_buf) {
                continue;
            }
            if !merged.is_empty() {
                merged.push_str("\n\n");
            }
            merged.push_str(&read_functions_file(&path_buf)?);
            loaded.push(path_buf);
        }
        self.load_functions(&merged)?;
        info!(files = loaded.len(), "loaded custom functions");
        Ok(loaded)
    }

    /// Load from file, replacing every cell. CSV files fill `sheet`.
    pub fn load_file(&mut self, path: &Path, sheet: &str) -> Result<()> {
        let cells = if is_csv(path) {
            parse_csv(path, sheet, 1, 1)?
        } else {
            parse_cells(path, sheet)?
        };
        self.load_cells(&cells);
        self.file_path = Some(path.to_path_buf());
        self.modified = false;
        Ok(())
    }

    /// Import CSV data into `sheet` starting at a 1-based row/column, keeping
    /// other cells. Returns the number of cells imported.
    pub fn import_csv(
        &mut self,
        path: &Path,
        sheet: &str,
        start_row: usize,
        start_col: usize,
    ) -> Result<usize> {
        let cells = parse_csv(path, sheet, start_row, start_col)?;
        let count = cells.len();
        if count == 0 {
            return Err(RowcalcError::EmptyCsv);
        }
        let mut merged = self.store.snapshot();
        merged.merge(cells);
        self.load_cells(&merged);
        self.modified = true;
        Ok(count)
    }

    /// Save to current file path.
    /// Returns the path saved to.
    pub fn save_file(&mut self, sheet: &str) -> Result<PathBuf> {
        let Some(path) = self.file_path.clone() else {
            return Err(RowcalcError::NoFilePath);
        };
        self.save_as(&path, sheet)?;
        Ok(path)
    }

    /// Write the workbook to `path`. CSV keeps only `sheet`'s evaluated
    /// values; the workbook format keeps every sheet's inputs.
    pub fn save_as(&mut self, path: &Path, sheet: &str) -> Result<()> {
        if is_csv(path) {
            write_csv(path, self, sheet)?;
        } else {
            write_cells(path, &self.store.snapshot())?;
        }
        self.file_path = Some(path.to_path_buf());
        self.modified = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rowcalc_engine::engine::CellPosition;

    struct TempFile(PathBuf);

    impl TempFile {
        fn new(name: &str, content: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "rowcalc_{}_{:?}_{}",
                std::process::id(),
                std::thread::current().id(),
                name,
            ));
            std::fs::write(&path, content).unwrap();
            TempFile(path)
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn pos(row: usize, col: usize) -> CellPosition {
        CellPosition::new("Sheet1", row, col)
    }

    #[test]
    fn test_load_and_save_workbook_format() {
        let file = TempFile::new("book.cells", "A1: 2\nB1: =A1*3\n");
        let mut wb = Workbook::default();
        wb.load_file(&file.0, "Sheet1").unwrap();
        assert_eq!(wb.display_value(&pos(1, 2)), "6");

        wb.set_cell_from_input(pos(1, 1), "5").unwrap();
        assert!(wb.modified);
        wb.save_file("Sheet1").unwrap();
        assert!(!wb.modified);
        let saved = std::fs::read_to_string(&file.0).unwrap();
        assert_eq!(saved, "# rowcalc workbook\nSheet1!A1: 5\nSheet1!B1: =A1*3\n");
    }

    #[test]
    fn test_import_csv_invalidates_dependents() {
        let file = TempFile::new("import.csv", "5");
        let mut wb = Workbook::default();
        wb.set_cell_from_input(pos(1, 1), "1").unwrap();
        wb.set_cell_from_input(pos(1, 2), "=A1 + 1").unwrap();
        assert_eq!(wb.display_value(&pos(1, 2)), "2");

        assert_eq!(wb.import_csv(&file.0, "Sheet1", 1, 1).unwrap(), 1);
        assert_eq!(wb.display_value(&pos(1, 2)), "6");
    }

    #[test]
    fn test_import_empty_csv_fails() {
        let file = TempFile::new("empty.csv", "");
        let mut wb = Workbook::default();
        assert!(matches!(
            wb.import_csv(&file.0, "Sheet1", 1, 1),
            Err(RowcalcError::EmptyCsv)
        ));
    }

    #[test]
    fn test_save_without_path_fails() {
        let mut wb = Workbook::default();
        assert!(matches!(wb.save_file("Sheet1"), Err(RowcalcError::NoFilePath)));
    }

    #[test]
    fn test_functions_files() {
        let triple = TempFile::new("triple.rhai", "fn triple(x) { x * 3 }");
        let inc = TempFile::new("inc.rhai", "fn inc(x) { x + 1 }");
        let mut wb = Workbook::default();
        wb.set_cell_from_input(pos(1, 1), "=INC(TRIPLE(4))").unwrap();
        assert_eq!(wb.display_value(&pos(1, 1)), "#NAME?");

        let loaded = wb
            .load_functions_files(&[triple.0.clone(), inc.0.clone(), triple.0.clone()])
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(wb.display_value(&pos(1, 1)), "13");
    }

    #[test]
    fn test_bad_functions_keep_workbook_usable() {
        let mut wb = Workbook::default();
        assert!(matches!(
            wb.load_functions("fn broken( {"),
            Err(RowcalcError::Engine(_))
        ));
        wb.set_cell_from_input(pos(1, 1), "=1+1").unwrap();
        assert_eq!(wb.display_value(&pos(1, 1)), "2");
    }
}
