use super::Workbook;
use super::graph::{detect_cycle, recalc_waves, transitive_dependents};
use crate::error::{Result, RowcalcError};
use rowcalc_engine::engine::{
    CellConfig, CellPosition, CellsBySheet, DataType, ErrorCode, FormulaError, ParseResult,
    Reference,
};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

impl Workbook {
    /// Set cell contents from input string.
    pub fn set_cell_from_input(&mut self, position: CellPosition, input: &str) -> Result<()> {
        let changes = BTreeMap::from([((position.row, position.col), input.to_string())]);
        self.set_cells(&position.sheet, &changes)
    }

    /// Clear the specified cell
    pub fn clear_cell(&mut self, position: CellPosition) -> Result<()> {
        self.set_cell_from_input(position, "")
    }

    /// Apply a batch of raw inputs to `sheet`, keyed by `(row, col)`, and
    /// recalculate everything that depends on them.
    ///
    /// The batch is rejected as a whole, leaving the workbook untouched, if
    /// any of its formulas would close a cycle.
    pub fn set_cells(
        &mut self,
        sheet: &str,
        changes: &BTreeMap<(usize, usize), String>,
    ) -> Result<()> {
        let positions: Vec<CellPosition> = changes
            .keys()
            .map(|(row, col)| CellPosition::new(sheet, *row, *col))
            .collect();

        let mut previous: Vec<(CellPosition, Option<Vec<Reference>>)> = Vec::new();
        for (position, raw) in positions.iter().zip(changes.values()) {
            let old = self.track_precedents(position, &CellConfig::from_input(raw));
            previous.push((position.clone(), old));
        }

        // Check for circular dependencies before anything is stored
        for position in &positions {
            if let Some(path) = detect_cycle(position, &self.precedents) {
                for (position, old) in previous {
                    match old {
                        Some(refs) => self.precedents.insert(position, refs),
                        None => self.precedents.remove(&position),
                    };
                }
                let path = path
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                warn!(%path, "rejected circular edit");
                return Err(RowcalcError::CircularDependency(path));
            }
        }

        let results = self.evaluator.calculate_batch(sheet, changes, &[]);
        self.store_results(&results);
        self.modified = true;
        self.recalculate_dependents(&positions);
        Ok(())
    }

    /// Copy the input of `source` into `target`, shifting relative
    /// references by the distance between them.
    pub fn fill(&mut self, source: &CellPosition, target: CellPosition) -> Result<()> {
        let Some(cell) = self.store.get(source) else {
            return self.clear_cell(target);
        };
        let text = cell.text.clone().unwrap_or_default();
        let input = if cell.is_formula() {
            let delta_rows = target.row as i64 - source.row as i64;
            let delta_cols = target.col as i64 - source.col as i64;
            self.evaluator.fill_formula(&text, delta_rows, delta_cols)
        } else if cell.datatype == Some(DataType::Text) {
            format!("\"{text}\"")
        } else {
            text
        };
        self.set_cell_from_input(target, &input)
    }

    /// Change the sheet bounds references are clamped to, then recalculate.
    pub fn resize(&mut self, row_count: usize, column_count: usize) {
        self.evaluator.update_row_column_count(row_count, column_count);
        self.recalculate_all();
    }

    /// Replace every cell with `cells` and compute all formulas.
    pub fn load_cells(&mut self, cells: &CellsBySheet) {
        self.store.clear();
        self.store.extend(cells);
        self.rebuild_precedents();

        // One pass settles formulas over literals; formulas reading other
        // formulas are then redone in dependency order.
        let first = self.evaluator.initialize(cells);
        self.store_results(&first);
        let formulas: Vec<CellPosition> = self.precedents.keys().cloned().collect();
        self.recalculate_dependents(&formulas);
        info!(cells = self.store.len(), formulas = formulas.len(), "loaded workbook");
    }

    /// Recalculate every formula in the workbook.
    pub fn recalculate_all(&mut self) {
        let targets: HashSet<CellPosition> = self.precedents.keys().cloned().collect();
        self.recalculate(&targets);
    }

    fn recalculate_dependents(&mut self, changed: &[CellPosition]) {
        let targets = transitive_dependents(changed, &self.precedents);
        self.recalculate(&targets);
    }

    /// Evaluate `targets` wave by wave so each wave reads stored results of
    /// the waves before it.
    fn recalculate(&mut self, targets: &HashSet<CellPosition>) {
        if targets.is_empty() {
            return;
        }
        let (waves, stuck) = recalc_waves(targets, &self.precedents);
        for (i, wave) in waves.iter().enumerate() {
            debug!(wave = i, cells = wave.len(), "recalculating");
            let sheet = wave.first().map(|p| p.sheet.clone()).unwrap_or_default();
            let results = self.evaluator.calculate_batch(&sheet, &BTreeMap::new(), wave);
            self.store_results(&results);
        }
        for position in stuck {
            warn!(%position, "formula is part of a circular dependency");
            if let Some(mut cell) = self.store.get(&position) {
                ParseResult::from_error(FormulaError::new(
                    ErrorCode::Ref,
                    "Circular dependency detected",
                ))
                .apply_to(&mut cell);
                self.store.insert(&position, cell);
            }
        }
    }

    fn store_results(&self, results: &CellsBySheet) {
        for (position, cell) in results.iter() {
            self.store.insert(&position, cell.clone());
        }
    }

    /// Record the references of `cell` at `position`, returning the previous entry.
    fn track_precedents(
        &mut self,
        position: &CellPosition,
        cell: &CellConfig,
    ) -> Option<Vec<Reference>> {
        if cell.is_formula() {
            let text = cell.text.as_deref().unwrap_or_default();
            let refs = self.evaluator.get_dependencies(text, position);
            self.precedents.insert(position.clone(), refs)
        } else {
            self.precedents.remove(position)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pos(row: usize, col: usize) -> CellPosition {
        CellPosition::new("Sheet1", row, col)
    }

    #[test]
    fn test_formula_chain_recalculates() {
        let mut wb = Workbook::default();
        wb.set_cell_from_input(pos(1, 1), "1").unwrap(); // A1
        wb.set_cell_from_input(pos(1, 2), "=A1+1").unwrap(); // B1
        wb.set_cell_from_input(pos(1, 3), "=B1*10").unwrap(); // C1
        assert_eq!(wb.display_value(&pos(1, 3)), "20");

        wb.set_cell_from_input(pos(1, 1), "5").unwrap();
        assert_eq!(wb.display_value(&pos(1, 2)), "6");
        assert_eq!(wb.display_value(&pos(1, 3)), "60");
    }

    #[test]
    fn test_batch_with_formula_on_formula() {
        let mut wb = Workbook::default();
        let changes = BTreeMap::from([
            ((1, 1), "2".to_string()),
            ((2, 1), "=A1*2".to_string()),
            ((3, 1), "=A2+1".to_string()),
        ]);
        wb.set_cells("Sheet1", &changes).unwrap();
        assert_eq!(wb.display_value(&pos(2, 1)), "4");
        assert_eq!(wb.display_value(&pos(3, 1)), "5");
        assert!(wb.evaluator().cached_values().is_empty());
    }

    #[test]
    fn test_circular_edit_rejected_and_rolled_back() {
        let mut wb = Workbook::default();
        wb.set_cell_from_input(pos(1, 1), "=B1").unwrap();
        wb.set_cell_from_input(pos(1, 2), "3").unwrap();
        assert_eq!(wb.display_value(&pos(1, 1)), "3");

        let err = wb.set_cell_from_input(pos(1, 2), "=A1").unwrap_err();
        assert!(matches!(err, RowcalcError::CircularDependency(_)));
        assert_eq!(wb.display_value(&pos(1, 2)), "3");

        // The rejected formula left no trace in the graph.
        wb.set_cell_from_input(pos(1, 2), "4").unwrap();
        assert_eq!(wb.display_value(&pos(1, 1)), "4");
    }

    #[test]
    fn test_clear_cell_updates_dependents() {
        let mut wb = Workbook::default();
        wb.set_cell_from_input(pos(1, 1), "7").unwrap();
        wb.set_cell_from_input(pos(2, 1), "=SUM(A1:A1)+1").unwrap();
        wb.clear_cell(pos(1, 1)).unwrap();
        assert_eq!(wb.display_value(&pos(1, 1)), "");
        assert_eq!(wb.display_value(&pos(2, 1)), "1");
    }

    #[test]
    fn test_cross_sheet_dependents() {
        let mut wb = Workbook::default();
        wb.set_cell_from_input(CellPosition::new("Data", 1, 1), "10").unwrap();
        wb.set_cell_from_input(pos(1, 1), "=Data!A1/4").unwrap();
        wb.set_cell_from_input(CellPosition::new("Data", 1, 1), "20").unwrap();
        assert_eq!(wb.display_value(&pos(1, 1)), "5");
    }

    #[test]
    fn test_errors_display_their_code() {
        let mut wb = Workbook::default();
        wb.set_cell_from_input(pos(1, 1), "=1/0").unwrap();
        wb.set_cell_from_input(pos(1, 2), "=A1+1").unwrap();
        assert_eq!(wb.display_value(&pos(1, 1)), "#DIV/0!");
        assert_eq!(wb.display_value(&pos(1, 2)), "#DIV/0!");
    }

    #[test]
    fn test_fill_shifts_relative_references() {
        let mut wb = Workbook::default();
        wb.set_cell_from_input(pos(1, 1), "1").unwrap();
        wb.set_cell_from_input(pos(2, 1), "2").unwrap();
        wb.set_cell_from_input(pos(1, 2), "=A1*$A$1*10").unwrap();
        wb.fill(&pos(1, 2), pos(2, 2)).unwrap();
        assert_eq!(
            wb.store().get(&pos(2, 2)).and_then(|c| c.text),
            Some("=A2*$A$1*10".to_string())
        );
        assert_eq!(wb.display_value(&pos(2, 2)), "20");
    }

    #[test]
    fn test_load_cells_orders_formulas() {
        let mut wb = Workbook::default();
        let cells: CellsBySheet = [
            (pos(1, 1), CellConfig::from_input("=B1+1")),
            (pos(1, 2), CellConfig::from_input("=C1*2")),
            (pos(1, 3), CellConfig::from_input("3")),
        ]
        .into_iter()
        .collect();
        wb.load_cells(&cells);
        assert_eq!(wb.display_value(&pos(1, 1)), "7");
    }

    #[test]
    fn test_load_cells_marks_cycles() {
        let mut wb = Workbook::default();
        let cells: CellsBySheet = [
            (pos(1, 1), CellConfig::from_input("=B1")),
            (pos(1, 2), CellConfig::from_input("=A1")),
        ]
        .into_iter()
        .collect();
        wb.load_cells(&cells);
        assert_eq!(wb.display_value(&pos(1, 1)), "#REF!");
        assert_eq!(wb.display_value(&pos(1, 2)), "#REF!");
    }

    #[test]
    fn test_resize_reclamps_references() {
        let mut wb = Workbook::default();
        wb.set_cell_from_input(pos(3, 1), "9").unwrap();
        wb.set_cell_from_input(pos(1, 2), "=A10").unwrap();
        assert_eq!(wb.display_value(&pos(1, 2)), "0");
        wb.resize(3, 5);
        assert_eq!(wb.display_value(&pos(1, 2)), "9");
    }
}
