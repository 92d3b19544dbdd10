//! Cell storage shared by a workbook and its evaluator.

use dashmap::DashMap;
use rowcalc_engine::engine::{CellConfig, CellPosition, CellStore, CellsBySheet, SheetId};
use std::collections::BTreeMap;
use std::sync::Arc;

type Rows = BTreeMap<usize, BTreeMap<usize, CellConfig>>;

/// Cells of every sheet, keyed sheet -> row -> column.
///
/// DashMap is internally Arc-based and this wrapper adds another `Arc`, so
/// clones are cheap and all clones see the same cells.
#[derive(Clone, Default)]
pub struct SheetStore {
    sheets: Arc<DashMap<SheetId, Rows>>,
}

impl SheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, position: &CellPosition) -> Option<CellConfig> {
        self.get_value(&position.sheet, position.row, position.col)
    }

    /// Store `cell`, returning the previous one. Blank literal cells are
    /// removed instead of stored.
    pub fn insert(&self, position: &CellPosition, cell: CellConfig) -> Option<CellConfig> {
        if cell.is_blank() && !cell.is_formula() {
            return self.remove(position);
        }
        self.sheets
            .entry(position.sheet.clone())
            .or_default()
            .entry(position.row)
            .or_default()
            .insert(position.col, cell)
    }

    pub fn remove(&self, position: &CellPosition) -> Option<CellConfig> {
        let mut rows = self.sheets.get_mut(&position.sheet)?;
        let cols = rows.get_mut(&position.row)?;
        let old = cols.remove(&position.col);
        if cols.is_empty() {
            rows.remove(&position.row);
        }
        old
    }

    pub fn extend(&self, cells: &CellsBySheet) {
        for (position, cell) in cells.iter() {
            self.insert(&position, cell.clone());
        }
    }

    /// Copy of every stored cell.
    pub fn snapshot(&self) -> CellsBySheet {
        let mut out = CellsBySheet::new();
        for entry in self.sheets.iter() {
            for (row, cols) in entry.value() {
                for (col, cell) in cols {
                    out.insert(entry.key(), *row, *col, cell.clone());
                }
            }
        }
        out
    }

    /// Sorted names of sheets holding at least one cell.
    pub fn sheet_names(&self) -> Vec<SheetId> {
        let mut names: Vec<SheetId> = self
            .sheets
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Bounding box `(min_row, min_col, max_row, max_col)` of a sheet's cells.
    pub fn extent(&self, sheet: &str) -> Option<(usize, usize, usize, usize)> {
        let rows = self.sheets.get(sheet)?;
        let min_row = *rows.keys().next()?;
        let max_row = *rows.keys().next_back()?;
        let min_col = rows.values().filter_map(|cols| cols.keys().next()).min()?;
        let max_col = rows.values().filter_map(|cols| cols.keys().next_back()).max()?;
        Some((min_row, *min_col, max_row, *max_col))
    }

    pub fn len(&self) -> usize {
        self.sheets
            .iter()
            .map(|entry| entry.value().values().map(BTreeMap::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.sheets.clear();
    }
}

impl CellStore for SheetStore {
    fn get_value(&self, sheet: &str, row: usize, col: usize) -> Option<CellConfig> {
        self.sheets.get(sheet)?.get(&row)?.get(&col).cloned()
    }

    fn min_max_rows(&self, sheet: &str) -> (usize, usize) {
        self.sheets
            .get(sheet)
            .and_then(|rows| Some((*rows.keys().next()?, *rows.keys().next_back()?)))
            .unwrap_or((1, 0))
    }

    fn min_max_columns(&self, sheet: &str, row: usize) -> (usize, usize) {
        self.sheets
            .get(sheet)
            .and_then(|rows| {
                let cols = rows.get(&row)?;
                Some((*cols.keys().next()?, *cols.keys().next_back()?))
            })
            .unwrap_or((1, 0))
    }
}
