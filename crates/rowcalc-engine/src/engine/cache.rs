//! Sheet/row/column keyed cell maps, used as the evaluation cache and as
//! the shape of batch results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cell::CellConfig;
use super::cell_ref::{CellPosition, SheetId};

type Rows = BTreeMap<usize, BTreeMap<usize, CellConfig>>;

/// `sheet -> row -> col -> CellConfig`, ordered for deterministic iteration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellsBySheet(BTreeMap<SheetId, Rows>);

impl CellsBySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|rows| rows.values().all(BTreeMap::is_empty))
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.0
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum()
    }

    pub fn get(&self, sheet: &str, row: usize, col: usize) -> Option<&CellConfig> {
        self.0.get(sheet)?.get(&row)?.get(&col)
    }

    pub fn get_at(&self, position: &CellPosition) -> Option<&CellConfig> {
        self.get(&position.sheet, position.row, position.col)
    }

    pub fn insert(&mut self, sheet: &str, row: usize, col: usize, cell: CellConfig) {
        self.0
            .entry(sheet.to_string())
            .or_default()
            .entry(row)
            .or_default()
            .insert(col, cell);
    }

    pub fn insert_at(&mut self, position: &CellPosition, cell: CellConfig) {
        self.insert(&position.sheet, position.row, position.col, cell);
    }

    /// Merge `overlay` into `self`. Sheets and rows are merged key by key;
    /// a cell present in both is replaced by the overlay's cell, so stale
    /// result fields never survive a merge.
    pub fn merge(&mut self, overlay: CellsBySheet) {
        for (sheet, rows) in overlay.0 {
            let target = self.0.entry(sheet).or_default();
            for (row, cols) in rows {
                target.entry(row).or_default().extend(cols);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellPosition, &CellConfig)> {
        self.0.iter().flat_map(|(sheet, rows)| {
            rows.iter().flat_map(move |(row, cols)| {
                cols.iter()
                    .map(move |(col, cell)| (CellPosition::new(sheet.as_str(), *row, *col), cell))
            })
        })
    }

    pub fn sheets(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Smallest and largest populated row of `sheet`.
    pub fn row_extent(&self, sheet: &str) -> Option<(usize, usize)> {
        let rows = self.0.get(sheet)?;
        let mut populated = rows.iter().filter(|(_, cols)| !cols.is_empty()).map(|(r, _)| *r);
        let first = populated.next()?;
        Some((first, populated.last().unwrap_or(first)))
    }

    /// Smallest and largest populated column in one row of `sheet`.
    pub fn column_extent(&self, sheet: &str, row: usize) -> Option<(usize, usize)> {
        let cols = self.0.get(sheet)?.get(&row)?;
        let first = *cols.keys().next()?;
        let last = *cols.keys().next_back()?;
        Some((first, last))
    }
}

impl FromIterator<(CellPosition, CellConfig)> for CellsBySheet {
    fn from_iter<I: IntoIterator<Item = (CellPosition, CellConfig)>>(iter: I) -> Self {
        let mut cells = CellsBySheet::new();
        for (position, cell) in iter {
            cells.insert_at(&position, cell);
        }
        cells
    }
}
