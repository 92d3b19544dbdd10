//! Cell addressing: A1 notation, sheet-qualified positions and ranges.
//!
//! All coordinates are 1-based, matching spreadsheet addressing:
//! `A1` is row 1, column 1.
//!
//! # Examples
//!
//! ```ignore
//! let cell = CellRef::from_str("B3").unwrap();
//! assert_eq!(cell.col, 2);
//! assert_eq!(cell.row, 3);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use super::lexer::{TokenKind, tokenize};
use crate::error::CalcError;

/// Sheet identifier (the sheet's display name).
pub type SheetId = String;

/// Last addressable row. Whole-column references (`A:A`) extend to it.
pub const MAX_ROW: usize = 1_048_576;

/// Last addressable column (`XFD`).
pub const MAX_COLUMN: usize = 16_384;

/// A sheet-less cell address (1-indexed).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> CellRef {
        CellRef { row, col }
    }

    /// Parse a cell reference from spreadsheet notation (e.g., "A1", "$B$2", "AA10").
    /// Returns None if the input is invalid.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<CellRef> {
        Self::parse_a1(name).map(|(cell, _, _)| cell)
    }

    /// Parse an A1 address, also reporting the `$` anchors as `(col_abs, row_abs)`.
    pub(crate) fn parse_a1(name: &str) -> Option<(CellRef, bool, bool)> {
        let caps = a1_re().captures(name)?;
        let col = letters_to_col(&caps["letters"])?;
        let row = caps["numbers"].parse::<usize>().ok()?;
        if row == 0 || row > MAX_ROW {
            return None;
        }
        let col_abs = caps.name("col_abs").is_some();
        let row_abs = caps.name("row_abs").is_some();
        Some((CellRef::new(row, col), col_abs, row_abs))
    }

    /// Convert a 1-based column index to letters (1 -> A, 26 -> Z, 27 -> AA).
    pub fn col_to_letters(col: usize) -> String {
        let mut result = String::new();
        let mut n = col as u128;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }
}

/// Parse column letters (case-insensitive, at most three) into a 1-based index.
pub(crate) fn letters_to_col(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col = 0usize;
    for c in letters.to_ascii_uppercase().bytes() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        col = col * 26 + (c - b'A') as usize + 1;
    }
    (col <= MAX_COLUMN).then_some(col)
}

fn a1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?<col_abs>\$)?(?<letters>[A-Za-z]{1,3})(?<row_abs>\$)?(?<numbers>[0-9]+)$")
            .expect("A1 reference regex must compile")
    })
}

impl std::str::FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_a1(s)
            .map(|(cell, _, _)| cell)
            .ok_or_else(|| format!("Invalid cell reference: {}", s))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CellRef::col_to_letters(self.col), self.row)
    }
}

/// Quote a sheet name for use in a formula when it is not a plain identifier.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && CellRef::from_str(name).is_none();
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// One cell on one sheet.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellPosition {
    pub sheet: SheetId,
    pub row: usize,
    pub col: usize,
}

impl CellPosition {
    pub fn new(sheet: impl Into<SheetId>, row: usize, col: usize) -> Self {
        CellPosition {
            sheet: sheet.into(),
            row,
            col,
        }
    }

    pub fn cell_ref(&self) -> CellRef {
        CellRef::new(self.row, self.col)
    }
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", quote_sheet_name(&self.sheet), self.cell_ref())
    }
}

/// Rectangular block of cells on one sheet, bounds inclusive.
///
/// `from`/`to` are kept as written; a range authored bottom-up or
/// right-to-left is only reordered by [`CellRange::normalized`].
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellRange {
    pub sheet: SheetId,
    pub from: CellRef,
    pub to: CellRef,
}

impl CellRange {
    pub fn new(sheet: impl Into<SheetId>, from: CellRef, to: CellRef) -> Self {
        CellRange {
            sheet: sheet.into(),
            from,
            to,
        }
    }

    /// Same range with `from` at the top-left and `to` at the bottom-right.
    pub fn normalized(&self) -> CellRange {
        CellRange {
            sheet: self.sheet.clone(),
            from: CellRef::new(self.from.row.min(self.to.row), self.from.col.min(self.to.col)),
            to: CellRef::new(self.from.row.max(self.to.row), self.from.col.max(self.to.col)),
        }
    }

    pub fn contains(&self, position: &CellPosition) -> bool {
        let range = self.normalized();
        range.sheet == position.sheet
            && (range.from.row..=range.to.row).contains(&position.row)
            && (range.from.col..=range.to.col).contains(&position.col)
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}:{}", quote_sheet_name(&self.sheet), self.from, self.to)
    }
}

/// A reference found in formula text: a single cell or a range.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Reference {
    Cell(CellPosition),
    Range(CellRange),
}

impl Reference {
    pub fn sheet(&self) -> &str {
        match self {
            Reference::Cell(pos) => &pos.sheet,
            Reference::Range(range) => &range.sheet,
        }
    }

    /// Whether `position` is the referenced cell or lies inside the referenced range.
    pub fn contains(&self, position: &CellPosition) -> bool {
        match self {
            Reference::Cell(pos) => pos == position,
            Reference::Range(range) => range.contains(position),
        }
    }

    /// Parse a single reference such as `A1`, `Sheet2!B2:B4` or `'My Sheet'!C:C`,
    /// qualifying unqualified references with `default_sheet`.
    pub fn parse(text: &str, default_sheet: &str) -> Result<Reference, CalcError> {
        let invalid = || CalcError::InvalidReference(text.to_string());
        let tokens = tokenize(text).map_err(|_| invalid())?;
        match tokens.as_slice() {
            [token] => match &token.kind {
                TokenKind::Reference(r) => Ok(r.to_reference(default_sheet)),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Cell(pos) => pos.fmt(f),
            Reference::Range(range) => range.fmt(f),
        }
    }
}
