//! rowcalc-core - UI-agnostic workbook model + storage.

pub mod error;
pub mod storage;
pub mod workbook;

pub use error::{Result, RowcalcError};
pub use workbook::{SheetStore, Workbook};

pub use rowcalc_engine::engine::{CellConfig, CellPosition, CellsBySheet};
