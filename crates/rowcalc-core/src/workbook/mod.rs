//! Workbook state and logic (UI-agnostic).

mod graph;
mod io;
mod ops;
mod state;
mod store;

pub use graph::{Precedents, detect_cycle};
pub use state::Workbook;
pub use store::SheetStore;
