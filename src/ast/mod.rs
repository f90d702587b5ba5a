//! Cell-level source structures.

pub mod cell;

pub use cell::{CellId, CellIdError, CellManager};
