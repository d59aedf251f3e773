//! # sheetframe
//!
//! Reads spreadsheet workbooks in the packaged-XML format (.xlsx) and the
//! binary record format (.xlsb) into typed, columnar in-memory tables.
//!
//! Cells are collected into homogeneous per-column chunk runs while rows
//! stream, and every conversion (packed numerics, shared strings, serial
//! dates) is deferred until the whole sheet has been read. Row filters and
//! skips are decided at read time, so excluded rows never get converted at
//! all; a per-column policy then collapses mixed numeric/temporal/string
//! columns into one logical type.
//!
//! ```no_run
//! use sheetframe::{read_workbook, ReadOptions, SheetSelector};
//!
//! let table = read_workbook("report.xlsx", SheetSelector::Index(0), ReadOptions::default())?;
//! for column in &table.columns {
//!     println!("{}: {} ({} rows)", column.name, column.data.dtype(), column.data.len());
//! }
//! # Ok::<(), sheetframe::SheetFrameError>(())
//! ```

mod error;
mod frame;
mod helpers;
mod read;
mod spreadsheet;

pub use error::SheetFrameError;
pub use frame::assemble::DTypeSpec;
pub use frame::gate::{FilterStrategy, PairOp};
pub use frame::header::{HeaderLookup, HeaderSpec};
pub use frame::prepare::ConflictResolve;
pub use frame::{Array, Column, DType, Table};
pub use read::{
    read_workbook, read_workbook_bytes, sheet_names, sheet_names_bytes, NullValues, ReadOptions,
    RowCallback,
};
pub use spreadsheet::SheetSelector;

// Re-exported because `HeaderLookup` is an `Either` alias.
pub use either::Either;
