//! The read entry points and the per-sheet lifecycle:
//! skip rows, find the header, gate body rows into column series, then
//! prepare and assemble the table.

use crate::error::SheetFrameError;
use crate::frame::assemble::{assemble_table, DTypeSpec};
use crate::frame::gate::{resolve_filters, FilterStrategy, RowGate, Verdict};
use crate::frame::header::{build_names, row_matches_lookup, synthetic_name, HeaderLookup, HeaderSpec};
use crate::frame::prepare::{
    cell_text, ConflictResolve, PrepareContext, DEFAULT_DATETIME_FORMATS,
};
use crate::frame::series::ColumnSeries;
use crate::frame::Table;
use crate::helpers::source::ByteSource;
use crate::spreadsheet::cell::{cell_reference, RawCell};
use crate::spreadsheet::{open_workbook, CellSink, SharedStrings, SheetSelector};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::ControlFlow;
use std::path::Path;

/// Widest sheet either format can address (column XFD).
const MAX_COLUMNS: usize = 16_384;

/// Cells matching these become blank during reading, before the row gate
/// sees them.
pub enum NullValues {
    Literals(HashSet<String>),
    Predicate(Box<dyn Fn(&str) -> bool>),
}

impl NullValues {
    fn matches(&self, value: &str) -> bool {
        match self {
            NullValues::Literals(literals) => literals.contains(value),
            NullValues::Predicate(predicate) => predicate(value),
        }
    }
}

impl Default for NullValues {
    fn default() -> Self {
        NullValues::Literals(HashSet::from([String::new()]))
    }
}

/// Invoked once per admitted body row; an `Err` aborts the read as
/// [`SheetFrameError::Cancelled`].
pub type RowCallback = Box<dyn FnMut() -> Result<(), String>>;

/// Options of one read call. `Default` gives a one-row header, empty-string
/// nulls, six-decimal narrowing, and the `all` conflict strategy.
pub struct ReadOptions {
    pub header: HeaderSpec,
    pub dtypes: Option<DTypeSpec>,
    /// Spreadsheet columns (0-based) omitted before any series is built.
    pub skip_cols: HashSet<usize>,
    /// Rows discarded at the top, before header lookup.
    pub skip_rows: usize,
    /// Rows discarded between header and body.
    pub skip_rows_after_header: usize,
    /// Hard bound on admitted body rows.
    pub take_rows: Option<usize>,
    /// When false, rows without a single non-blank cell pass the default
    /// gate.
    pub take_rows_non_empty: bool,
    pub lookup_head: Option<HeaderLookup>,
    /// Rows scanned for the header before giving up (default 30).
    pub lookup_size: usize,
    /// Patterns naming columns whose cells must be non-blank.
    pub row_filters: Vec<Regex>,
    pub row_filters_strategy: FilterStrategy,
    /// Decimals for float-to-int narrowing; None disables it.
    pub float_precision: Option<i32>,
    /// strftime patterns for string-to-timestamp coercion.
    pub datetime_formats: Vec<String>,
    pub conflict_resolve: ConflictResolve,
    pub null_values: NullValues,
    pub row_callback: Option<RowCallback>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            header: HeaderSpec::default(),
            dtypes: None,
            skip_cols: HashSet::new(),
            skip_rows: 0,
            skip_rows_after_header: 0,
            take_rows: None,
            take_rows_non_empty: true,
            lookup_head: None,
            lookup_size: 30,
            row_filters: Vec::new(),
            row_filters_strategy: FilterStrategy::default(),
            float_precision: Some(6),
            datetime_formats: DEFAULT_DATETIME_FORMATS
                .iter()
                .map(|format| format.to_string())
                .collect(),
            conflict_resolve: ConflictResolve::default(),
            null_values: NullValues::default(),
            row_callback: None,
        }
    }
}

/// Reads one sheet of a workbook file into a columnar table.
pub fn read_workbook<P: AsRef<Path>>(
    path: P,
    sheet: SheetSelector,
    options: ReadOptions,
) -> Result<Table, SheetFrameError> {
    read_source(ByteSource::open(path.as_ref())?, sheet, options)
}

/// Reads one sheet of an in-memory workbook into a columnar table.
pub fn read_workbook_bytes(
    bytes: Vec<u8>,
    sheet: SheetSelector,
    options: ReadOptions,
) -> Result<Table, SheetFrameError> {
    read_source(ByteSource::from_bytes(bytes), sheet, options)
}

/// Lists the worksheet names of a workbook file.
pub fn sheet_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>, SheetFrameError> {
    Ok(open_workbook(ByteSource::open(path.as_ref())?)?.sheet_names())
}

/// Lists the worksheet names of an in-memory workbook.
pub fn sheet_names_bytes(bytes: Vec<u8>) -> Result<Vec<String>, SheetFrameError> {
    Ok(open_workbook(ByteSource::from_bytes(bytes))?.sheet_names())
}

fn read_source(
    source: ByteSource,
    sheet: SheetSelector,
    mut options: ReadOptions,
) -> Result<Table, SheetFrameError> {
    // A zero-row header means no header at all.
    if matches!(options.header, HeaderSpec::Present { rows: 0 }) {
        options.header = HeaderSpec::Absent;
    }

    let mut workbook = open_workbook(source)?;
    let names = workbook.sheet_names();
    let sheet_name = match &sheet {
        SheetSelector::Index(index) => names
            .get(*index)
            .cloned()
            .ok_or_else(|| SheetFrameError::SheetNotFound(format!("#{index}")))?,
        SheetSelector::Name(name) => names
            .iter()
            .find(|candidate| *candidate == name)
            .cloned()
            .ok_or_else(|| SheetFrameError::SheetNotFound(name.clone()))?,
    };

    let shared = workbook.load_shared_strings()?;
    let date1904 = workbook.date1904();
    let mut reader = SheetReader::new(&mut options, &shared, date1904, sheet_name)?;
    workbook.stream_sheet(&sheet, &mut reader)?;
    reader.finish()
}

/// Read lifecycle phase. Prepare and emission happen after the stream ends.
#[derive(Copy, Clone)]
enum Phase {
    /// Scanning for the header start (header present only).
    Lookup,
    /// Consuming the header band.
    Header { remaining: usize },
    InBody,
}

/// The per-sheet reader driven by the adapter's cell stream. Rows are
/// accumulated one at a time; the pending row resolves when the stream
/// moves past it.
struct SheetReader<'a> {
    options: &'a mut ReadOptions,
    shared: &'a SharedStrings,
    date1904: bool,
    sheet: String,
    phase: Phase,

    // header discovery
    band: Vec<BTreeMap<usize, String>>,
    band_columns: BTreeSet<usize>,
    header_names: BTreeMap<usize, String>,

    // body
    gate: Option<RowGate>,
    series: BTreeMap<usize, ColumnSeries>,
    /// Admitted body rows so far; also the body row index of the pending
    /// row.
    body_rows: usize,

    // the pending sheet row
    pending_row: Option<usize>,
    pending_texts: BTreeMap<usize, String>,
    touched: BTreeSet<usize>,
    nonblank: BTreeSet<usize>,
    last_finished_row: Option<usize>,
}

impl<'a> SheetReader<'a> {
    fn new(
        options: &'a mut ReadOptions,
        shared: &'a SharedStrings,
        date1904: bool,
        sheet: String,
    ) -> Result<SheetReader<'a>, SheetFrameError> {
        let mut reader = SheetReader {
            options,
            shared,
            date1904,
            sheet,
            phase: Phase::Lookup,
            band: Vec::new(),
            band_columns: BTreeSet::new(),
            header_names: BTreeMap::new(),
            gate: None,
            series: BTreeMap::new(),
            body_rows: 0,
            pending_row: None,
            pending_texts: BTreeMap::new(),
            touched: BTreeSet::new(),
            nonblank: BTreeSet::new(),
            last_finished_row: None,
        };
        if !matches!(reader.options.header, HeaderSpec::Present { .. }) {
            // No header region to consume: the body starts right after the
            // top skip.
            let body_start = reader.options.skip_rows + reader.options.skip_rows_after_header;
            reader.configure_gate(body_start)?;
            reader.phase = Phase::InBody;
            reader.last_finished_row = body_start.checked_sub(1);
        }
        Ok(reader)
    }

    /// Maps string cells matching the configured null values to blanks, and
    /// validates shared-string indices on the way.
    fn apply_null_values(
        &self,
        row: usize,
        col: usize,
        cell: RawCell,
    ) -> Result<RawCell, SheetFrameError> {
        match cell {
            RawCell::InlineString(string) => {
                if self.options.null_values.matches(&string) {
                    Ok(RawCell::Blank)
                } else {
                    Ok(RawCell::InlineString(string))
                }
            }
            RawCell::SharedStringRef(index) => {
                let resolved = self.shared.get(index).ok_or_else(|| {
                    SheetFrameError::SharedStringsCorrupt {
                        sheet: self.sheet.clone(),
                        reference: cell_reference(row, col),
                        index,
                        len: self.shared.len(),
                    }
                })?;
                if self.options.null_values.matches(resolved) {
                    Ok(RawCell::Blank)
                } else {
                    Ok(RawCell::SharedStringRef(index))
                }
            }
            cell => Ok(cell),
        }
    }

    /// Resolves row filters against the final column names and builds the
    /// gate.
    fn configure_gate(&mut self, body_start_row: usize) -> Result<(), SheetFrameError> {
        let filters = if self.options.row_filters.is_empty() {
            Vec::new()
        } else {
            let names = self.filter_name_universe();
            resolve_filters(&self.options.row_filters, &names)?
        };
        self.gate = Some(RowGate::new(
            body_start_row,
            !self.options.take_rows_non_empty,
            self.options.take_rows,
            filters,
            self.options.row_filters_strategy.clone(),
        )?);
        Ok(())
    }

    /// The (column, name) pairs filter patterns match against. With a
    /// discovered header these are the header names; otherwise synthetic or
    /// explicit names map positionally onto the non-skipped columns from A.
    fn filter_name_universe(&self) -> Vec<(usize, String)> {
        match &self.options.header {
            HeaderSpec::Present { .. } => self
                .header_names
                .iter()
                .map(|(col, name)| (*col, name.clone()))
                .collect(),
            HeaderSpec::Absent => (0..MAX_COLUMNS)
                .filter(|col| !self.options.skip_cols.contains(col))
                .enumerate()
                .map(|(position, col)| (col, synthetic_name(position)))
                .collect(),
            HeaderSpec::Explicit(names) => (0..MAX_COLUMNS)
                .filter(|col| !self.options.skip_cols.contains(col))
                .zip(names.iter())
                .map(|(col, name)| (col, name.clone()))
                .collect(),
        }
    }

    fn resolve_header(&mut self) {
        self.header_names = build_names(&self.band, &self.band_columns);
    }

    /// Leaves the header region: final names exist, filters resolve, the
    /// gate opens.
    fn begin_body(&mut self, header_end_row: usize) -> Result<(), SheetFrameError> {
        self.resolve_header();
        let body_start = header_end_row + 1 + self.options.skip_rows_after_header;
        self.configure_gate(body_start)?;
        self.phase = Phase::InBody;
        self.last_finished_row = Some(body_start - 1);
        Ok(())
    }

    /// Admits wholly absent rows between two streamed rows when the options
    /// keep empty rows. Only the no-filter keep-empty configuration can
    /// admit such rows, so everything else skips the walk.
    fn process_gap_rows(&mut self, next_row: usize) -> Result<ControlFlow<()>, SheetFrameError> {
        if !matches!(self.phase, Phase::InBody)
            || self.options.take_rows_non_empty
            || !self.options.row_filters.is_empty()
        {
            return Ok(ControlFlow::Continue(()));
        }
        let from = match self.last_finished_row {
            Some(last) => last + 1,
            None => 0,
        };
        let empty = BTreeSet::new();
        for row in from..next_row {
            let verdict = self.gate.as_mut().expect("gate in body").verdict(row, &empty);
            match verdict {
                Verdict::Admit => {
                    self.body_rows = self.gate.as_ref().expect("gate in body").admitted();
                    self.invoke_callback()?;
                    if self.gate.as_ref().expect("gate in body").exhausted() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Verdict::Drop => (),
                Verdict::Exhausted => return Ok(ControlFlow::Break(())),
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn invoke_callback(&mut self) -> Result<(), SheetFrameError> {
        if let Some(callback) = self.options.row_callback.as_mut() {
            callback().map_err(SheetFrameError::Cancelled)?;
        }
        Ok(())
    }

    /// Resolves the pending row once the stream has moved past it.
    fn end_row(&mut self, row: usize) -> Result<ControlFlow<()>, SheetFrameError> {
        let result = match self.phase {
            Phase::Lookup => self.end_lookup_row(row)?,
            Phase::Header { remaining } => self.end_header_row(row, remaining)?,
            Phase::InBody => self.end_body_row(row)?,
        };
        self.last_finished_row = Some(row);
        self.pending_texts.clear();
        self.touched.clear();
        self.nonblank.clear();
        Ok(result)
    }

    fn end_lookup_row(&mut self, row: usize) -> Result<ControlFlow<()>, SheetFrameError> {
        if row < self.options.skip_rows {
            return Ok(ControlFlow::Continue(()));
        }
        if self.options.lookup_head.is_some()
            && row >= self.options.skip_rows + self.options.lookup_size
        {
            return Err(SheetFrameError::HeaderLookup {
                sheet: self.sheet.clone(),
                size: self.options.lookup_size,
            });
        }
        if !row_matches_lookup(self.options.lookup_head.as_ref(), &self.pending_texts) {
            return Ok(ControlFlow::Continue(()));
        }

        let rows = match &self.options.header {
            HeaderSpec::Present { rows } => *rows,
            _ => unreachable!("lookup phase implies a header"),
        };
        self.phase = Phase::Header { remaining: rows };
        self.end_row_as_header(row, rows)
    }

    fn end_header_row(
        &mut self,
        row: usize,
        remaining: usize,
    ) -> Result<ControlFlow<()>, SheetFrameError> {
        // Empty rows inside the header band do not count toward it.
        if self.pending_texts.is_empty() {
            return Ok(ControlFlow::Continue(()));
        }
        self.end_row_as_header(row, remaining)
    }

    fn end_row_as_header(
        &mut self,
        row: usize,
        remaining: usize,
    ) -> Result<ControlFlow<()>, SheetFrameError> {
        self.band_columns.extend(self.pending_texts.keys().copied());
        self.band.push(std::mem::take(&mut self.pending_texts));
        if remaining > 1 {
            self.phase = Phase::Header {
                remaining: remaining - 1,
            };
        } else {
            self.begin_body(row)?;
        }
        Ok(ControlFlow::Continue(()))
    }

    fn end_body_row(&mut self, row: usize) -> Result<ControlFlow<()>, SheetFrameError> {
        let verdict = self
            .gate
            .as_mut()
            .expect("gate in body")
            .verdict(row, &self.nonblank);
        match verdict {
            Verdict::Admit => {
                self.body_rows = self.gate.as_ref().expect("gate in body").admitted();
                self.invoke_callback()?;
                if self.gate.as_ref().expect("gate in body").exhausted() {
                    return Ok(ControlFlow::Break(()));
                }
                Ok(ControlFlow::Continue(()))
            }
            verdict => {
                // Roll the pending row back out of every series it touched.
                let dropped = BTreeSet::from([self.body_rows]);
                for col in &self.touched {
                    if let Some(series) = self.series.get_mut(col) {
                        series.drop_rows(&dropped);
                    }
                }
                if verdict == Verdict::Exhausted {
                    Ok(ControlFlow::Break(()))
                } else {
                    Ok(ControlFlow::Continue(()))
                }
            }
        }
    }

    /// Ends the final pending row, closes the header if the sheet ran out
    /// early, seals every series, and hands off to prepare and assembly.
    fn finish(mut self) -> Result<Table, SheetFrameError> {
        if let Some(row) = self.pending_row.take() {
            let _ = self.end_row(row)?;
        }

        match self.phase {
            Phase::Lookup if self.options.lookup_head.is_some() => {
                return Err(SheetFrameError::HeaderLookup {
                    sheet: self.sheet.clone(),
                    size: self.options.lookup_size,
                });
            }
            // A header cut short by the end of the sheet still names what
            // it covered; there are no body rows.
            Phase::Header { .. } => self.resolve_header(),
            _ => (),
        }

        let names = std::mem::take(&mut self.header_names);
        for (col, name) in names {
            let series = self
                .series
                .entry(col)
                .or_insert_with(|| ColumnSeries::new(col));
            series.header = Some(name);
        }
        for series in self.series.values_mut() {
            series.seal(self.body_rows);
        }

        let ctx = PrepareContext {
            sheet: &self.sheet,
            shared: self.shared,
            date1904: self.date1904,
            float_precision: self.options.float_precision,
            datetime_formats: &self.options.datetime_formats,
            conflict: self.options.conflict_resolve,
        };
        assemble_table(
            std::mem::take(&mut self.series),
            &self.options.header,
            self.options.dtypes.as_ref(),
            &ctx,
            self.body_rows,
        )
    }
}

impl CellSink for SheetReader<'_> {
    fn cell(
        &mut self,
        row: usize,
        col: usize,
        cell: RawCell,
    ) -> Result<ControlFlow<()>, SheetFrameError> {
        if self.options.skip_cols.contains(&col) {
            return Ok(ControlFlow::Continue(()));
        }

        if self.pending_row != Some(row) {
            if let Some(pending) = self.pending_row.take() {
                if row < pending {
                    return Err(SheetFrameError::Format(format!(
                        "cell stream left row order at {}",
                        cell_reference(row, col)
                    )));
                }
                if self.end_row(pending)?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
            if self.process_gap_rows(row)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
            self.pending_row = Some(row);
        }
        if !self.touched.insert(col) {
            // Duplicate cell for the same position; keep the first.
            return Ok(ControlFlow::Continue(()));
        }

        let cell = self.apply_null_values(row, col, cell)?;
        match self.phase {
            Phase::Lookup | Phase::Header { .. } => {
                if row >= self.options.skip_rows {
                    if let Some(text) = cell_text(&cell, self.shared, self.date1904) {
                        self.pending_texts.insert(col, text);
                    }
                }
            }
            Phase::InBody => {
                if cell != RawCell::Blank {
                    self.nonblank.insert(col);
                }
                let body_row = self.body_rows;
                self.series
                    .entry(col)
                    .or_insert_with(|| ColumnSeries::new(col))
                    .record(body_row, cell);
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}
