//! Column series: the ordered chunk list built for one spreadsheet column
//! while rows stream in.

use crate::frame::chunk::{Chunk, ChunkData, Element, StorageShape};
use crate::spreadsheet::cell::{error_code_text, RawCell};
use std::collections::BTreeSet;

/// One column under construction. Rows are body rows (gate-admitted row
/// positions), dense from zero; gaps between recorded cells become null
/// runs so the chunk list always covers `0..next_row()`.
#[derive(Debug)]
pub(crate) struct ColumnSeries {
    /// Spreadsheet column index (zero-based column letter number).
    pub(crate) col: usize,
    /// Header text discovered for this column, if any.
    pub(crate) header: Option<String>,
    pub(crate) chunks: Vec<Chunk>,
}

impl ColumnSeries {
    pub(crate) fn new(col: usize) -> ColumnSeries {
        ColumnSeries {
            col,
            header: None,
            chunks: Vec::new(),
        }
    }

    /// Body row the next element will land on.
    pub(crate) fn next_row(&self) -> usize {
        self.chunks.last().map(Chunk::end_row).unwrap_or(0)
    }

    pub(crate) fn total_len(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    /// Whether the column ever held a non-null element.
    pub(crate) fn has_values(&self) -> bool {
        self.chunks
            .iter()
            .any(|chunk| chunk.shape() != StorageShape::Null)
    }

    /// Records a cell at the given body row, filling any gap since the last
    /// recorded row with nulls. Booleans and error codes collapse onto
    /// string runs here; a blank extends the null run.
    pub(crate) fn record(&mut self, row: usize, cell: RawCell) {
        let next = self.next_row();
        debug_assert!(row >= next, "cells must arrive in row order");
        if row > next {
            self.push_nulls(row - next);
        }
        let element = match cell {
            RawCell::Number { value, temporal } => Element::Number { value, temporal },
            RawCell::RkNumber(raw) => Element::Rk(raw),
            RawCell::InlineString(string) => Element::Str(string),
            RawCell::SharedStringRef(index) => Element::SharedIdx(index),
            RawCell::Boolean(value) => Element::Str(if value { "true" } else { "false" }.to_string()),
            RawCell::ErrorCode(code) => Element::Str(error_code_text(code).to_string()),
            RawCell::Blank => Element::Null,
        };
        self.push_element(self.next_row(), element);
    }

    fn push_nulls(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(Chunk {
            data: ChunkData::NullRun(existing),
            ..
        }) = self.chunks.last_mut()
        {
            *existing += count;
            return;
        }
        self.chunks.push(Chunk {
            origin_row: self.next_row(),
            data: ChunkData::NullRun(count),
        });
    }

    fn push_element(&mut self, row: usize, element: Element) {
        debug_assert_eq!(row, self.next_row());
        match self.chunks.last_mut() {
            Some(chunk) => {
                if let Some(element) = chunk.extend(element) {
                    self.chunks.push(Chunk::open(row, element));
                }
            }
            None => self.chunks.push(Chunk::open(row, element)),
        }
    }

    /// Removes elements at body rows >= `row`. The row-gate rollback path:
    /// only the pending trailing row is ever removed this way.
    pub(crate) fn truncate_to(&mut self, row: usize) {
        while let Some(chunk) = self.chunks.last_mut() {
            if chunk.origin_row >= row {
                self.chunks.pop();
            } else {
                if !chunk.truncate_to(row) {
                    self.chunks.pop();
                }
                break;
            }
        }
    }

    /// Removes the given body rows, shifting later rows down so the
    /// surviving rows form contiguous runs again. A trailing contiguous set
    /// reduces to a truncation; anything else rebuilds the chunk list,
    /// re-coalescing adjacent nulls.
    pub(crate) fn drop_rows(&mut self, rows: &BTreeSet<usize>) {
        if rows.is_empty() {
            return;
        }
        let next = self.next_row();
        let min = *rows.iter().next().expect("non-empty set");
        if rows.len() == next.saturating_sub(min)
            && rows.iter().next_back() == Some(&(next - 1))
        {
            self.truncate_to(min);
            return;
        }

        let dropped: Vec<usize> = rows.iter().copied().collect();
        let old = std::mem::take(&mut self.chunks);
        for chunk in old {
            for (row, element) in chunk.into_elements() {
                if rows.contains(&row) {
                    continue;
                }
                let shift = dropped.partition_point(|&d| d < row);
                self.push_element(row - shift, element);
            }
        }
    }

    /// Pads the series with nulls up to the admitted row count and verifies
    /// the chunk invariant.
    pub(crate) fn seal(&mut self, total_rows: usize) {
        let next = self.next_row();
        debug_assert!(next <= total_rows);
        if next < total_rows {
            self.push_nulls(total_rows - next);
        }
        debug_assert_eq!(self.total_len(), total_rows);
    }

    /// The storage shape holding the most elements; ties break toward
    /// numeric, then temporal numeric, then string, then null.
    pub(crate) fn dominant_shape(&self) -> Option<StorageShape> {
        let mut counts: Vec<(StorageShape, usize)> = Vec::new();
        for chunk in &self.chunks {
            let shape = chunk.shape();
            match counts.iter_mut().find(|(s, _)| *s == shape) {
                Some((_, count)) => *count += chunk.len(),
                None => counts.push((shape, chunk.len())),
            }
        }
        counts
            .into_iter()
            .max_by_key(|(shape, count)| (*count, shape.rank()))
            .map(|(shape, _)| shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(value: f64) -> RawCell {
        RawCell::Number {
            value,
            temporal: false,
        }
    }

    #[test]
    fn gaps_become_null_runs() {
        let mut series = ColumnSeries::new(0);
        series.record(0, number(1.0));
        series.record(3, number(2.0));

        assert_eq!(series.chunks.len(), 3);
        assert_eq!(series.chunks[1].data, ChunkData::NullRun(2));
        assert_eq!(series.total_len(), 4);
    }

    #[test]
    fn shape_transitions_open_chunks() {
        let mut series = ColumnSeries::new(0);
        series.record(0, number(1.0));
        series.record(1, RawCell::Number { value: 2.0, temporal: true });
        series.record(2, RawCell::InlineString("x".to_string()));
        series.record(3, RawCell::Boolean(true));
        series.record(4, RawCell::ErrorCode(0x07));

        let shapes: Vec<StorageShape> = series.chunks.iter().map(Chunk::shape).collect();
        assert_eq!(
            shapes,
            vec![
                StorageShape::Number { temporal: false },
                StorageShape::Number { temporal: true },
                StorageShape::Str,
            ]
        );
        // booleans and error codes merged into the string run
        assert_eq!(
            series.chunks[2].data,
            ChunkData::InlineStrRun(vec![
                "x".to_string(),
                "true".to_string(),
                "#DIV/0!".to_string()
            ])
        );
    }

    #[test]
    fn adjacent_nulls_coalesce() {
        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::Blank);
        series.record(1, RawCell::Blank);
        series.record(4, RawCell::Blank);

        assert_eq!(series.chunks.len(), 1);
        assert_eq!(series.chunks[0].data, ChunkData::NullRun(5));
    }

    #[test]
    fn truncate_rolls_back_the_pending_row() {
        let mut series = ColumnSeries::new(0);
        series.record(0, number(1.0));
        series.record(1, RawCell::InlineString("x".to_string()));

        series.truncate_to(1);
        assert_eq!(series.chunks.len(), 1);
        assert_eq!(series.total_len(), 1);

        // rolling back a row that only extended a run
        series.record(1, number(2.0));
        series.truncate_to(1);
        assert_eq!(series.total_len(), 1);
    }

    #[test]
    fn drop_rows_shifts_and_recoalesces() {
        let mut series = ColumnSeries::new(0);
        series.record(0, number(1.0));
        series.record(1, RawCell::InlineString("x".to_string()));
        series.record(2, number(2.0));

        // dropping the middle row leaves two adjacent numeric runs that must
        // merge back into one
        series.drop_rows(&BTreeSet::from([1]));
        assert_eq!(series.chunks.len(), 1);
        assert_eq!(
            series.chunks[0].data,
            ChunkData::F64Run {
                temporal: false,
                values: vec![1.0, 2.0]
            }
        );
    }

    #[test]
    fn seal_pads_to_admitted_rows() {
        let mut series = ColumnSeries::new(0);
        series.record(0, number(1.0));
        series.seal(4);
        assert_eq!(series.total_len(), 4);
        assert_eq!(series.chunks[1].data, ChunkData::NullRun(3));
    }

    #[test]
    fn dominant_shape_prefers_count_then_rank() {
        let mut series = ColumnSeries::new(0);
        series.record(0, number(1.0));
        series.record(1, number(2.0));
        series.record(2, RawCell::InlineString("x".to_string()));
        assert_eq!(
            series.dominant_shape(),
            Some(StorageShape::Number { temporal: false })
        );

        let mut tied = ColumnSeries::new(0);
        tied.record(0, RawCell::InlineString("x".to_string()));
        tied.record(1, number(1.0));
        assert_eq!(
            tied.dominant_shape(),
            Some(StorageShape::Number { temporal: false })
        );
    }
}
