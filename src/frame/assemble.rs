//! The table assembler: final column selection, naming, dtype overrides,
//! and length validation.

use crate::error::SheetFrameError;
use crate::frame::header::{synthetic_name, HeaderSpec};
use crate::frame::prepare::{cast_array, prepare_series, PrepareContext};
use crate::frame::series::ColumnSeries;
use crate::frame::{Column, DType, Table};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// User dtype overrides, applied after type resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum DTypeSpec {
    /// By output column position; None slots keep the resolved type.
    ByIndex(Vec<Option<DType>>),
    ByName(HashMap<String, DType>),
    /// One type for every column.
    Blanket(DType),
}

/// Prepares every surviving series and assembles the output table.
///
/// Column order is discovery order (spreadsheet left-to-right). Columns
/// that never held a value and never got a header are dropped before
/// explicit names are matched against the survivors.
pub(crate) fn assemble_table(
    series_by_col: BTreeMap<usize, ColumnSeries>,
    header: &HeaderSpec,
    dtypes: Option<&DTypeSpec>,
    ctx: &PrepareContext,
    total_rows: usize,
) -> Result<Table, SheetFrameError> {
    let survivors: Vec<ColumnSeries> = series_by_col
        .into_values()
        .filter(|series| series.has_values() || series.header.is_some())
        .collect();

    let names: Vec<String> = match header {
        HeaderSpec::Explicit(names) => {
            if names.len() != survivors.len() {
                return Err(SheetFrameError::HeaderMismatch {
                    sheet: ctx.sheet.to_string(),
                    expected: names.len(),
                    actual: survivors.len(),
                });
            }
            names.clone()
        }
        HeaderSpec::Absent => (0..survivors.len()).map(synthetic_name).collect(),
        HeaderSpec::Present { .. } => survivors
            .iter()
            .enumerate()
            .map(|(position, series)| {
                series
                    .header
                    .clone()
                    .unwrap_or_else(|| synthetic_name(position))
            })
            .collect(),
    };

    let mut columns = Vec::with_capacity(survivors.len());
    for (position, (series, name)) in survivors.into_iter().zip(names).enumerate() {
        let mut array = prepare_series(series, ctx)?;
        let dtype = match dtypes {
            Some(DTypeSpec::Blanket(dtype)) => Some(*dtype),
            Some(DTypeSpec::ByIndex(slots)) => slots.get(position).copied().flatten(),
            Some(DTypeSpec::ByName(map)) => map.get(&name).copied(),
            None => None,
        };
        if let Some(dtype) = dtype {
            array = cast_array(array, dtype, ctx, &name)?;
        }
        if array.len() != total_rows {
            return Err(SheetFrameError::Format(format!(
                "column '{name}' has {} rows, table has {total_rows}",
                array.len()
            )));
        }
        columns.push(Column { name, data: array });
    }

    Ok(Table { columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::prepare::{ConflictResolve, DEFAULT_DATETIME_FORMATS};
    use crate::frame::Array;
    use crate::spreadsheet::cell::RawCell;
    use crate::spreadsheet::SharedStrings;

    fn series(col: usize, header: Option<&str>, values: &[f64]) -> ColumnSeries {
        let mut series = ColumnSeries::new(col);
        series.header = header.map(str::to_string);
        for (row, value) in values.iter().enumerate() {
            series.record(row, RawCell::Number { value: *value, temporal: false });
        }
        series
    }

    fn run(
        series_by_col: BTreeMap<usize, ColumnSeries>,
        header: &HeaderSpec,
        dtypes: Option<&DTypeSpec>,
        total_rows: usize,
    ) -> Result<Table, SheetFrameError> {
        let shared = SharedStrings::default();
        let formats: Vec<String> = DEFAULT_DATETIME_FORMATS.iter().map(|f| f.to_string()).collect();
        let ctx = PrepareContext {
            sheet: "Sheet1",
            shared: &shared,
            date1904: false,
            float_precision: Some(6),
            datetime_formats: &formats,
            conflict: ConflictResolve::All,
        };
        assemble_table(series_by_col, header, dtypes, &ctx, total_rows)
    }

    #[test]
    fn empty_unnamed_columns_are_dropped() {
        let mut map = BTreeMap::new();
        map.insert(0, series(0, Some("a"), &[1.0]));
        let mut empty = ColumnSeries::new(1);
        empty.seal(1);
        map.insert(1, empty);
        map.insert(2, series(2, None, &[2.0]));

        let table = run(map, &HeaderSpec::Present { rows: 1 }, None, 1).unwrap();
        assert_eq!(table.column_names(), vec!["a", "Unnamed: 1"]);
    }

    #[test]
    fn explicit_names_must_match_survivor_count() {
        let mut map = BTreeMap::new();
        map.insert(0, series(0, None, &[1.0]));
        map.insert(1, series(1, None, &[2.0]));

        let names = HeaderSpec::Explicit(vec!["only".to_string()]);
        assert!(matches!(
            run(map, &names, None, 1),
            Err(SheetFrameError::HeaderMismatch { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn dtype_overrides_apply_by_position_and_name() {
        let mut map = BTreeMap::new();
        map.insert(0, series(0, Some("a"), &[1.0]));
        map.insert(1, series(1, Some("b"), &[2.0]));

        let by_index = DTypeSpec::ByIndex(vec![None, Some(DType::Utf8)]);
        let table = run(map, &HeaderSpec::Present { rows: 1 }, Some(&by_index), 1).unwrap();
        assert_eq!(table.columns[0].data, Array::Int64(vec![Some(1)]));
        assert_eq!(table.columns[1].data, Array::Utf8(vec![Some("2".to_string())]));

        let mut map = BTreeMap::new();
        map.insert(0, series(0, Some("a"), &[1.0]));
        let by_name = DTypeSpec::ByName(HashMap::from([("a".to_string(), DType::Float64)]));
        let table = run(map, &HeaderSpec::Present { rows: 1 }, Some(&by_name), 1).unwrap();
        assert_eq!(table.columns[0].data, Array::Float64(vec![Some(1.0)]));
    }
}
