//! The prepare engine: deferred conversion of raw chunk runs into typed
//! arrays, and per-column conflict resolution.
//!
//! Phases per column: expansion of packed and indexed runs (P1), temporal
//! normalization to millisecond timestamps (P2), float-to-int narrowing
//! (P3), conflict resolution across logical types (P4), and the user dtype
//! override (P5, applied by the assembler through [`cast_array`]).

use crate::error::SheetFrameError;
use crate::frame::chunk::{ChunkData, StorageShape};
use crate::frame::series::ColumnSeries;
use crate::frame::{Array, DType};
use crate::spreadsheet::cell::{cell_reference, error_code_text, rk_to_f64, RawCell};
use crate::spreadsheet::SharedStrings;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::warn;

const MS_PER_DAY: i64 = 86_400_000;
/// Serial-date value of 1970-01-01 in the 1900 system.
const UNIX_EPOCH_SERIAL: f64 = 25_569.0;
/// Days between the 1904 and 1900 serial epochs.
const DATE1904_OFFSET_DAYS: f64 = 1_462.0;

/// Formats tried for string-to-timestamp coercion when the caller supplies
/// none: the ISO-8601 family.
pub(crate) const DEFAULT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d",
];

/// Policy for columns mixing numeric, temporal, and string chunks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ConflictResolve {
    /// Stringify every non-null chunk.
    No,
    /// Coerce toward timestamps when a temporal chunk exists.
    Temporal,
    /// Coerce strings toward floats when a numeric chunk exists.
    Numeric,
    /// Temporal first when possible, numeric otherwise.
    #[default]
    All,
}

/// Everything a column needs during prepare; columns never observe each
/// other.
pub(crate) struct PrepareContext<'a> {
    pub(crate) sheet: &'a str,
    pub(crate) shared: &'a SharedStrings,
    pub(crate) date1904: bool,
    pub(crate) float_precision: Option<i32>,
    pub(crate) datetime_formats: &'a [String],
    pub(crate) conflict: ConflictResolve,
}

/// Converts a serial date to milliseconds since 1970-01-01, truncating
/// toward zero. Serials below 1.0 are time-of-day on the epoch date. The
/// 1900 leap-year bug of the source application is preserved: no correction
/// is applied for serials before 1900-03-01.
pub(crate) fn serial_to_ms(value: f64, date1904: bool) -> i64 {
    let serial = if date1904 {
        value + DATE1904_OFFSET_DAYS
    } else {
        value
    };
    if (0.0..1.0).contains(&serial) {
        (serial * MS_PER_DAY as f64) as i64
    } else {
        ((serial - UNIX_EPOCH_SERIAL) * MS_PER_DAY as f64) as i64
    }
}

/// Renders a timestamp the way the source application displays serials:
/// date for whole days, time-of-day for sub-day values, datetime otherwise.
pub(crate) fn ms_to_text(ms: i64) -> String {
    let datetime = match DateTime::from_timestamp_millis(ms) {
        Some(datetime) => datetime.naive_utc(),
        None => return ms.to_string(),
    };
    if ms % MS_PER_DAY == 0 {
        datetime.format("%Y-%m-%d").to_string()
    } else if (0..MS_PER_DAY).contains(&ms) {
        datetime.format("%H:%M:%S").to_string()
    } else if ms % 1_000 == 0 {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }
}

/// Parses a string against the configured formats, date-only formats
/// falling back to midnight.
pub(crate) fn parse_datetime_text(value: &str, formats: &[String]) -> Option<i64> {
    for format in formats {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Some(datetime.and_utc().timestamp_millis());
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            let midnight = date.and_hms_opt(0, 0, 0).expect("midnight");
            return Some(midnight.and_utc().timestamp_millis());
        }
    }
    None
}

/// Stringifies one raw cell; used for header rows, which are rendered
/// before any series exists. Blanks and empty strings yield None.
pub(crate) fn cell_text(
    cell: &RawCell,
    shared: &SharedStrings,
    date1904: bool,
) -> Option<String> {
    let text = match cell {
        RawCell::Number { value, temporal: false } => value.to_string(),
        RawCell::Number { value, temporal: true } => ms_to_text(serial_to_ms(*value, date1904)),
        RawCell::RkNumber(raw) => rk_to_f64(*raw).to_string(),
        RawCell::InlineString(string) => string.clone(),
        RawCell::SharedStringRef(index) => shared.get(*index)?.to_string(),
        RawCell::Boolean(value) => if *value { "true" } else { "false" }.to_string(),
        RawCell::ErrorCode(code) => error_code_text(*code).to_string(),
        RawCell::Blank => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// A chunk after expansion (P1) and temporal normalization (P2). Runs stay
/// contiguous so downstream passes remain loops over whole buffers.
enum Prepared {
    Num(Vec<f64>),
    Ts(Vec<i64>),
    Str(Vec<String>),
    Null(usize),
}

/// Runs P1-P4 over one sealed series and returns its materialized array.
pub(crate) fn prepare_series(
    series: ColumnSeries,
    ctx: &PrepareContext,
) -> Result<Array, SheetFrameError> {
    let col = series.col;
    let total = series.total_len();
    let dominant = series.dominant_shape();

    // P1 + P2, chunk by chunk.
    let mut prepared = Vec::with_capacity(series.chunks.len());
    for chunk in series.chunks {
        let origin = chunk.origin_row;
        prepared.push(match chunk.data {
            ChunkData::F64Run { temporal: false, values } => Prepared::Num(values),
            ChunkData::F64Run { temporal: true, values } => Prepared::Ts(
                values
                    .into_iter()
                    .map(|value| serial_to_ms(value, ctx.date1904))
                    .collect(),
            ),
            ChunkData::Rk32Run(values) => {
                Prepared::Num(values.into_iter().map(rk_to_f64).collect())
            }
            ChunkData::SharedIdxRun(values) => {
                let mut strings = Vec::with_capacity(values.len());
                for (offset, index) in values.into_iter().enumerate() {
                    let string = ctx.shared.get(index).ok_or_else(|| {
                        SheetFrameError::SharedStringsCorrupt {
                            sheet: ctx.sheet.to_string(),
                            reference: cell_reference(origin + offset, col),
                            index,
                            len: ctx.shared.len(),
                        }
                    })?;
                    strings.push(string.to_string());
                }
                Prepared::Str(strings)
            }
            ChunkData::InlineStrRun(values) => Prepared::Str(values),
            ChunkData::NullRun(count) => Prepared::Null(count),
        });
    }

    let has_num = prepared.iter().any(|p| matches!(p, Prepared::Num(_)));
    let has_ts = prepared.iter().any(|p| matches!(p, Prepared::Ts(_)));
    let has_str = prepared.iter().any(|p| matches!(p, Prepared::Str(_)));

    let array = match (has_num, has_ts, has_str) {
        (false, false, false) => Array::Null(total),
        (true, false, false) => narrow_numeric(collect_numeric(&prepared), ctx.float_precision),
        (false, true, false) => Array::TimestampMs(collect_temporal(&prepared)),
        (false, false, true) => Array::Utf8(stringify_all(prepared)),
        _ => resolve_conflict(prepared, ctx, col, dominant, has_num, has_ts),
    };

    debug_assert_eq!(array.len(), total);
    Ok(array)
}

fn collect_numeric(prepared: &[Prepared]) -> Vec<Option<f64>> {
    let mut values = Vec::new();
    for chunk in prepared {
        match chunk {
            Prepared::Num(run) => values.extend(run.iter().copied().map(Some)),
            Prepared::Null(count) => values.extend(std::iter::repeat(None).take(*count)),
            _ => unreachable!("pure numeric column"),
        }
    }
    values
}

fn collect_temporal(prepared: &[Prepared]) -> Vec<Option<i64>> {
    let mut values = Vec::new();
    for chunk in prepared {
        match chunk {
            Prepared::Ts(run) => values.extend(run.iter().copied().map(Some)),
            Prepared::Null(count) => values.extend(std::iter::repeat(None).take(*count)),
            _ => unreachable!("pure temporal column"),
        }
    }
    values
}

/// P3: a pure numeric column becomes int64 when every value rounds to an
/// integer at `precision` decimals; the rounded value is what survives.
/// Unset precision leaves the column as float64.
fn narrow_numeric(values: Vec<Option<f64>>, precision: Option<i32>) -> Array {
    let Some(precision) = precision else {
        return Array::Float64(values);
    };
    let factor = 10f64.powi(precision);
    let mut narrowed = Vec::with_capacity(values.len());
    for index in 0..values.len() {
        match values[index] {
            None => narrowed.push(None),
            Some(value) => {
                let rounded = (value * factor).round() / factor;
                if rounded.fract() == 0.0 && rounded.abs() <= 9_007_199_254_740_992.0 {
                    narrowed.push(Some(rounded as i64));
                } else {
                    return Array::Float64(values);
                }
            }
        }
    }
    Array::Int64(narrowed)
}

/// P4: collapses a conflicted column to one logical type per the configured
/// strategy. Any coercion failure falls back to stringifying the column;
/// the read itself never fails here.
fn resolve_conflict(
    prepared: Vec<Prepared>,
    ctx: &PrepareContext,
    col: usize,
    dominant: Option<StorageShape>,
    has_num: bool,
    has_ts: bool,
) -> Array {
    let attempt = match ctx.conflict {
        ConflictResolve::No => None,
        ConflictResolve::Temporal if has_ts => {
            coerce_temporal(&prepared, ctx, false)
        }
        ConflictResolve::Numeric if has_num && !has_ts => coerce_numeric(&prepared),
        ConflictResolve::All if has_ts => coerce_temporal(&prepared, ctx, true),
        ConflictResolve::All if has_num => coerce_numeric(&prepared),
        _ => None,
    };
    match attempt {
        Some(array) => array,
        None => {
            if ctx.conflict != ConflictResolve::No {
                warn!(
                    sheet = ctx.sheet,
                    col,
                    strategy = ?ctx.conflict,
                    dominant = ?dominant,
                    "conflicted column could not be coerced, keeping utf8"
                );
            }
            Array::Utf8(stringify_all(prepared))
        }
    }
}

/// Temporal coercion: numeric runs convert as serials, string runs parse
/// against the configured formats. With `via_float` (the `all` strategy) an
/// unparseable string gets a second chance as float-then-serial.
fn coerce_temporal(
    prepared: &[Prepared],
    ctx: &PrepareContext,
    via_float: bool,
) -> Option<Array> {
    let mut values = Vec::new();
    for chunk in prepared {
        match chunk {
            Prepared::Ts(run) => values.extend(run.iter().copied().map(Some)),
            Prepared::Num(run) => values.extend(
                run.iter()
                    .map(|value| Some(serial_to_ms(*value, ctx.date1904))),
            ),
            Prepared::Str(run) => {
                for value in run {
                    let ms = parse_datetime_text(value, ctx.datetime_formats).or_else(|| {
                        if via_float {
                            value
                                .trim()
                                .parse::<f64>()
                                .ok()
                                .map(|serial| serial_to_ms(serial, ctx.date1904))
                        } else {
                            None
                        }
                    })?;
                    values.push(Some(ms));
                }
            }
            Prepared::Null(count) => values.extend(std::iter::repeat(None).take(*count)),
        }
    }
    Some(Array::TimestampMs(values))
}

/// Numeric coercion: string runs parse as floats; a temporal run cannot be
/// demoted and the caller falls back instead.
fn coerce_numeric(prepared: &[Prepared]) -> Option<Array> {
    let mut values = Vec::new();
    for chunk in prepared {
        match chunk {
            Prepared::Num(run) => values.extend(run.iter().copied().map(Some)),
            Prepared::Str(run) => {
                for value in run {
                    values.push(Some(value.trim().parse::<f64>().ok()?));
                }
            }
            Prepared::Null(count) => values.extend(std::iter::repeat(None).take(*count)),
            Prepared::Ts(_) => return None,
        }
    }
    Some(Array::Float64(values))
}

/// The `no` strategy and the failure fallback: every non-null element
/// becomes its display string.
fn stringify_all(prepared: Vec<Prepared>) -> Vec<Option<String>> {
    let mut values = Vec::new();
    for chunk in prepared {
        match chunk {
            Prepared::Num(run) => {
                values.extend(run.into_iter().map(|value| Some(value.to_string())))
            }
            Prepared::Ts(run) => values.extend(run.into_iter().map(|ms| Some(ms_to_text(ms)))),
            Prepared::Str(run) => values.extend(run.into_iter().map(Some)),
            Prepared::Null(count) => values.extend(std::iter::repeat(None).take(count)),
        }
    }
    values
}

/// P5: casts a prepared array to the caller's dtype. Unlike conflict
/// resolution this is not recoverable; a value that will not cast is an
/// error.
pub(crate) fn cast_array(
    array: Array,
    dtype: DType,
    ctx: &PrepareContext,
    column: &str,
) -> Result<Array, SheetFrameError> {
    let cast_error = |message: String| SheetFrameError::DTypeCast {
        column: column.to_string(),
        dtype: dtype.as_str(),
        message,
    };

    if array.dtype() == dtype {
        return Ok(array);
    }
    if let Array::Null(len) = array {
        return Ok(Array::nulls(dtype, len));
    }

    Ok(match (array, dtype) {
        (array, DType::Utf8) => {
            let values = match array {
                Array::Float64(values) => values
                    .into_iter()
                    .map(|value| value.map(|v| v.to_string()))
                    .collect(),
                Array::Int64(values) => values
                    .into_iter()
                    .map(|value| value.map(|v| v.to_string()))
                    .collect(),
                Array::TimestampMs(values) => values
                    .into_iter()
                    .map(|value| value.map(ms_to_text))
                    .collect(),
                Array::Utf8(values) => values,
                Array::Null(len) => vec![None; len],
            };
            Array::Utf8(values)
        }
        (Array::Int64(values), DType::Float64) => Array::Float64(
            values
                .into_iter()
                .map(|value| value.map(|v| v as f64))
                .collect(),
        ),
        (Array::Float64(values), DType::Int64) => {
            let mut cast = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    None => cast.push(None),
                    Some(v) if v.fract() == 0.0 => cast.push(Some(v as i64)),
                    Some(v) => {
                        return Err(cast_error(format!("{v} has a fractional part")));
                    }
                }
            }
            Array::Int64(cast)
        }
        (Array::Utf8(values), DType::Float64) => {
            let mut cast = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    None => cast.push(None),
                    Some(v) => match v.trim().parse::<f64>() {
                        Ok(parsed) => cast.push(Some(parsed)),
                        Err(_) => return Err(cast_error(format!("cannot parse '{v}'"))),
                    },
                }
            }
            Array::Float64(cast)
        }
        (Array::Utf8(values), DType::Int64) => {
            let mut cast = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    None => cast.push(None),
                    Some(v) => match v.trim().parse::<i64>() {
                        Ok(parsed) => cast.push(Some(parsed)),
                        Err(_) => return Err(cast_error(format!("cannot parse '{v}'"))),
                    },
                }
            }
            Array::Int64(cast)
        }
        (Array::Utf8(values), DType::TimestampMs) => {
            let mut cast = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    None => cast.push(None),
                    Some(v) => match parse_datetime_text(&v, ctx.datetime_formats) {
                        Some(ms) => cast.push(Some(ms)),
                        None => {
                            return Err(cast_error(format!("cannot parse '{v}' as a datetime")))
                        }
                    },
                }
            }
            Array::TimestampMs(cast)
        }
        (Array::Float64(values), DType::TimestampMs) => Array::TimestampMs(
            values
                .into_iter()
                .map(|value| value.map(|serial| serial_to_ms(serial, ctx.date1904)))
                .collect(),
        ),
        (Array::Int64(values), DType::TimestampMs) => Array::TimestampMs(
            values
                .into_iter()
                .map(|value| value.map(|serial| serial_to_ms(serial as f64, ctx.date1904)))
                .collect(),
        ),
        (Array::TimestampMs(values), DType::Int64) => Array::Int64(values),
        (array, dtype) => {
            return Err(cast_error(format!(
                "no cast from {} to {dtype}",
                array.dtype()
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::series::ColumnSeries;

    fn context<'a>(shared: &'a SharedStrings, formats: &'a [String]) -> PrepareContext<'a> {
        PrepareContext {
            sheet: "Sheet1",
            shared,
            date1904: false,
            float_precision: Some(6),
            datetime_formats: formats,
            conflict: ConflictResolve::All,
        }
    }

    fn iso_formats() -> Vec<String> {
        DEFAULT_DATETIME_FORMATS.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn serial_conversion_matches_the_epoch_shift() {
        assert_eq!(serial_to_ms(44927.0, false), 1_672_531_200_000); // 2023-01-01
        assert_eq!(serial_to_ms(44928.5, false), 1_672_660_800_000); // 2023-01-02 12:00
        // sub-day serials are time-of-day on the epoch date
        assert_eq!(serial_to_ms(0.5, false), 43_200_000);
        // the 1904 system shifts by 1462 days
        assert_eq!(
            serial_to_ms(44927.0 - 1462.0, true),
            serial_to_ms(44927.0, false)
        );
    }

    #[test]
    fn serial_rendering_matches_display_rules() {
        assert_eq!(ms_to_text(serial_to_ms(44927.0, false)), "2023-01-01");
        assert_eq!(ms_to_text(serial_to_ms(44928.5, false)), "2023-01-02 12:00:00");
        assert_eq!(ms_to_text(serial_to_ms(0.5, false)), "12:00:00");
    }

    #[test]
    fn pure_numeric_narrows_under_default_precision() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let ctx = context(&shared, &formats);

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::Number { value: 1.0, temporal: false });
        series.record(2, RawCell::Number { value: 2.0, temporal: false });
        series.seal(4);

        let array = prepare_series(series, &ctx).unwrap();
        assert_eq!(
            array,
            Array::Int64(vec![Some(1), None, Some(2), None])
        );
    }

    #[test]
    fn fractional_values_stay_float() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let ctx = context(&shared, &formats);

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::Number { value: 1.5, temporal: false });
        series.seal(1);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::Float64(vec![Some(1.5)])
        );
    }

    #[test]
    fn zero_precision_round_trips_large_integers() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let mut ctx = context(&shared, &formats);
        ctx.float_precision = Some(0);

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::Number { value: 9_007_199_254_740_992.0, temporal: false });
        series.record(1, RawCell::Number { value: -9_007_199_254_740_992.0, temporal: false });
        series.seal(2);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::Int64(vec![Some(9_007_199_254_740_992), Some(-9_007_199_254_740_992)])
        );
    }

    #[test]
    fn unset_precision_disables_narrowing() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let mut ctx = context(&shared, &formats);
        ctx.float_precision = None;

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::Number { value: 1.0, temporal: false });
        series.seal(1);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::Float64(vec![Some(1.0)])
        );
    }

    #[test]
    fn all_blank_column_is_null_typed() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let ctx = context(&shared, &formats);

        let mut series = ColumnSeries::new(0);
        series.seal(3);
        assert_eq!(prepare_series(series, &ctx).unwrap(), Array::Null(3));
    }

    #[test]
    fn rk_runs_expand_before_typing() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let ctx = context(&shared, &formats);

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::RkNumber((5 << 2) | 0x02));
        series.record(1, RawCell::Number { value: 6.0, temporal: false });
        series.seal(2);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::Int64(vec![Some(5), Some(6)])
        );
    }

    #[test]
    fn shared_runs_materialize_through_the_table() {
        let shared = SharedStrings::new(vec!["alpha".to_string(), "beta".to_string()]);
        let formats = iso_formats();
        let ctx = context(&shared, &formats);

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::SharedStringRef(1));
        series.record(1, RawCell::SharedStringRef(0));
        series.seal(2);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::Utf8(vec![Some("beta".to_string()), Some("alpha".to_string())])
        );
    }

    #[test]
    fn corrupt_shared_index_is_fatal() {
        let shared = SharedStrings::new(vec!["alpha".to_string()]);
        let formats = iso_formats();
        let ctx = context(&shared, &formats);

        let mut series = ColumnSeries::new(2);
        series.record(0, RawCell::SharedStringRef(9));
        series.seal(1);

        assert!(matches!(
            prepare_series(series, &ctx),
            Err(SheetFrameError::SharedStringsCorrupt { index: 9, .. })
        ));
    }

    #[test]
    fn temporal_strategy_falls_back_to_utf8_on_one_bad_string() {
        let shared = SharedStrings::default();
        let formats = vec!["%Y-%m-%d".to_string()];
        let mut ctx = context(&shared, &formats);
        ctx.conflict = ConflictResolve::Temporal;

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::Number { value: 44927.0, temporal: true });
        series.record(1, RawCell::Number { value: 44928.5, temporal: true });
        series.record(3, RawCell::InlineString("not a date".to_string()));
        series.seal(4);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::Utf8(vec![
                Some("2023-01-01".to_string()),
                Some("2023-01-02 12:00:00".to_string()),
                None,
                Some("not a date".to_string()),
            ])
        );
    }

    #[test]
    fn temporal_strategy_converts_parseable_strings() {
        let shared = SharedStrings::default();
        let formats = vec!["%Y-%m-%d".to_string()];
        let mut ctx = context(&shared, &formats);
        ctx.conflict = ConflictResolve::Temporal;

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::Number { value: 44927.0, temporal: true });
        series.record(1, RawCell::InlineString("2023-01-03".to_string()));
        series.seal(2);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::TimestampMs(vec![Some(1_672_531_200_000), Some(1_672_704_000_000)])
        );
    }

    #[test]
    fn numeric_strategy_parses_string_chunks() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let mut ctx = context(&shared, &formats);
        ctx.conflict = ConflictResolve::Numeric;

        let mut series = ColumnSeries::new(0);
        for row in 0..4 {
            series.record(row, RawCell::Number { value: row as f64, temporal: false });
        }
        series.record(4, RawCell::InlineString("4.5".to_string()));
        series.seal(5);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::Float64(vec![Some(0.0), Some(1.0), Some(2.0), Some(3.0), Some(4.5)])
        );
    }

    #[test]
    fn all_strategy_takes_the_float_detour_for_strings() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let ctx = context(&shared, &formats);

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::Number { value: 44927.0, temporal: true });
        series.record(1, RawCell::InlineString("44928".to_string()));
        series.seal(2);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::TimestampMs(vec![Some(1_672_531_200_000), Some(1_672_617_600_000)])
        );
    }

    #[test]
    fn no_strategy_stringifies_everything() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let mut ctx = context(&shared, &formats);
        ctx.conflict = ConflictResolve::No;

        let mut series = ColumnSeries::new(0);
        series.record(0, RawCell::Number { value: 1.0, temporal: false });
        series.record(1, RawCell::InlineString("x".to_string()));
        series.seal(2);

        assert_eq!(
            prepare_series(series, &ctx).unwrap(),
            Array::Utf8(vec![Some("1".to_string()), Some("x".to_string())])
        );
    }

    #[test]
    fn casts_cover_the_numeric_string_and_temporal_paths() {
        let shared = SharedStrings::default();
        let formats = iso_formats();
        let ctx = context(&shared, &formats);

        let floats = Array::Float64(vec![Some(1.0), None]);
        assert_eq!(
            cast_array(floats, DType::Int64, &ctx, "c").unwrap(),
            Array::Int64(vec![Some(1), None])
        );

        let strings = Array::Utf8(vec![Some("2023-01-01".to_string()), None]);
        assert_eq!(
            cast_array(strings, DType::TimestampMs, &ctx, "c").unwrap(),
            Array::TimestampMs(vec![Some(1_672_531_200_000), None])
        );

        let nulls = Array::Null(2);
        assert_eq!(
            cast_array(nulls, DType::Float64, &ctx, "c").unwrap(),
            Array::Float64(vec![None, None])
        );

        let fractional = Array::Float64(vec![Some(1.5)]);
        assert!(matches!(
            cast_array(fractional, DType::Int64, &ctx, "c"),
            Err(SheetFrameError::DTypeCast { .. })
        ));
    }
}
