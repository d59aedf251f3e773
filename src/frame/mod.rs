//! The columnar core: chunked column storage, the row gate, header
//! resolution, the prepare engine, and the assembled output table.

pub(crate) mod assemble;
pub(crate) mod chunk;
pub(crate) mod gate;
pub(crate) mod header;
pub(crate) mod prepare;
pub(crate) mod series;

use crate::error::SheetFrameError;

/// Logical column types of the output table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DType {
    Float64,
    Int64,
    /// Millisecond-precision timestamps since 1970-01-01.
    TimestampMs,
    Utf8,
    /// A column that never held a non-null value.
    Null,
}

impl DType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DType::Float64 => "float64",
            DType::Int64 => "int64",
            DType::TimestampMs => "timestamp[ms]",
            DType::Utf8 => "utf8",
            DType::Null => "null",
        }
    }

    /// Parses a type name, accepting the usual aliases.
    pub fn parse(name: &str) -> Result<Self, SheetFrameError> {
        match name.to_ascii_uppercase().as_str() {
            "FLOAT" | "FLOAT64" | "DOUBLE" | "DECIMAL" | "NUMERIC" => Ok(Self::Float64),
            "INT" | "INT64" | "BIGINT" | "INTEGER" => Ok(Self::Int64),
            "TIMESTAMP" | "TIMESTAMP[MS]" | "DATETIME" => Ok(Self::TimestampMs),
            "UTF8" | "TEXT" | "STRING" | "VARCHAR" => Ok(Self::Utf8),
            "NULL" => Ok(Self::Null),
            _ => Err(SheetFrameError::Config(format!("unknown dtype '{name}'"))),
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One materialized column. Validity is encoded as `Option` per slot; a
/// fully absent column collapses to `Null`.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    Float64(Vec<Option<f64>>),
    Int64(Vec<Option<i64>>),
    TimestampMs(Vec<Option<i64>>),
    Utf8(Vec<Option<String>>),
    Null(usize),
}

impl Array {
    pub fn len(&self) -> usize {
        match self {
            Array::Float64(values) => values.len(),
            Array::Int64(values) => values.len(),
            Array::TimestampMs(values) => values.len(),
            Array::Utf8(values) => values.len(),
            Array::Null(len) => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Array::Float64(_) => DType::Float64,
            Array::Int64(_) => DType::Int64,
            Array::TimestampMs(_) => DType::TimestampMs,
            Array::Utf8(_) => DType::Utf8,
            Array::Null(_) => DType::Null,
        }
    }

    /// An all-null array of the given type.
    pub(crate) fn nulls(dtype: DType, len: usize) -> Array {
        match dtype {
            DType::Float64 => Array::Float64(vec![None; len]),
            DType::Int64 => Array::Int64(vec![None; len]),
            DType::TimestampMs => Array::TimestampMs(vec![None; len]),
            DType::Utf8 => Array::Utf8(vec![None; len]),
            DType::Null => Array::Null(len),
        }
    }
}

/// A named output column.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: Array,
}

/// The assembled table: columns in source order, equal lengths validated by
/// the assembler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|column| column.data.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }
}
