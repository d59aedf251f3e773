use thiserror::Error;

/// Error type for every fallible operation in the crate.
///
/// The first group of variants are the domain errors a caller is expected to
/// match on; the rest wrap errors bubbling up from the standard library and
/// the parsing dependencies.
#[derive(Error, Debug)]
pub enum SheetFrameError {
    /// Malformed archive, record stream, or unrecognized container.
    #[error("invalid workbook: {0}")]
    Format(String),

    #[error("sheet '{0}' not found")]
    SheetNotFound(String),

    /// No header row matched within the lookup horizon.
    #[error("no header found in sheet '{sheet}' within {size} rows")]
    HeaderLookup { sheet: String, size: usize },

    /// Explicit header names do not line up with the surviving columns.
    #[error("sheet '{sheet}' has {actual} columns, {expected} names were given")]
    HeaderMismatch {
        sheet: String,
        expected: usize,
        actual: usize,
    },

    /// Contradictory or unresolvable read options.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot cast column '{column}' to {dtype}: {message}")]
    DTypeCast {
        column: String,
        dtype: &'static str,
        message: String,
    },

    /// A cell references a shared-string index the table does not contain.
    #[error("corrupt shared strings in sheet '{sheet}' at {reference}: index {index} out of range (table has {len} entries)")]
    SharedStringsCorrupt {
        sheet: String,
        reference: String,
        index: u64,
        len: usize,
    },

    /// The per-row callback asked to abort the read.
    #[error("read cancelled: {0}")]
    Cancelled(String),

    // Standard library errors
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    Encoding(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncoding(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),
}
