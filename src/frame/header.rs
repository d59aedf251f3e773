//! Header discovery: where the header band starts, and what the columns are
//! called.

use either::Either;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// What the caller knows about the header region.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderSpec {
    /// The sheet carries a header of `rows` rows (`rows >= 1`).
    Present { rows: usize },
    /// No header; columns get synthetic `Unnamed: k` names.
    Absent,
    /// No header region is consumed; these names apply to the surviving
    /// columns left to right.
    Explicit(Vec<String>),
}

impl Default for HeaderSpec {
    fn default() -> Self {
        HeaderSpec::Present { rows: 1 }
    }
}

impl From<bool> for HeaderSpec {
    fn from(present: bool) -> Self {
        if present {
            HeaderSpec::Present { rows: 1 }
        } else {
            HeaderSpec::Absent
        }
    }
}

impl From<usize> for HeaderSpec {
    fn from(rows: usize) -> Self {
        if rows == 0 {
            HeaderSpec::Absent
        } else {
            HeaderSpec::Present { rows }
        }
    }
}

impl From<Vec<String>> for HeaderSpec {
    fn from(names: Vec<String>) -> Self {
        HeaderSpec::Explicit(names)
    }
}

/// Header start detection: a pattern any cell of the row must match, or a
/// column index whose first non-empty cell starts the header.
pub type HeaderLookup = Either<Regex, usize>;

/// Whether a row starts the header under the given lookup. Cells are the
/// row's stringified non-blank values by column.
pub(crate) fn row_matches_lookup(
    lookup: Option<&HeaderLookup>,
    cells: &BTreeMap<usize, String>,
) -> bool {
    match lookup {
        Some(Either::Left(pattern)) => cells.values().any(|value| pattern.is_match(value)),
        Some(Either::Right(column)) => {
            cells.get(column).map(|value| !value.is_empty()).unwrap_or(false)
        }
        // No lookup: the first non-empty row starts the header.
        None => !cells.is_empty(),
    }
}

/// Builds final column names from the collected header band.
///
/// For multi-row headers the top-most empty cells of a column inherit the
/// left neighbor's corresponding value (so a spanning title carries across),
/// every remaining empty cell stays empty, and the non-empty cells of each
/// column join top-to-bottom with `", "`. Columns whose band is entirely
/// empty get no name. Names are not deduplicated.
pub(crate) fn build_names(
    band: &[BTreeMap<usize, String>],
    columns: &BTreeSet<usize>,
) -> BTreeMap<usize, String> {
    let cols: Vec<usize> = columns.iter().copied().collect();
    let mut grid: Vec<Vec<String>> = band
        .iter()
        .map(|row| {
            cols.iter()
                .map(|col| row.get(col).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    if band.len() > 1 {
        for c in 1..cols.len() {
            for r in 0..grid.len() {
                if grid[r][c].is_empty() {
                    let left = grid[r][c - 1].clone();
                    grid[r][c] = left;
                } else {
                    break;
                }
            }
        }
    }

    let mut names = BTreeMap::new();
    for (index, col) in cols.iter().enumerate() {
        let parts: Vec<&str> = grid
            .iter()
            .map(|row| row[index].as_str())
            .filter(|part| !part.is_empty())
            .collect();
        if !parts.is_empty() {
            names.insert(*col, parts.join(", "));
        }
    }
    names
}

/// Synthetic name for a column without header text, by output position.
pub(crate) fn synthetic_name(position: usize) -> String {
    format!("Unnamed: {position}")
}
