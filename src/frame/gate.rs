//! The row gate: per-row admit/drop decisions ahead of any conversion.
//!
//! Verdicts are produced while rows stream, so dropped rows cost a one-row
//! rollback in the affected series instead of post-hoc filtering over
//! converted arrays.

use crate::error::SheetFrameError;
use regex::Regex;
use std::collections::BTreeSet;

/// Combinator applied between two consecutive row filters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PairOp {
    And,
    Or,
}

/// How the per-filter predicates combine into a row verdict.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FilterStrategy {
    #[default]
    And,
    Or,
    /// One combinator per adjacent filter pair, folded left to right.
    Pairwise(Vec<PairOp>),
}

/// A row filter resolved against final column names: the spreadsheet
/// columns whose cells must all be non-blank for the filter to hold.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedFilter {
    pub(crate) columns: Vec<usize>,
}

/// Matches each filter pattern against the final column names. A pattern
/// matching no column is a configuration error.
pub(crate) fn resolve_filters(
    patterns: &[Regex],
    names: &[(usize, String)],
) -> Result<Vec<ResolvedFilter>, SheetFrameError> {
    patterns
        .iter()
        .map(|pattern| {
            let columns: Vec<usize> = names
                .iter()
                .filter(|(_, name)| pattern.is_match(name))
                .map(|(col, _)| *col)
                .collect();
            if columns.is_empty() {
                return Err(SheetFrameError::Config(format!(
                    "row filter '{pattern}' matches no column name"
                )));
            }
            Ok(ResolvedFilter { columns })
        })
        .collect()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    Admit,
    Drop,
    /// The take limit is reached; no further row can be admitted.
    Exhausted,
}

pub(crate) struct RowGate {
    /// First sheet row eligible for the body (header end plus post-header
    /// skip).
    body_start_row: usize,
    /// Admit rows without a single non-blank cell.
    keep_empty: bool,
    take_rows: Option<usize>,
    filters: Vec<ResolvedFilter>,
    strategy: FilterStrategy,
    admitted: usize,
}

impl RowGate {
    pub(crate) fn new(
        body_start_row: usize,
        keep_empty: bool,
        take_rows: Option<usize>,
        filters: Vec<ResolvedFilter>,
        strategy: FilterStrategy,
    ) -> Result<RowGate, SheetFrameError> {
        if let FilterStrategy::Pairwise(ops) = &strategy {
            let expected = filters.len().saturating_sub(1);
            if ops.len() != expected {
                return Err(SheetFrameError::Config(format!(
                    "row_filters_strategy lists {} combinators for {} filters (need {expected})",
                    ops.len(),
                    filters.len(),
                )));
            }
        }
        Ok(RowGate {
            body_start_row,
            keep_empty,
            take_rows,
            filters,
            strategy,
            admitted: 0,
        })
    }

    pub(crate) fn admitted(&self) -> usize {
        self.admitted
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.take_rows
            .map(|limit| self.admitted >= limit)
            .unwrap_or(false)
    }

    /// Decides one row given the set of columns holding non-blank cells.
    pub(crate) fn verdict(&mut self, sheet_row: usize, nonblank: &BTreeSet<usize>) -> Verdict {
        if self.exhausted() {
            return Verdict::Exhausted;
        }
        if sheet_row < self.body_start_row {
            return Verdict::Drop;
        }

        let admit = if self.filters.is_empty() {
            self.keep_empty || !nonblank.is_empty()
        } else {
            let holds: Vec<bool> = self
                .filters
                .iter()
                .map(|filter| filter.columns.iter().all(|col| nonblank.contains(col)))
                .collect();
            match &self.strategy {
                FilterStrategy::And => holds.iter().all(|&h| h),
                FilterStrategy::Or => holds.iter().any(|&h| h),
                FilterStrategy::Pairwise(ops) => {
                    let mut result = holds[0];
                    for (op, &hold) in ops.iter().zip(&holds[1..]) {
                        result = match op {
                            PairOp::And => result && hold,
                            PairOp::Or => result || hold,
                        };
                    }
                    result
                }
            }
        };

        if admit {
            self.admitted += 1;
            Verdict::Admit
        } else {
            Verdict::Drop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<(usize, String)> {
        vec![(0, "id".to_string()), (1, "region".to_string()), (2, "code".to_string())]
    }

    fn set(cols: &[usize]) -> BTreeSet<usize> {
        cols.iter().copied().collect()
    }

    #[test]
    fn unmatched_filter_is_a_config_error() {
        let patterns = vec![Regex::new("^missing$").unwrap()];
        assert!(matches!(
            resolve_filters(&patterns, &names()),
            Err(SheetFrameError::Config(_))
        ));
    }

    #[test]
    fn and_requires_every_filter() {
        let patterns = vec![Regex::new("^region$").unwrap(), Regex::new("^code$").unwrap()];
        let filters = resolve_filters(&patterns, &names()).unwrap();
        let mut gate = RowGate::new(0, false, None, filters, FilterStrategy::And).unwrap();

        assert_eq!(gate.verdict(0, &set(&[1, 2])), Verdict::Admit);
        assert_eq!(gate.verdict(1, &set(&[1])), Verdict::Drop);
        assert_eq!(gate.verdict(2, &set(&[0])), Verdict::Drop);
        assert_eq!(gate.admitted(), 1);
    }

    #[test]
    fn or_requires_any_filter() {
        let patterns = vec![Regex::new("^region$").unwrap(), Regex::new("^code$").unwrap()];
        let filters = resolve_filters(&patterns, &names()).unwrap();
        let mut gate = RowGate::new(0, false, None, filters, FilterStrategy::Or).unwrap();

        assert_eq!(gate.verdict(0, &set(&[2])), Verdict::Admit);
        assert_eq!(gate.verdict(1, &set(&[0])), Verdict::Drop);
    }

    #[test]
    fn pairwise_strategies_fold_left_to_right() {
        let patterns = vec![
            Regex::new("^id$").unwrap(),
            Regex::new("^region$").unwrap(),
            Regex::new("^code$").unwrap(),
        ];
        let filters = resolve_filters(&patterns, &names()).unwrap();
        // (id AND region) OR code
        let strategy = FilterStrategy::Pairwise(vec![PairOp::And, PairOp::Or]);
        let mut gate = RowGate::new(0, false, None, filters, strategy).unwrap();

        assert_eq!(gate.verdict(0, &set(&[0, 1])), Verdict::Admit);
        assert_eq!(gate.verdict(1, &set(&[2])), Verdict::Admit);
        assert_eq!(gate.verdict(2, &set(&[0])), Verdict::Drop);
    }

    #[test]
    fn pairwise_length_must_match() {
        let patterns = vec![Regex::new("^region$").unwrap(), Regex::new("^code$").unwrap()];
        let filters = resolve_filters(&patterns, &names()).unwrap();
        let result = RowGate::new(0, false, None, filters, FilterStrategy::Pairwise(vec![]));
        assert!(matches!(result, Err(SheetFrameError::Config(_))));
    }

    #[test]
    fn default_gate_drops_blank_rows_unless_kept() {
        let mut gate = RowGate::new(2, false, None, Vec::new(), FilterStrategy::And).unwrap();
        assert_eq!(gate.verdict(1, &set(&[0])), Verdict::Drop); // before body start
        assert_eq!(gate.verdict(2, &set(&[])), Verdict::Drop); // blank row
        assert_eq!(gate.verdict(3, &set(&[0])), Verdict::Admit);

        let mut keep = RowGate::new(0, true, None, Vec::new(), FilterStrategy::And).unwrap();
        assert_eq!(keep.verdict(0, &set(&[])), Verdict::Admit);
    }

    #[test]
    fn take_limit_counts_admitted_rows() {
        let mut gate = RowGate::new(0, false, Some(2), Vec::new(), FilterStrategy::And).unwrap();
        assert_eq!(gate.verdict(0, &set(&[0])), Verdict::Admit);
        assert_eq!(gate.verdict(1, &set(&[])), Verdict::Drop); // not counted
        assert_eq!(gate.verdict(2, &set(&[0])), Verdict::Admit);
        assert_eq!(gate.verdict(3, &set(&[0])), Verdict::Exhausted);
    }
}
