use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::error::{BadCell, ImportError, Result, MAX_REPORTED_ROWS};
use crate::table::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Not a number")]
    NotNumeric,
    #[error("Amount out of range")]
    OutOfRange,
    #[error("Amount must not be negative")]
    Negative,
}

/// Whether a column may hold values below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// Withdrawal and deposit legs.
    NonNegative,
    /// Running balances, which may be overdrawn.
    Any,
}

/// Parses one amount cell. `Ok(None)` means blank (empty, whitespace, or the
/// literal `nan` some spreadsheet exports write for missing values).
pub fn parse_amount(cell: &Cell) -> std::result::Result<Option<i64>, AmountError> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(n) if n.is_finite() => {
            let n = n.trunc();
            if n < i64::MIN as f64 || n >= i64::MAX as f64 {
                return Err(AmountError::OutOfRange);
            }
            Ok(Some(n as i64))
        }
        Cell::Number(_) => Ok(None),
        Cell::Text(s) => parse_amount_text(s),
    }
}

fn parse_amount_text(s: &str) -> std::result::Result<Option<i64>, AmountError> {
    let cleaned = s.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "nan" {
        return Ok(None);
    }
    let dec = Decimal::from_str(cleaned).map_err(|_| AmountError::NotNumeric)?;
    dec.trunc().to_i64().map(Some).ok_or(AmountError::OutOfRange)
}

fn parse_signed(cell: &Cell, sign: Sign) -> std::result::Result<Option<i64>, AmountError> {
    match (parse_amount(cell)?, sign) {
        (Some(v), Sign::NonNegative) if v < 0 => Err(AmountError::Negative),
        (v, _) => Ok(v),
    }
}

/// Coerces a whole column, collecting every bad cell before failing once.
/// Blank cells are returned as `None`; callers decide what blank means.
pub fn coerce_column<'a, I>(column: &str, sign: Sign, cells: I) -> Result<Vec<Option<i64>>>
where
    I: IntoIterator<Item = (usize, &'a Cell)>,
{
    let mut values = Vec::new();
    let mut bad = Vec::new();

    for (line, cell) in cells {
        match parse_signed(cell, sign) {
            Ok(v) => values.push(v),
            Err(e) => {
                tracing::debug!("{column} line {line}: {e}");
                bad.push(BadCell {
                    line,
                    value: cell.to_string(),
                });
                values.push(None);
            }
        }
    }

    if bad.is_empty() {
        return Ok(values);
    }

    tracing::debug!("{} unparseable values in amount column {column}", bad.len());
    let total = bad.len();
    bad.truncate(MAX_REPORTED_ROWS);
    Err(ImportError::InvalidAmounts {
        column: column.to_string(),
        total,
        cells: bad,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    // ── parse_amount ──────────────────────────────────────────────────────────

    #[test]
    fn thousands_separators_are_removed() {
        assert_eq!(parse_amount(&text("1,234,567")), Ok(Some(1_234_567)));
    }

    #[test]
    fn blank_and_nan_are_blank() {
        assert_eq!(parse_amount(&text("")), Ok(None));
        assert_eq!(parse_amount(&text("   ")), Ok(None));
        assert_eq!(parse_amount(&text("nan")), Ok(None));
        assert_eq!(parse_amount(&Cell::Empty), Ok(None));
    }

    #[test]
    fn spreadsheet_float_forms_become_integers() {
        assert_eq!(parse_amount(&text("300000.0")), Ok(Some(300_000)));
        assert_eq!(parse_amount(&Cell::Number(1500.0)), Ok(Some(1500)));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(parse_amount(&text(" 5,000 ")), Ok(Some(5000)));
    }

    #[test]
    fn non_numeric_is_an_error_not_zero() {
        assert_eq!(parse_amount(&text("abc")), Err(AmountError::NotNumeric));
        assert_eq!(parse_amount(&text("1,2x3")), Err(AmountError::NotNumeric));
    }

    #[test]
    fn overflow_is_an_error() {
        assert_eq!(
            parse_amount(&text("99999999999999999999")),
            Err(AmountError::OutOfRange)
        );
        assert_eq!(parse_amount(&Cell::Number(1e30)), Err(AmountError::OutOfRange));
    }

    // ── coerce_column ─────────────────────────────────────────────────────────

    #[test]
    fn column_success_keeps_blanks_as_none() {
        let cells = [text("1,000"), Cell::Empty, text("nan")];
        let lines = cells.iter().enumerate().map(|(i, c)| (i + 2, c));
        let values = coerce_column("amount_out", Sign::NonNegative, lines).unwrap();
        assert_eq!(values, vec![Some(1000), None, None]);
    }

    #[test]
    fn column_failure_collects_every_bad_cell() {
        let mut cells: Vec<Cell> = (0..12).map(|_| text("x")).collect();
        cells.insert(0, text("100"));
        let lines = cells.iter().enumerate().map(|(i, c)| (i + 2, c));
        let err = coerce_column("amount_in", Sign::NonNegative, lines).unwrap_err();
        match err {
            ImportError::InvalidAmounts { column, total, cells } => {
                assert_eq!(column, "amount_in");
                assert_eq!(total, 12);
                assert_eq!(cells.len(), MAX_REPORTED_ROWS);
                assert_eq!(cells[0].line, 3);
                assert_eq!(cells[0].value, "x");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn negative_movements_are_bad_cells() {
        let cells = [text("1,000"), text("-5,000")];
        let err = coerce_column(
            "amount_out",
            Sign::NonNegative,
            cells.iter().enumerate().map(|(i, c)| (i + 2, c)),
        )
        .unwrap_err();
        match err {
            ImportError::InvalidAmounts { total, cells, .. } => {
                assert_eq!(total, 1);
                assert_eq!(cells[0].line, 3);
                assert_eq!(cells[0].value, "-5,000");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn negative_balance_is_allowed() {
        let cells = [text("-5,000")];
        let values = coerce_column("balance", Sign::Any, cells.iter().map(|c| (2, c))).unwrap();
        assert_eq!(values, vec![Some(-5000)]);
    }
}
