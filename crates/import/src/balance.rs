use passbook_core::{NormalizedRow, ValidatedRow};

/// Walks rows in (date, original order) checking running-balance arithmetic.
///
/// The first row's stated balance seeds the walk. On a mismatch the row is
/// flagged and the walk resyncs to that row's stated balance, so one bad cell
/// flags one row. Rows without a stated balance are not checked. Output is in
/// the sorted order.
pub fn validate_balances(rows: Vec<NormalizedRow>) -> Vec<ValidatedRow> {
    let mut rows = rows;
    // Stable: same-day rows keep their statement order.
    rows.sort_by_key(|r| r.date);

    let mut running: Option<i64> = None;
    let mut errors = 0usize;
    let validated: Vec<ValidatedRow> = rows
        .into_iter()
        .map(|row| {
            let (calc_balance, is_balance_error) = match running {
                None => (row.balance.unwrap_or_else(|| row.net_amount()), false),
                Some(prev) => {
                    let expected = prev.saturating_add(row.net_amount());
                    match row.balance {
                        Some(stated) if stated != expected => (expected, true),
                        _ => (expected, false),
                    }
                }
            };
            running = Some(if is_balance_error {
                row.balance.unwrap_or(calc_balance)
            } else {
                calc_balance
            });
            if is_balance_error {
                errors += 1;
            }
            ValidatedRow {
                row,
                calc_balance,
                is_balance_error,
            }
        })
        .collect();

    if errors > 0 {
        tracing::info!("{errors} of {} rows have balance discrepancies", validated.len());
    }
    validated
}
