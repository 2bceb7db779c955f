use chrono::NaiveDate;
use passbook_core::{AnalysisSettings, AnnotatedRow, NormalizedRow, TransferRef};
use passbook_core::settings::{DEFAULT_TRANSFER_AMOUNT_TOLERANCE, DEFAULT_TRANSFER_DAYS_WINDOW};
use serde::Serialize;

/// Identity of a row taking part in matching: already persisted, or part of
/// the batch being imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RowKey {
    Existing(i64),
    Incoming(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchableRow {
    pub key: RowKey,
    pub date: NaiveDate,
    pub amount_out: i64,
    pub amount_in: i64,
    pub account_id: Option<String>,
}

impl MatchableRow {
    pub fn from_row(key: RowKey, row: &NormalizedRow) -> Self {
        MatchableRow {
            key,
            date: row.date,
            amount_out: row.amount_out,
            amount_in: row.amount_in,
            account_id: row.account_id.clone(),
        }
    }

    fn transfer_ref(&self) -> Option<TransferRef> {
        self.account_id.as_ref().map(|account_id| TransferRef {
            account_id: account_id.clone(),
            date: self.date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferMatch {
    pub withdrawal: RowKey,
    pub deposit: RowKey,
    /// `deposit.amount_in - withdrawal.amount_out`.
    pub difference: i64,
    /// Deposit date minus withdrawal date.
    pub days_apart: i64,
}

/// Per-row result, aligned with the matcher's input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferAnnotation {
    pub is_transfer: bool,
    pub transfer_to: Option<TransferRef>,
}

/// Greedy withdrawal→deposit pairing across accounts.
///
/// Rows are visited by date (input order breaks ties). Each withdrawal takes
/// the first unclaimed deposit on another account within the amount tolerance
/// and day window; no global optimum is sought. Rows without an account id
/// never pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferMatcher {
    pub amount_tolerance: i64,
    pub date_window: i64,
}

impl Default for TransferMatcher {
    fn default() -> Self {
        Self {
            amount_tolerance: DEFAULT_TRANSFER_AMOUNT_TOLERANCE,
            date_window: DEFAULT_TRANSFER_DAYS_WINDOW,
        }
    }
}

impl TransferMatcher {
    pub fn new(amount_tolerance: i64, date_window: i64) -> Self {
        Self {
            amount_tolerance,
            date_window,
        }
    }

    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        Self::new(settings.transfer_amount_tolerance, settings.transfer_days_window)
    }

    pub fn find_transfers(&self, rows: &[MatchableRow]) -> Vec<TransferMatch> {
        self.pair_indices(rows)
            .into_iter()
            .map(|(w, d)| {
                let (w, d) = (&rows[w], &rows[d]);
                TransferMatch {
                    withdrawal: w.key,
                    deposit: d.key,
                    difference: d.amount_in - w.amount_out,
                    days_apart: (d.date - w.date).num_days(),
                }
            })
            .collect()
    }

    /// Fresh annotations for every input row; prior flags are never consulted,
    /// so re-running over the same rows yields the same result.
    pub fn annotate(&self, rows: &[MatchableRow]) -> Vec<TransferAnnotation> {
        let mut out = vec![TransferAnnotation::default(); rows.len()];
        for (w, d) in self.pair_indices(rows) {
            out[w] = TransferAnnotation {
                is_transfer: true,
                transfer_to: rows[d].transfer_ref(),
            };
            out[d] = TransferAnnotation {
                is_transfer: true,
                transfer_to: rows[w].transfer_ref(),
            };
        }
        out
    }

    fn pair_indices(&self, rows: &[MatchableRow]) -> Vec<(usize, usize)> {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by_key(|&i| rows[i].date);

        let withdrawals: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| rows[i].amount_out > 0 && rows[i].account_id.is_some())
            .collect();
        let deposits: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| rows[i].amount_in > 0 && rows[i].account_id.is_some())
            .collect();

        let mut consumed = vec![false; rows.len()];
        let mut pairs = Vec::new();

        for &w in &withdrawals {
            if consumed[w] {
                continue;
            }
            let wr = &rows[w];
            let found = deposits.iter().copied().find(|&d| {
                let dr = &rows[d];
                d != w
                    && !consumed[d]
                    && dr.account_id != wr.account_id
                    && (dr.amount_in - wr.amount_out).abs() <= self.amount_tolerance
                    && (dr.date - wr.date).num_days().abs() <= self.date_window
            });
            if let Some(d) = found {
                consumed[w] = true;
                consumed[d] = true;
                pairs.push((w, d));
            }
        }

        tracing::debug!(
            "Paired {} transfers from {} withdrawals and {} deposits",
            pairs.len(),
            withdrawals.len(),
            deposits.len()
        );
        pairs
    }
}

/// A withdrawal row and the deposit row it was paired with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferPair<'a> {
    pub withdrawal: &'a AnnotatedRow,
    pub deposit: &'a AnnotatedRow,
}

/// Recovers pairs from annotated rows by following reciprocal references.
pub fn transfer_pairs(rows: &[AnnotatedRow]) -> Vec<TransferPair<'_>> {
    let refers_to = |from: &AnnotatedRow, to: &AnnotatedRow| {
        let to_row = to.row();
        from.transfer_to.as_ref().is_some_and(|r| {
            Some(r.account_id.as_str()) == to_row.account_id.as_deref() && r.date == to_row.date
        })
    };

    let mut used = vec![false; rows.len()];
    let mut pairs = Vec::new();
    for w in rows.iter().filter(|r| r.is_transfer && r.row().amount_out > 0) {
        let found = rows.iter().enumerate().find(|(i, d)| {
            !used[*i]
                && d.is_transfer
                && d.row().amount_in > 0
                && refers_to(w, *d)
                && refers_to(*d, w)
        });
        if let Some((i, d)) = found {
            used[i] = true;
            pairs.push(TransferPair {
                withdrawal: w,
                deposit: d,
            });
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn tx(key: usize, d: u32, account: Option<&str>, out: i64, inc: i64) -> MatchableRow {
        MatchableRow {
            key: RowKey::Incoming(key),
            date: day(d),
            amount_out: out,
            amount_in: inc,
            account_id: account.map(str::to_string),
        }
    }

    // ── pairing ───────────────────────────────────────────────────────────────

    #[test]
    fn pairs_within_tolerance_and_window() {
        let rows = vec![
            tx(0, 1, Some("A"), 300_000, 0),
            tx(1, 3, Some("B"), 0, 300_500),
        ];
        let ann = TransferMatcher::new(1_000, 3).annotate(&rows);
        assert!(ann[0].is_transfer && ann[1].is_transfer);
        assert_eq!(ann[0].transfer_to.as_ref().unwrap().to_string(), "B (2024-03-03)");
        assert_eq!(ann[1].transfer_to.as_ref().unwrap().to_string(), "A (2024-03-01)");
    }

    #[test]
    fn same_account_never_pairs() {
        let rows = vec![tx(0, 1, Some("A"), 5_000, 0), tx(1, 1, Some("A"), 0, 5_000)];
        assert!(TransferMatcher::default().find_transfers(&rows).is_empty());
    }

    #[test]
    fn rows_without_account_never_pair() {
        let rows = vec![tx(0, 1, None, 5_000, 0), tx(1, 1, Some("B"), 0, 5_000)];
        assert!(TransferMatcher::default().find_transfers(&rows).is_empty());
    }

    #[test]
    fn outside_window_or_tolerance_is_rejected() {
        let late = vec![tx(0, 1, Some("A"), 5_000, 0), tx(1, 5, Some("B"), 0, 5_000)];
        assert!(TransferMatcher::new(1_000, 3).find_transfers(&late).is_empty());
        let off = vec![tx(0, 1, Some("A"), 5_000, 0), tx(1, 1, Some("B"), 0, 6_001)];
        assert!(TransferMatcher::new(1_000, 3).find_transfers(&off).is_empty());
    }

    #[test]
    fn deposit_before_withdrawal_within_window_pairs() {
        let rows = vec![tx(0, 2, Some("B"), 0, 10_000), tx(1, 4, Some("A"), 10_000, 0)];
        let found = TransferMatcher::default().find_transfers(&rows);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].days_apart, -2);
    }

    // ── tie-break and injectivity ─────────────────────────────────────────────

    #[test]
    fn first_candidate_in_date_order_wins() {
        let rows = vec![
            tx(0, 2, Some("C"), 0, 10_000),
            tx(1, 1, Some("B"), 0, 10_000),
            tx(2, 1, Some("A"), 10_000, 0),
        ];
        let found = TransferMatcher::default().find_transfers(&rows);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].deposit, RowKey::Incoming(1));
    }

    #[test]
    fn each_deposit_is_claimed_once() {
        let rows = vec![
            tx(0, 1, Some("A"), 10_000, 0),
            tx(1, 1, Some("C"), 10_000, 0),
            tx(2, 2, Some("B"), 0, 10_000),
        ];
        let found = TransferMatcher::default().find_transfers(&rows);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].withdrawal, RowKey::Incoming(0));
        let mut deposits: Vec<RowKey> = found.iter().map(|m| m.deposit).collect();
        deposits.dedup();
        assert_eq!(deposits.len(), found.len());
    }

    #[test]
    fn annotate_is_idempotent() {
        let rows = vec![
            tx(0, 1, Some("A"), 300_000, 0),
            tx(1, 2, Some("B"), 0, 300_000),
            tx(2, 2, Some("A"), 0, 1_000),
            tx(3, 9, Some("B"), 1_000, 0),
        ];
        let m = TransferMatcher::default();
        assert_eq!(m.annotate(&rows), m.annotate(&rows));
    }

    #[test]
    fn existing_and_incoming_rows_mix() {
        let mut rows = vec![tx(0, 1, Some("A"), 50_000, 0)];
        rows.push(MatchableRow {
            key: RowKey::Existing(42),
            ..tx(0, 2, Some("B"), 0, 50_000)
        });
        let found = TransferMatcher::default().find_transfers(&rows);
        assert_eq!(found[0].deposit, RowKey::Existing(42));
    }
}
