use std::collections::HashMap;

use chrono::NaiveDate;
use passbook_core::NormalizedRow;

type DuplicateKey<'a> = (NaiveDate, i64, i64, &'a str, Option<&'a str>);

fn key(row: &NormalizedRow) -> DuplicateKey<'_> {
    (
        row.date,
        row.amount_out,
        row.amount_in,
        row.description.as_str(),
        row.account_id.as_deref(),
    )
}

/// Indices of rows identical on (date, amount_out, amount_in, description,
/// account_id). Only groups of two or more are returned, ordered by their
/// first member.
pub fn find_duplicate_groups<T: AsRef<NormalizedRow>>(rows: &[T]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut by_key: HashMap<DuplicateKey<'_>, usize> = HashMap::new();

    for (i, row) in rows.iter().enumerate() {
        match by_key.get(&key(row.as_ref())) {
            Some(&g) => groups[g].push(i),
            None => {
                by_key.insert(key(row.as_ref()), groups.len());
                groups.push(vec![i]);
            }
        }
    }

    groups.retain(|g| g.len() > 1);
    groups
}
