use passbook_core::{AccountField, NormalizedRow, StatementMetadata};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::amount::{self, Sign};
use crate::columns::{ColumnMap, Field};
use crate::era::parse_statement_date;
use crate::error::{BadCell, ImportError, Result, MAX_REPORTED_ROWS};
use crate::table::{Cell, RawRow, RawTable};

/// Account fields that must hold a single value per imported file.
const SINGLE_VALUED: [AccountField; 2] = [AccountField::BankName, AccountField::AccountId];

const RECORDS_SOURCE: &str = "records";

/// Rows of one statement with resolved dates and integer amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedStatement {
    pub rows: Vec<NormalizedRow>,
    pub metadata: StatementMetadata,
    pub source: String,
}

/// Turns a located table into normalized rows, or the first detection/data error.
pub fn normalize_table(table: &RawTable) -> Result<NormalizedStatement> {
    let columns = ColumnMap::from_headers(&table.headers)?;

    let rows: Vec<&RawRow> = table.rows.iter().filter(|r| !r.is_blank()).collect();
    let skipped = table.rows.len() - rows.len();
    if skipped > 0 {
        tracing::debug!("Skipped {skipped} blank rows");
    }
    if rows.is_empty() {
        return Err(ImportError::NoDataRows);
    }

    let metadata = extract_metadata(&rows, &columns);
    for field in SINGLE_VALUED {
        check_single_value(&rows, &columns, field)?;
    }

    let dates = resolve_dates(&rows, &columns)?;
    let amount_out = coerce(&rows, &columns, Field::AmountOut)?;
    let amount_in = coerce(&rows, &columns, Field::AmountIn)?;
    let balance = coerce(&rows, &columns, Field::Balance)?;

    let text = |row: &RawRow, field: Field| columns.index(field).and_then(|i| row.cell(i).text());

    let normalized: Vec<NormalizedRow> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut out = NormalizedRow::new(
                dates[i],
                &text(row, Field::Description).unwrap_or_default(),
                amount_out[i].unwrap_or(0),
                amount_in[i].unwrap_or(0),
                balance[i],
            );
            for field in AccountField::ALL {
                *out.account_field_mut(field) = text(row, field.into())
                    .or_else(|| metadata.get(field).map(str::to_string));
            }
            out
        })
        .collect();

    tracing::info!(
        "Normalized {} rows from {} source",
        normalized.len(),
        table.source
    );
    Ok(NormalizedStatement {
        rows: normalized,
        metadata,
        source: table.source.clone(),
    })
}

/// Entry point for pre-structured rows (OCR output) keyed by canonical or
/// source column names. Record `i` is reported as line `i + 2`, as if the
/// records had been read below a header line.
pub fn normalize_records(records: &[Map<String, Value>]) -> Result<NormalizedStatement> {
    let mut headers: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| RawRow {
            line: i + 2,
            cells: headers
                .iter()
                .map(|h| record.get(h).map(json_cell).unwrap_or(Cell::Empty))
                .collect(),
        })
        .collect();

    normalize_table(&RawTable {
        headers,
        rows,
        source: RECORDS_SOURCE.to_string(),
    })
}

fn json_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Empty,
        Value::String(s) => Cell::from_text(s),
        Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
        other => Cell::Text(other.to_string()),
    }
}

fn extract_metadata(rows: &[&RawRow], columns: &ColumnMap) -> StatementMetadata {
    let mut metadata = StatementMetadata::default();
    for field in AccountField::ALL {
        let Some(index) = columns.index(field.into()) else {
            continue;
        };
        if let Some(value) = rows.iter().find_map(|r| r.cell(index).text()) {
            metadata.set_if_absent(field, &value);
        }
    }
    metadata
}

/// Distinct non-blank values with row counts, in first-appearance order.
fn value_counts(rows: &[&RawRow], index: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in rows.iter().filter_map(|r| r.cell(index).text()) {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    counts
}

fn check_single_value(rows: &[&RawRow], columns: &ColumnMap, field: AccountField) -> Result<()> {
    let Some(index) = columns.index(field.into()) else {
        return Ok(());
    };
    let values = value_counts(rows, index);
    if values.len() > 1 {
        tracing::warn!("{} distinct {field} values in one file", values.len());
        return Err(ImportError::MultipleValues { field, values });
    }
    Ok(())
}

fn resolve_dates(rows: &[&RawRow], columns: &ColumnMap) -> Result<Vec<chrono::NaiveDate>> {
    let index = columns.index(Field::Date).unwrap_or_default();
    let mut dates = Vec::with_capacity(rows.len());
    let mut bad = Vec::new();

    for row in rows {
        let raw = row.cell(index).text().unwrap_or_default();
        match parse_statement_date(&raw) {
            Some(date) => dates.push(date),
            None => bad.push(BadCell {
                line: row.line,
                value: raw,
            }),
        }
    }

    if bad.is_empty() {
        return Ok(dates);
    }
    let total = bad.len();
    bad.truncate(MAX_REPORTED_ROWS);
    Err(ImportError::InvalidDates { total, cells: bad })
}

fn coerce(rows: &[&RawRow], columns: &ColumnMap, field: Field) -> Result<Vec<Option<i64>>> {
    let index = columns.index(field).unwrap_or_default();
    let sign = match field {
        Field::Balance => Sign::Any,
        _ => Sign::NonNegative,
    };
    amount::coerce_column(field.name(), sign, rows.iter().map(|r| (r.line, r.cell(index))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::read_statement;
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn normalize(csv: &str) -> Result<NormalizedStatement> {
        normalize_table(&read_statement(csv.as_bytes())?)
    }

    // ── happy path ────────────────────────────────────────────────────────────

    #[test]
    fn mixed_calendar_statement() {
        let stmt = normalize(
            "銀行名,支店名,口座番号,年月日,摘要,払戻,お預り,差引残高\n\
             みずほ銀行,本店,1234567,H28.6.3,ATM,\"10,000\",,\"90,000\"\n\
             ,,,2016/06/25,給与振込,,\"300,000\",\"390,000\"\n",
        )
        .unwrap();
        assert_eq!(stmt.rows.len(), 2);
        let first = &stmt.rows[0];
        assert_eq!(first.date, date(2016, 6, 3));
        assert_eq!(first.amount_out, 10_000);
        assert_eq!(first.amount_in, 0);
        assert_eq!(first.balance, Some(90_000));
        // Blank account cells are backfilled from the file's metadata.
        let second = &stmt.rows[1];
        assert_eq!(second.bank_name.as_deref(), Some("みずほ銀行"));
        assert_eq!(second.account_id.as_deref(), Some("1234567"));
        assert_eq!(stmt.metadata.branch_name.as_deref(), Some("本店"));
    }

    #[test]
    fn blank_balance_is_none() {
        let stmt = normalize("日付,摘要,払戻,お預り,残高\n2024-01-01,x,100,,\n").unwrap();
        assert_eq!(stmt.rows[0].balance, None);
    }

    #[test]
    fn fully_blank_rows_are_skipped() {
        let stmt = normalize("日付,摘要,払戻,お預り,残高\n2024-01-01,x,100,,900\n,,,,\n").unwrap();
        assert_eq!(stmt.rows.len(), 1);
    }

    // ── rejections ────────────────────────────────────────────────────────────

    #[test]
    fn header_only_file_has_no_rows() {
        assert!(matches!(
            normalize("日付,摘要,払戻,お預り,残高\n"),
            Err(ImportError::NoDataRows)
        ));
    }

    #[test]
    fn every_bad_date_is_reported() {
        let err = normalize(
            "日付,摘要,払戻,お預り,残高\n\
             H28.13.1,a,1,,1\n\
             2024-01-01,b,1,,1\n\
             不明,c,1,,1\n",
        )
        .unwrap_err();
        match err {
            ImportError::InvalidDates { total, cells } => {
                assert_eq!(total, 2);
                assert_eq!(cells[0], BadCell { line: 2, value: "H28.13.1".into() });
                assert_eq!(cells[1], BadCell { line: 4, value: "不明".into() });
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_numeric_amount_is_a_data_error() {
        let err = normalize("日付,摘要,払戻,お預り,残高\n2024-01-01,a,abc,,1\n").unwrap_err();
        assert!(matches!(
            err,
            ImportError::InvalidAmounts { ref column, total: 1, .. } if column == "amount_out"
        ));
    }

    #[test]
    fn negative_withdrawal_is_rejected_but_overdraft_balance_is_kept() {
        let err = normalize("日付,摘要,払戻,お預り,残高\n2024-01-01,x,\"-5,000\",,1000\n").unwrap_err();
        match err {
            ImportError::InvalidAmounts { column, cells, .. } => {
                assert_eq!(column, "amount_out");
                assert_eq!(cells[0], BadCell { line: 2, value: "-5,000".into() });
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let stmt = normalize("日付,摘要,払戻,お預り,残高\n2024-01-01,x,5000,,-4000\n").unwrap();
        assert_eq!(stmt.rows[0].balance, Some(-4000));
    }

    #[test]
    fn bad_cells_after_blank_lines_keep_file_line_numbers() {
        let err = normalize("日付,摘要,払戻,お預り,残高\n2024-01-01,a,1,,1\n\n\n2024-01-02,b,x,,1\n")
            .unwrap_err();
        match err {
            ImportError::InvalidAmounts { cells, .. } => assert_eq!(cells[0].line, 5),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn two_accounts_in_one_file_are_rejected_before_dates() {
        let err = normalize(
            "口座番号,日付,摘要,払戻,お預り,残高\n\
             111,bad-date,a,1,,1\n\
             222,2024-01-01,b,1,,1\n\
             111,2024-01-02,c,1,,1\n",
        )
        .unwrap_err();
        match err {
            ImportError::MultipleValues { field, values } => {
                assert_eq!(field, AccountField::AccountId);
                assert_eq!(values, [("111".to_string(), 2), ("222".to_string(), 1)]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // ── pre-structured records ────────────────────────────────────────────────

    #[test]
    fn records_entry_point_runs_the_same_steps() {
        let records = vec![
            json!({"date": "R5/4/1", "description": "家賃", "amount_out": "80,000", "amount_in": null, "balance": 120000}),
            json!({"date": "2023-04-02", "description": "入金", "amount_out": "", "amount_in": 5000, "balance": "125,000"}),
        ];
        let records: Vec<Map<String, Value>> = records
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        let stmt = normalize_records(&records).unwrap();
        assert_eq!(stmt.source, "records");
        assert_eq!(stmt.rows[0].date, date(2023, 4, 1));
        assert_eq!(stmt.rows[0].amount_out, 80_000);
        assert_eq!(stmt.rows[1].amount_in, 5_000);
        assert_eq!(stmt.rows[1].balance, Some(125_000));
    }

    #[test]
    fn records_errors_use_record_line_numbers() {
        let records: Vec<Map<String, Value>> = vec![json!({
            "date": "??", "description": "x", "amount_out": 0, "amount_in": 0, "balance": 0
        })
        .as_object()
        .cloned()
        .unwrap()];
        match normalize_records(&records).unwrap_err() {
            ImportError::InvalidDates { cells, .. } => assert_eq!(cells[0].line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
