use passbook_core::AccountField;
use serde::Serialize;
use thiserror::Error;

/// How many offending rows an error carries for display.
pub const MAX_REPORTED_ROWS: usize = 10;
const MAX_SUGGESTION_EXAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Encoding,
    Format,
    Data,
    Validation,
}

/// One offending cell: its physical 1-indexed source line and raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadCell {
    pub line: usize,
    pub value: String,
}

/// A typed, user-facing import failure. Detection errors abort before any row is
/// classified; cell errors are collected across the whole column first.
#[derive(Debug, Clone, Error)]
pub enum ImportError {
    #[error("Could not determine the file's character encoding")]
    Encoding {
        tried_encodings: Vec<String>,
        file_head_hex: String,
    },
    #[error("The file is missing required columns: {}", .missing.join(", "))]
    Format {
        missing: Vec<String>,
        found: Vec<String>,
    },
    #[error("Failed to convert dates ({total} rows)")]
    InvalidDates { total: usize, cells: Vec<BadCell> },
    #[error("Failed to convert {} ({total} rows)", amount_column_label(.column))]
    InvalidAmounts {
        column: String,
        total: usize,
        cells: Vec<BadCell>,
    },
    #[error("The file contains {} different {}", .values.len(), field_label(.field))]
    MultipleValues {
        field: AccountField,
        /// Distinct values in first-appearance order with their row counts.
        values: Vec<(String, usize)>,
    },
    #[error("The file contains no data rows")]
    NoDataRows,
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Serializable form of an [`ImportError`] for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<BadCell>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tried_encodings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_head_hex: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub found_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub value_counts: Vec<(String, usize)>,
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::Encoding { .. } => ErrorKind::Encoding,
            ImportError::Format { .. } => ErrorKind::Format,
            ImportError::InvalidDates { .. }
            | ImportError::InvalidAmounts { .. }
            | ImportError::NoDataRows => ErrorKind::Data,
            ImportError::MultipleValues { .. } => ErrorKind::Validation,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn suggestion(&self) -> String {
        match self {
            ImportError::Encoding { .. } => [
                "Try one of the following:",
                "1. Open the file in a spreadsheet and save it as \"CSV UTF-8\"",
                "2. Re-save it from a text editor as UTF-8 or Shift_JIS",
                "3. Check that the file is not damaged",
            ]
            .join("\n"),
            ImportError::Format { .. } => [
                "Check that the file has these columns:",
                "- 年月日 (or 日付)",
                "- 摘要",
                "- 払戻 (or 払戻額)",
                "- お預り (or お預り額)",
                "- 差引残高 (or 残高)",
            ]
            .join("\n"),
            ImportError::InvalidDates { cells, .. } => format!(
                "Enter dates in one of these forms:\n\
                 - Gregorian: 2024-01-01, 2024/01/01\n\
                 - Japanese era: H28.6.3, R5/4/1\n\
                 \nValues that could not be converted:\n{}",
                format_examples(cells)
            ),
            ImportError::InvalidAmounts { column, cells, .. } => format!(
                "{} must be numeric:\n\
                 - Thousands separators are removed automatically (e.g. 1,234,567)\n\
                 - Blank cells are treated as 0\n\
                 - Withdrawals and deposits must not be negative\n\
                 - Check for letters or symbols in the cell\n\
                 \nValues that could not be converted:\n{}",
                amount_column_label(column),
                format_examples(cells)
            ),
            ImportError::MultipleValues { field, values } => {
                let listed: Vec<String> = values
                    .iter()
                    .take(MAX_SUGGESTION_EXAMPLES)
                    .map(|(v, n)| format!("  - {v}: {n} rows"))
                    .collect();
                format!(
                    "One import may contain only one {label}.\n\
                     Split the file by {label} and upload each part separately.\n\
                     \nDetected {label} values:\n{}",
                    listed.join("\n"),
                    label = field_label(field)
                )
            }
            ImportError::NoDataRows => {
                "Check that the file has at least one transaction below the header row.".to_string()
            }
        }
    }

    pub fn report(&self) -> ErrorReport {
        let mut report = ErrorReport {
            kind: self.kind(),
            message: self.message(),
            suggestion: self.suggestion(),
            column: None,
            cells: Vec::new(),
            tried_encodings: Vec::new(),
            file_head_hex: None,
            missing_columns: Vec::new(),
            found_columns: Vec::new(),
            value_counts: Vec::new(),
        };
        match self {
            ImportError::Encoding {
                tried_encodings,
                file_head_hex,
            } => {
                report.tried_encodings = tried_encodings.clone();
                report.file_head_hex = Some(file_head_hex.clone());
            }
            ImportError::Format { missing, found } => {
                report.missing_columns = missing.clone();
                report.found_columns = found.clone();
            }
            ImportError::InvalidDates { cells, .. } => {
                report.column = Some("日付".to_string());
                report.cells = cells.clone();
            }
            ImportError::InvalidAmounts { column, cells, .. } => {
                report.column = Some(amount_column_label(column).to_string());
                report.cells = cells.clone();
            }
            ImportError::MultipleValues { field, values } => {
                report.column = Some(field_label(field).to_string());
                report.value_counts = values.clone();
            }
            ImportError::NoDataRows => {}
        }
        report
    }
}

fn format_examples(cells: &[BadCell]) -> String {
    cells
        .iter()
        .take(MAX_SUGGESTION_EXAMPLES)
        .map(|c| format!("  line {}: {}", c.line, c.value))
        .collect::<Vec<_>>()
        .join("\n")
}

fn amount_column_label(column: &str) -> &str {
    match column {
        "amount_out" => "払戻額",
        "amount_in" => "お預り額",
        "balance" => "残高",
        other => other,
    }
}

fn field_label(field: &AccountField) -> &'static str {
    match field {
        AccountField::BankName => "銀行名",
        AccountField::BranchName => "支店名",
        AccountField::AccountId => "口座番号",
        AccountField::AccountType => "種別",
    }
}
