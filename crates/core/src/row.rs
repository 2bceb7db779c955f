use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::AccountField;

/// Sentinel category for rows no rule resolved. Never an absent value.
pub const UNCATEGORIZED: &str = "未分類";

/// A statement row after column mapping, calendar resolution and numeric coercion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub date: NaiveDate,
    pub description: String,
    pub amount_out: i64,
    pub amount_in: i64,
    pub balance: Option<i64>,
    pub bank_name: Option<String>,
    pub branch_name: Option<String>,
    pub account_type: Option<String>,
    pub account_id: Option<String>,
}

impl NormalizedRow {
    pub fn new(
        date: NaiveDate,
        description: &str,
        amount_out: i64,
        amount_in: i64,
        balance: Option<i64>,
    ) -> Self {
        NormalizedRow {
            date,
            description: description.to_string(),
            amount_out,
            amount_in,
            balance,
            bank_name: None,
            branch_name: None,
            account_type: None,
            account_id: None,
        }
    }

    pub fn with_account_id(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    pub fn account_field(&self, field: AccountField) -> Option<&str> {
        match field {
            AccountField::BankName => self.bank_name.as_deref(),
            AccountField::BranchName => self.branch_name.as_deref(),
            AccountField::AccountId => self.account_id.as_deref(),
            AccountField::AccountType => self.account_type.as_deref(),
        }
    }

    pub fn account_field_mut(&mut self, field: AccountField) -> &mut Option<String> {
        match field {
            AccountField::BankName => &mut self.bank_name,
            AccountField::BranchName => &mut self.branch_name,
            AccountField::AccountId => &mut self.account_id,
            AccountField::AccountType => &mut self.account_type,
        }
    }

    /// Signed movement as seen by the running balance. Saturates at the
    /// `i64` bounds.
    pub fn net_amount(&self) -> i64 {
        self.amount_in.saturating_sub(self.amount_out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedRow {
    #[serde(flatten)]
    pub row: NormalizedRow,
    pub calc_balance: i64,
    pub is_balance_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedRow {
    #[serde(flatten)]
    pub validated: ValidatedRow,
    pub category: String,
    /// Confidence 0–100.
    pub classification_score: u8,
}

impl ClassifiedRow {
    pub fn row(&self) -> &NormalizedRow {
        &self.validated.row
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category == UNCATEGORIZED
    }
}

/// Counterpart of a transfer pair: the other leg's account and date.
/// Serialized as `"<account_id> (<YYYY-MM-DD>)"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TransferRef {
    pub account_id: String,
    pub date: NaiveDate,
}

impl fmt::Display for TransferRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.account_id, self.date.format("%Y-%m-%d"))
    }
}

impl From<TransferRef> for String {
    fn from(r: TransferRef) -> Self {
        r.to_string()
    }
}

impl TryFrom<String> for TransferRef {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let (account_id, rest) = s
            .rsplit_once(" (")
            .ok_or_else(|| format!("Invalid transfer reference: '{s}'"))?;
        let date = rest
            .strip_suffix(')')
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .ok_or_else(|| format!("Invalid transfer reference date: '{s}'"))?;
        Ok(TransferRef {
            account_id: account_id.to_string(),
            date,
        })
    }
}

/// Final pipeline output, ready for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedRow {
    #[serde(flatten)]
    pub classified: ClassifiedRow,
    pub is_transfer: bool,
    pub transfer_to: Option<TransferRef>,
    pub is_large: bool,
}

impl AnnotatedRow {
    pub fn row(&self) -> &NormalizedRow {
        self.classified.row()
    }
}

impl AsRef<NormalizedRow> for NormalizedRow {
    fn as_ref(&self) -> &NormalizedRow {
        self
    }
}

impl AsRef<NormalizedRow> for ValidatedRow {
    fn as_ref(&self) -> &NormalizedRow {
        &self.row
    }
}

impl AsRef<NormalizedRow> for ClassifiedRow {
    fn as_ref(&self) -> &NormalizedRow {
        self.row()
    }
}

impl AsRef<NormalizedRow> for AnnotatedRow {
    fn as_ref(&self) -> &NormalizedRow {
        self.row()
    }
}

impl AsRef<ClassifiedRow> for ClassifiedRow {
    fn as_ref(&self) -> &ClassifiedRow {
        self
    }
}

impl AsRef<ClassifiedRow> for AnnotatedRow {
    fn as_ref(&self) -> &ClassifiedRow {
        &self.classified
    }
}

/// Large-amount flag, independent of classification.
pub fn is_large_amount(amount_out: i64, amount_in: i64, threshold: i64) -> bool {
    amount_out >= threshold || amount_in >= threshold
}
