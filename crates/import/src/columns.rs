use std::collections::BTreeMap;
use std::fmt;

use passbook_core::AccountField;

use crate::error::{ImportError, Result};

/// Canonical statement fields every source column is renamed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Date,
    Description,
    AmountOut,
    AmountIn,
    Balance,
    BankName,
    BranchName,
    AccountId,
    AccountType,
}

impl Field {
    pub const REQUIRED: [Field; 5] = [
        Field::Date,
        Field::Description,
        Field::AmountOut,
        Field::AmountIn,
        Field::Balance,
    ];

    pub const ALL: [Field; 9] = [
        Field::Date,
        Field::Description,
        Field::AmountOut,
        Field::AmountIn,
        Field::Balance,
        Field::BankName,
        Field::BranchName,
        Field::AccountId,
        Field::AccountType,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Description => "description",
            Field::AmountOut => "amount_out",
            Field::AmountIn => "amount_in",
            Field::Balance => "balance",
            Field::BankName => "bank_name",
            Field::BranchName => "branch_name",
            Field::AccountId => "account_id",
            Field::AccountType => "account_type",
        }
    }

    /// Most common source label, used when telling the operator what is missing.
    pub fn source_label(self) -> &'static str {
        match self {
            Field::Date => "年月日",
            Field::Description => "摘要",
            Field::AmountOut => "払戻",
            Field::AmountIn => "お預り",
            Field::Balance => "差引残高",
            Field::BankName => "銀行名",
            Field::BranchName => "支店名",
            Field::AccountId => "口座番号",
            Field::AccountType => "種別",
        }
    }

    /// Source labels accepted for this field, besides its canonical name.
    fn synonyms(self) -> &'static [&'static str] {
        match self {
            Field::Date => &["年月日", "日付", "取引日"],
            Field::Description => &["摘要"],
            Field::AmountOut => &["払戻", "払戻額", "出金", "出金額"],
            Field::AmountIn => &["お預り", "お預り額", "入金", "入金額"],
            Field::Balance => &["差引残高", "残高"],
            Field::BankName => &["銀行名"],
            Field::BranchName => &["支店名"],
            Field::AccountId => &["口座番号"],
            Field::AccountType => &["種別"],
        }
    }

    pub fn from_header(header: &str) -> Option<Field> {
        let header = header.trim();
        Field::ALL
            .into_iter()
            .find(|f| f.name() == header || f.synonyms().contains(&header))
    }

    pub fn account_field(self) -> Option<AccountField> {
        match self {
            Field::BankName => Some(AccountField::BankName),
            Field::BranchName => Some(AccountField::BranchName),
            Field::AccountId => Some(AccountField::AccountId),
            Field::AccountType => Some(AccountField::AccountType),
            _ => None,
        }
    }
}

impl From<AccountField> for Field {
    fn from(field: AccountField) -> Self {
        match field {
            AccountField::BankName => Field::BankName,
            AccountField::BranchName => Field::BranchName,
            AccountField::AccountId => Field::AccountId,
            AccountField::AccountType => Field::AccountType,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Canonical field → source column index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    indices: BTreeMap<Field, usize>,
}

impl ColumnMap {
    /// Renames source headers to canonical fields. When two source columns map
    /// to the same field, the leftmost wins.
    pub fn from_headers(headers: &[String]) -> Result<Self> {
        let mut indices = BTreeMap::new();
        for (i, header) in headers.iter().enumerate() {
            let Some(field) = Field::from_header(header) else {
                continue;
            };
            if indices.contains_key(&field) {
                tracing::debug!("Ignoring duplicate column '{header}' for {field}");
                continue;
            }
            if header.trim() != field.name() {
                tracing::debug!("Column '{}' renamed to {field}", header.trim());
            }
            indices.insert(field, i);
        }

        let missing: Vec<String> = Field::REQUIRED
            .iter()
            .filter(|f| !indices.contains_key(*f))
            .map(|f| f.source_label().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::Format {
                missing,
                found: headers
                    .iter()
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
                    .collect(),
            });
        }

        Ok(ColumnMap { indices })
    }

    pub fn index(&self, field: Field) -> Option<usize> {
        self.indices.get(&field).copied()
    }
}
