use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical per-row account fields a statement may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountField {
    BankName,
    BranchName,
    AccountId,
    AccountType,
}

impl AccountField {
    pub const ALL: [AccountField; 4] = [
        AccountField::BankName,
        AccountField::BranchName,
        AccountField::AccountId,
        AccountField::AccountType,
    ];
}

impl fmt::Display for AccountField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountField::BankName => write!(f, "bank_name"),
            AccountField::BranchName => write!(f, "branch_name"),
            AccountField::AccountId => write!(f, "account_id"),
            AccountField::AccountType => write!(f, "account_type"),
        }
    }
}

/// File-level account identity: the first non-blank value of each account
/// field found in a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementMetadata {
    pub bank_name: Option<String>,
    pub branch_name: Option<String>,
    pub account_id: Option<String>,
    pub account_type: Option<String>,
}

impl StatementMetadata {
    pub fn get(&self, field: AccountField) -> Option<&str> {
        match field {
            AccountField::BankName => self.bank_name.as_deref(),
            AccountField::BranchName => self.branch_name.as_deref(),
            AccountField::AccountId => self.account_id.as_deref(),
            AccountField::AccountType => self.account_type.as_deref(),
        }
    }

    pub fn set_if_absent(&mut self, field: AccountField, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let slot = match field {
            AccountField::BankName => &mut self.bank_name,
            AccountField::BranchName => &mut self.branch_name,
            AccountField::AccountId => &mut self.account_id,
            AccountField::AccountType => &mut self.account_type,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        AccountField::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_blank_value_wins() {
        let mut meta = StatementMetadata::default();
        meta.set_if_absent(AccountField::BankName, "  ");
        meta.set_if_absent(AccountField::BankName, " みずほ銀行 ");
        meta.set_if_absent(AccountField::BankName, "りそな銀行");
        assert_eq!(meta.get(AccountField::BankName), Some("みずほ銀行"));
        assert!(!meta.is_empty());
    }

    #[test]
    fn default_is_empty() {
        assert!(StatementMetadata::default().is_empty());
    }

    #[test]
    fn field_display_matches_serde_name() {
        for field in AccountField::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{field}\""));
        }
    }
}
