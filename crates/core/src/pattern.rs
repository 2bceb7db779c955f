use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Category reached only through the gift rule (withdrawal at or above the gift threshold).
pub const GIFT_CATEGORY: &str = "贈与";
/// Catch-all category, evaluated after every other rule.
pub const OTHER_CATEGORY: &str = "その他";

/// Whether a keyword applies to every case or to a single case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Case,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Case => write!(f, "case"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternEditError {
    #[error("Keyword must not be blank")]
    EmptyKeyword,
    #[error("Category not found: {0}")]
    CategoryNotFound(String),
    #[error("Keyword '{keyword}' not found in category '{category}'")]
    KeywordNotFound { category: String, keyword: String },
    #[error("Keyword '{keyword}' already exists in category '{category}'")]
    DuplicateKeyword { category: String, keyword: String },
}

/// Category label → ordered, duplicate-free keyword list.
///
/// Keywords are kept exactly as entered (trimmed); matching folds them later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct PatternSet {
    categories: BTreeMap<String, Vec<String>>,
}

impl From<BTreeMap<String, Vec<String>>> for PatternSet {
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        let categories = raw
            .into_iter()
            .map(|(category, keywords)| {
                let mut unique: Vec<String> = Vec::with_capacity(keywords.len());
                for kw in keywords {
                    let kw = kw.trim().to_string();
                    if !kw.is_empty() && !unique.contains(&kw) {
                        unique.push(kw);
                    }
                }
                (category, unique)
            })
            .collect();
        PatternSet { categories }
    }
}

impl From<PatternSet> for BTreeMap<String, Vec<String>> {
    fn from(set: PatternSet) -> Self {
        set.categories
    }
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(&str, &[&str])]) -> Self {
        let raw: BTreeMap<String, Vec<String>> = pairs
            .iter()
            .map(|(cat, kws)| (cat.to_string(), kws.iter().map(|k| k.to_string()).collect()))
            .collect();
        raw.into()
    }

    /// The built-in global taxonomy.
    pub fn defaults() -> Self {
        Self::from_pairs(DEFAULT_PATTERNS)
    }

    /// Parses a taxonomy file of the form `category = ["kw", ...]`.
    pub fn from_toml(toml_content: &str) -> Result<Self, toml::de::Error> {
        let raw: BTreeMap<String, Vec<String>> = toml::from_str(toml_content)?;
        Ok(raw.into())
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(c, kws)| (c.as_str(), kws.as_slice()))
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn keywords(&self, category: &str) -> &[String] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, category: &str, keyword: &str) -> bool {
        self.keywords(category).iter().any(|k| k == keyword)
    }

    /// Adds a keyword, creating the category if needed.
    /// Returns `Ok(false)` when the keyword was already present.
    pub fn add_keyword(&mut self, category: &str, keyword: &str) -> Result<bool, PatternEditError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(PatternEditError::EmptyKeyword);
        }
        let list = self.categories.entry(category.to_string()).or_default();
        if list.iter().any(|k| k == keyword) {
            return Ok(false);
        }
        list.push(keyword.to_string());
        Ok(true)
    }

    /// Removes a keyword. A case-scoped category left empty is dropped;
    /// a global category is kept as part of the fixed taxonomy.
    pub fn remove_keyword(
        &mut self,
        category: &str,
        keyword: &str,
        scope: Scope,
    ) -> Result<(), PatternEditError> {
        let list = self
            .categories
            .get_mut(category)
            .ok_or_else(|| PatternEditError::CategoryNotFound(category.to_string()))?;
        let pos = list
            .iter()
            .position(|k| k == keyword)
            .ok_or_else(|| PatternEditError::KeywordNotFound {
                category: category.to_string(),
                keyword: keyword.to_string(),
            })?;
        list.remove(pos);
        if list.is_empty() && scope == Scope::Case {
            self.categories.remove(category);
        }
        Ok(())
    }

    /// Replaces a keyword in place, keeping its position in the list.
    pub fn replace_keyword(
        &mut self,
        category: &str,
        old_keyword: &str,
        new_keyword: &str,
    ) -> Result<(), PatternEditError> {
        let new_keyword = new_keyword.trim();
        if new_keyword.is_empty() {
            return Err(PatternEditError::EmptyKeyword);
        }
        let list = self
            .categories
            .get_mut(category)
            .ok_or_else(|| PatternEditError::CategoryNotFound(category.to_string()))?;
        let pos = list
            .iter()
            .position(|k| k == old_keyword)
            .ok_or_else(|| PatternEditError::KeywordNotFound {
                category: category.to_string(),
                keyword: old_keyword.to_string(),
            })?;
        if new_keyword != old_keyword && list.iter().any(|k| k == new_keyword) {
            return Err(PatternEditError::DuplicateKeyword {
                category: category.to_string(),
                keyword: new_keyword.to_string(),
            });
        }
        list[pos] = new_keyword.to_string();
        Ok(())
    }

    /// Global lists with case keywords appended; the case layer only adds.
    pub fn merged(global: &PatternSet, case: &PatternSet) -> PatternSet {
        let mut merged = global.clone();
        for (category, keywords) in case.iter() {
            let list = merged.categories.entry(category.to_string()).or_default();
            for kw in keywords {
                if !list.contains(kw) {
                    list.push(kw.clone());
                }
            }
        }
        merged
    }
}

pub const DEFAULT_PATTERNS: &[(&str, &[&str])] = &[
    (
        "生活費",
        &[
            "イオン", "セブン", "ローソン", "ファミマ", "スーパー", "マート", "電気", "ガス",
            "水道", "東京電力", "東電", "関西電力", "関電", "NTT", "ドコモ", "DOCOMO",
            "ソフトバンク", "au", "通信", "電話", "NHK", "薬局", "ドラッグ", "病院", "医院",
            "クリニック", "介護", "ガソリン", "ENEOS", "出光", "昭和シェル", "マクドナルド",
            "スターバックス", "スタバ", "コンビニ",
        ],
    ),
    ("給与", &["給与", "給料", "賞与", "ボーナス", "報酬", "振込給与"]),
    ("贈与", &["フリコミ", "振込", "送金"]),
    ("関連会社", &["商事", "物産", "興業", "実業", "有限会社", "株式会社"]),
    ("銀行", &["定期預金", "定期", "積立"]),
    (
        "証券・株式",
        &[
            "証券", "野村", "大和", "SMBC", "みずほ証券", "楽天証券", "SBI", "投資信託",
            "株式", "債券", "ファンド", "配当",
        ],
    ),
    (
        "保険会社",
        &["生命保険", "損保", "保険", "共済", "かんぽ", "日本生命", "第一生命"],
    ),
    (
        "通帳間移動",
        &["振替", "口座振替", "資金移動", "自己口座", "本人口座", "自分宛", "同一名義"],
    ),
    ("その他", &["手数料", "利息", "ATM", "時間外", "引出", "預入"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_contain_special_categories() {
        let set = PatternSet::defaults();
        assert!(set.contains(GIFT_CATEGORY, "振込"));
        assert!(set.contains(OTHER_CATEGORY, "ATM"));
        assert!(set.contains("給与", "給与"));
    }

    #[test]
    fn deserialization_trims_and_dedupes() {
        let set: PatternSet =
            serde_json::from_str(r#"{"給与": ["給与", " 給与 ", "", "賞与"]}"#).unwrap();
        assert_eq!(set.keywords("給与"), ["給与", "賞与"]);
    }

    #[test]
    fn add_is_idempotent() {
        let mut set = PatternSet::new();
        assert_eq!(set.add_keyword("銀行", " 定期 "), Ok(true));
        assert_eq!(set.add_keyword("銀行", "定期"), Ok(false));
        assert_eq!(set.keywords("銀行"), ["定期"]);
        assert_eq!(set.add_keyword("銀行", "   "), Err(PatternEditError::EmptyKeyword));
    }

    #[test]
    fn removing_last_case_keyword_drops_category() {
        let mut set = PatternSet::from_pairs(&[("介護", &["デイサービス"])]);
        set.remove_keyword("介護", "デイサービス", Scope::Case).unwrap();
        assert!(!set.has_category("介護"));
    }

    #[test]
    fn removing_last_global_keyword_keeps_category() {
        let mut set = PatternSet::from_pairs(&[("銀行", &["定期"])]);
        set.remove_keyword("銀行", "定期", Scope::Global).unwrap();
        assert!(set.has_category("銀行"));
        assert!(set.keywords("銀行").is_empty());
    }

    #[test]
    fn remove_reports_missing() {
        let mut set = PatternSet::from_pairs(&[("銀行", &["定期"])]);
        assert!(matches!(
            set.remove_keyword("銀行", "積立", Scope::Global),
            Err(PatternEditError::KeywordNotFound { .. })
        ));
        assert!(matches!(
            set.remove_keyword("給与", "給与", Scope::Global),
            Err(PatternEditError::CategoryNotFound(_))
        ));
    }

    #[test]
    fn replace_keeps_position_and_rejects_duplicates() {
        let mut set = PatternSet::from_pairs(&[("給与", &["給与", "給料", "賞与"])]);
        set.replace_keyword("給与", "給料", "月給").unwrap();
        assert_eq!(set.keywords("給与"), ["給与", "月給", "賞与"]);
        assert!(matches!(
            set.replace_keyword("給与", "月給", "賞与"),
            Err(PatternEditError::DuplicateKeyword { .. })
        ));
        // Renaming to itself is a no-op, not a conflict.
        assert!(set.replace_keyword("給与", "月給", "月給").is_ok());
    }

    #[test]
    fn merge_appends_case_keywords_without_duplicates() {
        let global = PatternSet::from_pairs(&[("給与", &["給与", "賞与"])]);
        let case = PatternSet::from_pairs(&[("給与", &["賞与", "役員報酬"]), ("介護", &["ケア"])]);
        let merged = PatternSet::merged(&global, &case);
        assert_eq!(merged.keywords("給与"), ["給与", "賞与", "役員報酬"]);
        assert_eq!(merged.keywords("介護"), ["ケア"]);
        // Inputs untouched.
        assert_eq!(global.keywords("給与").len(), 2);
    }

    #[test]
    fn from_toml_taxonomy() {
        let set = PatternSet::from_toml(
            r#"
            "給与" = ["給与", "賞与"]
            "その他" = ["ATM"]
            "#,
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(OTHER_CATEGORY, "ATM"));
    }
}
