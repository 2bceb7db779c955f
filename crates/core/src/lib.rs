pub mod account;
pub mod pattern;
pub mod row;
pub mod settings;
pub mod text;

pub use account::{AccountField, StatementMetadata};
pub use pattern::{PatternEditError, PatternSet, Scope, DEFAULT_PATTERNS, GIFT_CATEGORY, OTHER_CATEGORY};
pub use row::{
    is_large_amount, AnnotatedRow, ClassifiedRow, NormalizedRow, TransferRef, ValidatedRow,
    UNCATEGORIZED,
};
pub use settings::{
    AnalysisSettings, FuzzyConfig, FuzzySettings, MemorySettings, SettingsBackend, SettingsError,
    UserSettings,
};
pub use text::normalize_text;
