pub mod amount;
pub mod balance;
pub mod classifier;
pub mod columns;
pub mod duplicates;
pub mod era;
pub mod error;
pub(crate) mod fuzz;
pub mod normalize;
pub mod patterns;
pub mod pipeline;
pub mod table;
pub mod transfer;

pub use balance::validate_balances;
pub use classifier::{Classification, Classifier, Suggestion};
pub use columns::{ColumnMap, Field};
pub use duplicates::find_duplicate_groups;
pub use error::{ErrorKind, ErrorReport, ImportError};
pub use normalize::{normalize_records, normalize_table, NormalizedStatement};
pub use patterns::{PatternError, PatternStore};
pub use pipeline::{ImportOutcome, ImportPipeline, Reclassification, DEFAULT_APPLY_MIN_SCORE};
pub use table::{read_statement, Cell, RawRow, RawTable};
pub use transfer::{
    transfer_pairs, MatchableRow, RowKey, TransferAnnotation, TransferMatch, TransferMatcher,
    TransferPair,
};
