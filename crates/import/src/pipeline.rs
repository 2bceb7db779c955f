use passbook_core::{
    is_large_amount, AnalysisSettings, AnnotatedRow, ClassifiedRow, NormalizedRow, PatternSet,
    SettingsBackend, StatementMetadata, ValidatedRow, UNCATEGORIZED,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::balance::validate_balances;
use crate::classifier::{Classification, Classifier};
use crate::error::Result;
use crate::normalize::{self, NormalizedStatement};
use crate::patterns::{PatternError, PatternStore};
use crate::table::read_statement;
use crate::transfer::{MatchableRow, RowKey, TransferAnnotation, TransferMatcher};

/// Minimum suggestion score for bulk apply unless the caller says otherwise.
pub const DEFAULT_APPLY_MIN_SCORE: u8 = 95;

/// A category change for an already classified row, by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reclassification {
    pub index: usize,
    pub category: String,
    pub score: u8,
}

/// Everything one import produces, ready for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub rows: Vec<AnnotatedRow>,
    /// Fresh transfer annotations for the persisted rows passed in, by id.
    pub existing_transfers: Vec<(i64, TransferAnnotation)>,
    pub metadata: StatementMetadata,
    pub source: String,
}

impl ImportOutcome {
    pub fn balance_errors(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.classified.validated.is_balance_error)
            .count()
    }
}

/// Sequences raw bytes (or pre-structured records) through normalization,
/// balance validation, classification and transfer annotation.
pub struct ImportPipeline {
    settings: AnalysisSettings,
    classifier: Classifier,
}

impl ImportPipeline {
    pub fn new(global: &PatternSet, case: &PatternSet, settings: AnalysisSettings) -> Self {
        ImportPipeline {
            classifier: Classifier::new(global, case, &settings),
            settings,
        }
    }

    /// Builds a pipeline from the persisted settings document.
    pub fn from_store<B: SettingsBackend>(
        store: &PatternStore<B>,
        case: &PatternSet,
    ) -> std::result::Result<Self, PatternError> {
        let user = store.backend().load()?;
        let settings = AnalysisSettings::from_user_settings(&user);
        Ok(Self::new(&user.global_patterns(), case, settings))
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Call after any pattern edit; the classification cache is dropped if
    /// the effective configuration changed.
    pub fn update_patterns(&mut self, global: &PatternSet, case: &PatternSet) {
        self.classifier.update(global, case, &self.settings);
    }

    pub fn clear_cache(&mut self) {
        self.classifier.clear_cache();
    }

    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<NormalizedStatement> {
        normalize::normalize_table(&read_statement(bytes)?)
    }

    pub fn normalize_records(&self, records: &[Map<String, Value>]) -> Result<NormalizedStatement> {
        normalize::normalize_records(records)
    }

    pub fn validate(&self, rows: Vec<NormalizedRow>) -> Vec<ValidatedRow> {
        validate_balances(rows)
    }

    pub fn classify(&mut self, rows: Vec<ValidatedRow>) -> Vec<ClassifiedRow> {
        let classified: Vec<ClassifiedRow> = rows
            .into_iter()
            .map(|validated| {
                let Classification { category, score } = self
                    .classifier
                    .classify(&validated.row.description, validated.row.amount_out);
                ClassifiedRow {
                    validated,
                    category,
                    classification_score: score,
                }
            })
            .collect();
        let uncategorized = classified.iter().filter(|r| r.is_uncategorized()).count();
        tracing::info!(
            "Classified {} rows ({uncategorized} uncategorized)",
            classified.len()
        );
        classified
    }

    /// Runs the transfer matcher over the persisted rows plus this batch.
    pub fn annotate(
        &self,
        rows: Vec<ClassifiedRow>,
        existing: &[MatchableRow],
    ) -> (Vec<AnnotatedRow>, Vec<(i64, TransferAnnotation)>) {
        let mut pool: Vec<MatchableRow> = existing.to_vec();
        pool.extend(
            rows.iter()
                .enumerate()
                .map(|(i, r)| MatchableRow::from_row(RowKey::Incoming(i), r.row())),
        );

        let annotations = self.match_transfers(&pool);
        let mut incoming = vec![TransferAnnotation::default(); rows.len()];
        let mut persisted = Vec::new();
        for (m, ann) in pool.iter().zip(annotations) {
            match m.key {
                RowKey::Incoming(i) => incoming[i] = ann,
                RowKey::Existing(id) => persisted.push((id, ann)),
            }
        }

        let threshold = self.settings.large_amount_threshold;
        let annotated = rows
            .into_iter()
            .zip(incoming)
            .map(|(classified, ann)| {
                let row = classified.row();
                let is_large = is_large_amount(row.amount_out, row.amount_in, threshold);
                AnnotatedRow {
                    classified,
                    is_transfer: ann.is_transfer,
                    transfer_to: ann.transfer_to,
                    is_large,
                }
            })
            .collect();
        (annotated, persisted)
    }

    /// Transfer annotations for a whole case's rows, aligned with the input.
    pub fn match_transfers(&self, rows: &[MatchableRow]) -> Vec<TransferAnnotation> {
        let annotations = TransferMatcher::from_settings(&self.settings).annotate(rows);
        let paired = annotations.iter().filter(|a| a.is_transfer).count() / 2;
        tracing::info!("Found {paired} transfer pairs across {} rows", rows.len());
        annotations
    }

    /// Full import of one statement file.
    pub fn import_statement(
        &mut self,
        bytes: &[u8],
        existing: &[MatchableRow],
    ) -> Result<ImportOutcome> {
        let statement = self.normalize_bytes(bytes)?;
        Ok(self.finish(statement, existing))
    }

    /// Full import of pre-structured records.
    pub fn import_records(
        &mut self,
        records: &[Map<String, Value>],
        existing: &[MatchableRow],
    ) -> Result<ImportOutcome> {
        let statement = self.normalize_records(records)?;
        Ok(self.finish(statement, existing))
    }

    fn finish(&mut self, statement: NormalizedStatement, existing: &[MatchableRow]) -> ImportOutcome {
        let NormalizedStatement {
            rows,
            metadata,
            source,
        } = statement;

        // 1. Running-balance check (sorts by date).
        let validated = self.validate(rows);

        // 2. Categories.
        let classified = self.classify(validated);

        // 3. Transfers over persisted + incoming rows, and the large-amount flag.
        let (rows, existing_transfers) = self.annotate(classified, existing);

        let outcome = ImportOutcome {
            rows,
            existing_transfers,
            metadata,
            source,
        };
        tracing::info!(
            "Import ready: {} rows, {} balance errors",
            outcome.rows.len(),
            outcome.balance_errors()
        );
        outcome
    }

    /// Re-runs classification for rows still at the sentinel category and
    /// returns the ones that now resolve.
    pub fn reclassify<T: AsRef<ClassifiedRow>>(&mut self, rows: &[T]) -> Vec<Reclassification> {
        let updates: Vec<Reclassification> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.as_ref().is_uncategorized())
            .filter_map(|(index, r)| {
                let row = r.as_ref().row();
                let c = self.classifier.classify(&row.description, row.amount_out);
                (c.category != UNCATEGORIZED).then_some(Reclassification {
                    index,
                    category: c.category,
                    score: c.score,
                })
            })
            .collect();
        tracing::info!("Reclassified {} rows", updates.len());
        updates
    }

    /// Assigns the best fuzzy suggestion to sentinel rows when it scores at
    /// least `min_score`.
    pub fn apply_suggestions<T: AsRef<ClassifiedRow>>(
        &self,
        rows: &[T],
        min_score: u8,
    ) -> Vec<Reclassification> {
        rows.iter()
            .enumerate()
            .filter(|(_, r)| r.as_ref().is_uncategorized())
            .filter_map(|(index, r)| {
                let top = self
                    .classifier
                    .suggestions(&r.as_ref().row().description, 1)
                    .into_iter()
                    .next()?;
                (top.score >= min_score).then_some(Reclassification {
                    index,
                    category: top.category,
                    score: top.score,
                })
            })
            .collect()
    }
}
