use std::collections::{HashMap, VecDeque};

use passbook_core::{
    normalize_text, AnalysisSettings, FuzzyConfig, PatternSet, Scope, GIFT_CATEGORY,
    OTHER_CATEGORY, UNCATEGORIZED,
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::fuzz::Measure;

/// Score at which fuzzy evaluation stops looking at further categories.
pub const FUZZY_EARLY_EXIT: u8 = 95;
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: String,
    /// Confidence 0–100.
    pub score: u8,
}

impl Classification {
    fn new(category: &str, score: u8) -> Self {
        Classification {
            category: category.to_string(),
            score,
        }
    }

    pub fn uncategorized() -> Self {
        Self::new(UNCATEGORIZED, 0)
    }
}

/// A fuzzy candidate offered to a human reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub category: String,
    pub score: u8,
    pub scope: Scope,
}

/// One category with its keywords already folded for matching.
#[derive(Debug, Clone)]
struct CategoryKeywords {
    category: String,
    keywords: Vec<String>,
}

impl CategoryKeywords {
    fn substring_match(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    fn best_score(&self, measure: Measure, text: &str) -> u8 {
        let mut best = 0;
        for kw in &self.keywords {
            best = best.max(measure.score(text, kw));
            if best == 100 {
                break;
            }
        }
        best
    }
}

fn fold_all(keywords: &[String]) -> Vec<String> {
    let mut folded: Vec<String> = Vec::with_capacity(keywords.len());
    for kw in keywords {
        let f = normalize_text(kw);
        if !f.is_empty() && !folded.contains(&f) {
            folded.push(f);
        }
    }
    folded
}

/// Fewest keywords first, then by name for a total order.
fn ordered(mut categories: Vec<CategoryKeywords>) -> Vec<CategoryKeywords> {
    categories.sort_by(|a, b| {
        a.keywords
            .len()
            .cmp(&b.keywords.len())
            .then_with(|| a.category.cmp(&b.category))
    });
    categories
}

fn is_special(category: &str) -> bool {
    category == GIFT_CATEGORY || category == OTHER_CATEGORY
}

/// Pattern layers precomputed for matching, with a fingerprint of everything
/// that can change a classification result.
#[derive(Debug, Clone)]
pub struct PatternSnapshot {
    case: Vec<CategoryKeywords>,
    global: Vec<CategoryKeywords>,
    /// Global keywords minus those the case layer already holds for the same category.
    global_fuzzy: Vec<CategoryKeywords>,
    gift: Vec<String>,
    other: Vec<String>,
    all_case: Vec<CategoryKeywords>,
    all_global: Vec<CategoryKeywords>,
    fingerprint: [u8; 32],
}

impl PatternSnapshot {
    pub fn new(global: &PatternSet, case: &PatternSet, settings: &AnalysisSettings) -> Self {
        let layer = |set: &PatternSet, include_special: bool| -> Vec<CategoryKeywords> {
            set.iter()
                .filter(|(c, _)| include_special || !is_special(c))
                .map(|(c, kws)| CategoryKeywords {
                    category: c.to_string(),
                    keywords: fold_all(kws),
                })
                .filter(|ck| !ck.keywords.is_empty())
                .collect()
        };

        let case_layer = ordered(layer(case, false));
        let global_layer = ordered(layer(global, false));

        let global_fuzzy = ordered(
            global_layer
                .iter()
                .map(|g| {
                    let covered = fold_all(case.keywords(&g.category));
                    CategoryKeywords {
                        category: g.category.clone(),
                        keywords: g
                            .keywords
                            .iter()
                            .filter(|k| !covered.contains(k))
                            .cloned()
                            .collect(),
                    }
                })
                .filter(|ck| !ck.keywords.is_empty())
                .collect(),
        );

        let merged = PatternSet::merged(global, case);

        PatternSnapshot {
            case: case_layer,
            global: global_layer,
            global_fuzzy,
            gift: fold_all(merged.keywords(GIFT_CATEGORY)),
            other: fold_all(merged.keywords(OTHER_CATEGORY)),
            all_case: ordered(layer(case, true)),
            all_global: ordered(layer(global, true)),
            fingerprint: fingerprint(global, case, settings),
        }
    }

    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }
}

fn fingerprint(global: &PatternSet, case: &PatternSet, settings: &AnalysisSettings) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for (tag, set) in [("g", global), ("c", case)] {
        for (category, keywords) in set.iter() {
            hasher.update(tag.as_bytes());
            hasher.update([0u8]);
            hasher.update(category.as_bytes());
            for kw in keywords {
                hasher.update([0u8]);
                hasher.update(kw.as_bytes());
            }
            hasher.update([0xFFu8]);
        }
    }
    hasher.update(settings.gift_threshold.to_le_bytes());
    hasher.update([
        u8::from(settings.fuzzy.enabled),
        settings.fuzzy.threshold,
        u8::from(settings.fuzzy.use_token_set_ratio),
    ]);
    hasher.finalize().into()
}

/// Bounded map that evicts the oldest insertion first.
#[derive(Debug, Clone)]
struct ClassificationCache {
    capacity: usize,
    entries: HashMap<(String, bool), Classification>,
    order: VecDeque<(String, bool)>,
}

impl ClassificationCache {
    fn new(capacity: usize) -> Self {
        ClassificationCache {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &(String, bool)) -> Option<&Classification> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: (String, bool), value: Classification) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Layered keyword/fuzzy classifier with a per-pass result cache.
///
/// Resolution order, first hit wins:
/// 1. case substring, 2. global substring, 3. gift keywords when the
/// withdrawal reaches the gift threshold, 4. fuzzy (case, then global keywords
/// the case layer does not hold), 5. catch-all substring, 6. [`UNCATEGORIZED`].
/// Gift and catch-all keywords only take part in steps 3 and 5.
#[derive(Debug, Clone)]
pub struct Classifier {
    snapshot: PatternSnapshot,
    settings: AnalysisSettings,
    cache: ClassificationCache,
}

impl Classifier {
    pub fn new(global: &PatternSet, case: &PatternSet, settings: &AnalysisSettings) -> Self {
        Self::with_cache_capacity(global, case, settings, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(
        global: &PatternSet,
        case: &PatternSet,
        settings: &AnalysisSettings,
        capacity: usize,
    ) -> Self {
        Classifier {
            snapshot: PatternSnapshot::new(global, case, settings),
            settings: *settings,
            cache: ClassificationCache::new(capacity),
        }
    }

    /// Swaps in new patterns/settings. The cache is dropped when anything that
    /// affects results changed.
    pub fn update(&mut self, global: &PatternSet, case: &PatternSet, settings: &AnalysisSettings) {
        let snapshot = PatternSnapshot::new(global, case, settings);
        if snapshot.fingerprint != self.snapshot.fingerprint {
            tracing::debug!("Pattern configuration changed; clearing classification cache");
            self.cache.clear();
        }
        self.snapshot = snapshot;
        self.settings = *settings;
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn fuzzy_config(&self) -> FuzzyConfig {
        self.settings.fuzzy
    }

    /// Classifies one description. Only `amount_out` influences the result,
    /// through the gift rule.
    pub fn classify(&mut self, description: &str, amount_out: i64) -> Classification {
        let key = (
            description.to_string(),
            amount_out >= self.settings.gift_threshold,
        );
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let result = self.resolve(description, key.1);
        self.cache.insert(key, result.clone());
        result
    }

    fn resolve(&self, description: &str, gift_eligible: bool) -> Classification {
        let text = normalize_text(description);
        let snap = &self.snapshot;

        for ck in snap.case.iter().chain(snap.global.iter()) {
            if ck.substring_match(&text) {
                return Classification::new(&ck.category, 100);
            }
        }

        if gift_eligible && snap.gift.iter().any(|k| text.contains(k.as_str())) {
            return Classification::new(GIFT_CATEGORY, 100);
        }

        let fuzzy = self.settings.fuzzy;
        if fuzzy.enabled {
            if let Some(best) = self.best_fuzzy(&text) {
                if best.score >= fuzzy.threshold {
                    return best;
                }
            }
        }

        if snap.other.iter().any(|k| text.contains(k.as_str())) {
            return Classification::new(OTHER_CATEGORY, 100);
        }

        Classification::uncategorized()
    }

    fn best_fuzzy(&self, text: &str) -> Option<Classification> {
        let measure = Measure::from_token_set_flag(self.settings.fuzzy.use_token_set_ratio);
        let snap = &self.snapshot;
        let mut best: Option<Classification> = None;

        for ck in snap.case.iter().chain(snap.global_fuzzy.iter()) {
            let score = ck.best_score(measure, text);
            if best.as_ref().map_or(score > 0, |b| score > b.score) {
                best = Some(Classification::new(&ck.category, score));
            }
            if score >= FUZZY_EARLY_EXIT {
                break;
            }
        }
        best
    }

    /// Top fuzzy candidates over every category, one entry per category.
    /// A category scored under both scopes keeps its case score.
    pub fn suggestions(&self, description: &str, limit: usize) -> Vec<Suggestion> {
        let text = normalize_text(description);
        let measure = Measure::from_token_set_flag(self.settings.fuzzy.use_token_set_ratio);

        let mut found: Vec<Suggestion> = Vec::new();
        let layers = [
            (Scope::Case, &self.snapshot.all_case),
            (Scope::Global, &self.snapshot.all_global),
        ];
        for (scope, layer) in layers {
            for ck in layer.iter() {
                if found.iter().any(|s| s.category == ck.category) {
                    continue;
                }
                let score = ck.best_score(measure, &text);
                if score > 0 {
                    found.push(Suggestion {
                        category: ck.category.clone(),
                        score,
                        scope,
                    });
                }
            }
        }

        found.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.category.cmp(&b.category)));
        found.truncate(limit);
        found
    }
}
