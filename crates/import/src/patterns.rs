use passbook_core::{PatternEditError, PatternSet, Scope, SettingsBackend, SettingsError, UserSettings};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error(transparent)]
    Edit(#[from] PatternEditError),
    #[error("Failed to persist global patterns: {0}")]
    Store(#[from] SettingsError),
}

pub type Result<T> = std::result::Result<T, PatternError>;

/// Keyword CRUD over the two pattern layers.
///
/// The global layer lives in the settings document behind `B`; the case layer
/// belongs to the caller's case record and is edited in place.
pub struct PatternStore<B: SettingsBackend> {
    backend: B,
}

impl<B: SettingsBackend> PatternStore<B> {
    pub fn new(backend: B) -> Self {
        PatternStore { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn global(&self) -> Result<PatternSet> {
        Ok(self.backend.load()?.global_patterns())
    }

    /// Global lists with the case keywords appended, for read-only consumers.
    pub fn merged(&self, case: &PatternSet) -> Result<PatternSet> {
        Ok(PatternSet::merged(&self.global()?, case))
    }

    /// Returns `Ok(false)` when the keyword was already present.
    pub fn add_keyword(
        &self,
        case: &mut PatternSet,
        scope: Scope,
        category: &str,
        keyword: &str,
    ) -> Result<bool> {
        match scope {
            Scope::Case => Ok(case.add_keyword(category, keyword)?),
            Scope::Global => self.edit_global(|set| set.add_keyword(category, keyword)),
        }
    }

    pub fn delete_keyword(
        &self,
        case: &mut PatternSet,
        scope: Scope,
        category: &str,
        keyword: &str,
    ) -> Result<()> {
        match scope {
            Scope::Case => Ok(case.remove_keyword(category, keyword, Scope::Case)?),
            Scope::Global => {
                self.edit_global(|set| set.remove_keyword(category, keyword, Scope::Global))
            }
        }
    }

    pub fn update_keyword(
        &self,
        case: &mut PatternSet,
        scope: Scope,
        category: &str,
        old_keyword: &str,
        new_keyword: &str,
    ) -> Result<()> {
        match scope {
            Scope::Case => Ok(case.replace_keyword(category, old_keyword, new_keyword)?),
            Scope::Global => {
                self.edit_global(|set| set.replace_keyword(category, old_keyword, new_keyword))
            }
        }
    }

    /// Moves a keyword from `from` to the other scope.
    ///
    /// Delete-then-add, but if the add fails the source layer is restored, so
    /// the keyword is never lost from both scopes.
    pub fn move_keyword(
        &self,
        case: &mut PatternSet,
        from: Scope,
        category: &str,
        keyword: &str,
    ) -> Result<()> {
        match from {
            Scope::Case => {
                let before = case.clone();
                case.remove_keyword(category, keyword, Scope::Case)?;
                if let Err(e) = self.edit_global(|set| set.add_keyword(category, keyword)) {
                    tracing::warn!("Move of '{keyword}' to global failed; restoring case layer");
                    *case = before;
                    return Err(e);
                }
            }
            Scope::Global => {
                let before = self.backend.load()?;
                self.edit_global(|set| set.remove_keyword(category, keyword, Scope::Global))?;
                if let Err(e) = case.add_keyword(category, keyword) {
                    tracing::warn!("Move of '{keyword}' to case failed; restoring global layer");
                    self.backend.save(&before)?;
                    return Err(e.into());
                }
            }
        }
        tracing::info!("Moved '{keyword}' ({category}) out of {from} scope");
        Ok(())
    }

    /// Load, mutate, save. Nothing is written when the edit fails.
    fn edit_global<T, F>(&self, edit: F) -> Result<T>
    where
        F: FnOnce(&mut PatternSet) -> std::result::Result<T, PatternEditError>,
    {
        let mut settings: UserSettings = self.backend.load()?;
        let mut patterns = settings.global_patterns();
        let out = edit(&mut patterns)?;
        settings.classification_patterns = Some(patterns);
        self.backend.save(&settings)?;
        Ok(out)
    }
}
