use passbook_core::{SettingsBackend, SettingsError, UserSettings};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct Cached {
    modified: SystemTime,
    settings: UserSettings,
}

/// Last loaded settings document, keyed by the file's modification time.
///
/// Shared between every [`JsonSettingsFile`] that should see the same value.
#[derive(Debug, Default)]
pub struct SettingsCache {
    entry: Mutex<Option<Cached>>,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the next load to read from disk.
    pub fn invalidate(&self) {
        if let Ok(mut entry) = self.entry.lock() {
            *entry = None;
        }
    }

    pub fn is_warm(&self) -> bool {
        self.entry.lock().map(|e| e.is_some()).unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Cached>>, SettingsError> {
        self.entry
            .lock()
            .map_err(|e| SettingsError::Unavailable(e.to_string()))
    }
}

/// Settings document stored as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonSettingsFile {
    path: PathBuf,
    cache: Arc<SettingsCache>,
}

impl JsonSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_cache(path, Arc::new(SettingsCache::new()))
    }

    pub fn with_cache(path: impl Into<PathBuf>, cache: Arc<SettingsCache>) -> Self {
        JsonSettingsFile {
            path: path.into(),
            cache,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache(&self) -> &Arc<SettingsCache> {
        &self.cache
    }

    fn modified(&self) -> Result<Option<SystemTime>, SettingsError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SettingsBackend for JsonSettingsFile {
    fn load(&self) -> Result<UserSettings, SettingsError> {
        let mut entry = self.cache.lock()?;

        let Some(modified) = self.modified()? else {
            tracing::debug!("{} not found; using empty settings", self.path.display());
            *entry = None;
            return Ok(UserSettings::default());
        };

        if let Some(cached) = entry.as_ref() {
            if cached.modified == modified {
                return Ok(cached.settings.clone());
            }
        }

        let content = fs::read_to_string(&self.path)?;
        let settings: UserSettings = serde_json::from_str(&content)?;
        tracing::info!("Loaded settings from {}", self.path.display());
        *entry = Some(Cached {
            modified,
            settings: settings.clone(),
        });
        Ok(settings)
    }

    /// Writes through a sibling temp file and renames it over the target.
    fn save(&self, settings: &UserSettings) -> Result<(), SettingsError> {
        let mut entry = self.cache.lock()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        *entry = self.modified()?.map(|modified| Cached {
            modified,
            settings: settings.clone(),
        });
        tracing::info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passbook_core::PatternSet;
    use std::time::Duration;

    fn settings_with_gift(threshold: i64) -> UserSettings {
        UserSettings {
            gift_threshold: Some(threshold),
            ..Default::default()
        }
    }

    fn bump_mtime(path: &Path) {
        let file = fs::File::options().write(true).open(path).unwrap();
        let later = file.metadata().unwrap().modified().unwrap() + Duration::from_secs(5);
        file.set_modified(later).unwrap();
    }

    // ── load / save ───────────────────────────────────────────────────────────

    #[test]
    fn missing_file_loads_empty_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsFile::new(dir.path().join("settings.json"));
        assert_eq!(store.load().unwrap(), UserSettings::default());
        assert!(!store.cache().is_warm());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsFile::new(dir.path().join("nested/settings.json"));
        let mut settings = settings_with_gift(2_000_000);
        settings.classification_patterns = Some(PatternSet::from_pairs(&[("給与", &["給料"])]));
        store.save(&settings).unwrap();

        assert!(store.cache().is_warm());
        assert_eq!(store.load().unwrap(), settings);
        assert!(!store.temp_path().exists());

        store.cache().invalidate();
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn output_is_pretty_and_keeps_japanese() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = JsonSettingsFile::new(&path);
        let settings = UserSettings {
            classification_patterns: Some(PatternSet::from_pairs(&[("生活費", &["イオン"])])),
            ..Default::default()
        };
        store.save(&settings).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("CLASSIFICATION_PATTERNS"));
        assert!(raw.contains("イオン"));
        assert!(raw.contains('\n'));
    }

    #[test]
    fn unknown_keys_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"THEME": "dark", "GIFT_THRESHOLD": 5}"#).unwrap();

        let store = JsonSettingsFile::new(&path);
        let mut settings = store.load().unwrap();
        assert_eq!(settings.gift_threshold, Some(5));
        settings.gift_threshold = Some(6);
        store.save(&settings).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["THEME"], "dark");
        assert_eq!(raw["GIFT_THRESHOLD"], 6);
    }

    #[test]
    fn malformed_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let err = JsonSettingsFile::new(&path).load().unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    // ── cache ─────────────────────────────────────────────────────────────────

    #[test]
    fn cache_serves_until_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = JsonSettingsFile::new(&path);
        store.save(&settings_with_gift(1)).unwrap();

        // Same mtime: the on-disk edit is not observed.
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        fs::write(&path, r#"{"GIFT_THRESHOLD": 2}"#).unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
        assert_eq!(store.load().unwrap().gift_threshold, Some(1));

        bump_mtime(&path);
        assert_eq!(store.load().unwrap().gift_threshold, Some(2));
    }

    #[test]
    fn shared_cache_sees_saves_from_other_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let cache = Arc::new(SettingsCache::new());
        let a = JsonSettingsFile::with_cache(&path, Arc::clone(&cache));
        let b = JsonSettingsFile::with_cache(&path, cache);

        a.save(&settings_with_gift(7)).unwrap();
        assert_eq!(b.load().unwrap().gift_threshold, Some(7));
    }

    #[test]
    fn deleted_file_drops_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = JsonSettingsFile::new(&path);
        store.save(&settings_with_gift(3)).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(store.load().unwrap(), UserSettings::default());
        assert!(!store.cache().is_warm());
    }
}
