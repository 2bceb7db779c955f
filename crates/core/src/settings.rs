use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

use super::pattern::PatternSet;

pub const DEFAULT_LARGE_AMOUNT_THRESHOLD: i64 = 500_000;
pub const DEFAULT_TRANSFER_AMOUNT_TOLERANCE: i64 = 1_000;
pub const DEFAULT_TRANSFER_DAYS_WINDOW: i64 = 3;
pub const MAX_TRANSFER_DAYS_WINDOW: i64 = 30;
pub const DEFAULT_GIFT_THRESHOLD: i64 = 1_000_000;
pub const DEFAULT_FUZZY_THRESHOLD: u8 = 90;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator for the global settings document.
///
/// `load` after `save` with no external modification returns the saved value.
pub trait SettingsBackend {
    fn load(&self) -> Result<UserSettings, SettingsError>;
    fn save(&self, settings: &UserSettings) -> Result<(), SettingsError>;
}

/// Fuzzy-matching knobs as stored; absent fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_token_set_ratio: Option<bool>,
}

/// The persisted settings document. Unknown keys survive a load/save cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(
        rename = "CLASSIFICATION_PATTERNS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub classification_patterns: Option<PatternSet>,
    #[serde(
        rename = "LARGE_AMOUNT_THRESHOLD",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub large_amount_threshold: Option<i64>,
    #[serde(
        rename = "TRANSFER_AMOUNT_TOLERANCE",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transfer_amount_tolerance: Option<i64>,
    #[serde(
        rename = "TRANSFER_DAYS_WINDOW",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transfer_days_window: Option<i64>,
    #[serde(rename = "GIFT_THRESHOLD", default, skip_serializing_if = "Option::is_none")]
    pub gift_threshold: Option<i64>,
    #[serde(rename = "FUZZY_MATCHING", default, skip_serializing_if = "Option::is_none")]
    pub fuzzy_matching: Option<FuzzySettings>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserSettings {
    /// Stored global patterns, or the built-in taxonomy when none were saved.
    pub fn global_patterns(&self) -> PatternSet {
        self.classification_patterns
            .clone()
            .unwrap_or_else(PatternSet::defaults)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyConfig {
    pub enabled: bool,
    /// Minimum similarity (0–100) for a fuzzy match to count.
    pub threshold: u8,
    /// Token-set ratio when true, partial ratio otherwise.
    pub use_token_set_ratio: bool,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        FuzzyConfig {
            enabled: true,
            threshold: DEFAULT_FUZZY_THRESHOLD,
            use_token_set_ratio: true,
        }
    }
}

/// Effective, validated configuration consumed by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub large_amount_threshold: i64,
    pub transfer_amount_tolerance: i64,
    pub transfer_days_window: i64,
    pub gift_threshold: i64,
    pub fuzzy: FuzzyConfig,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            large_amount_threshold: DEFAULT_LARGE_AMOUNT_THRESHOLD,
            transfer_amount_tolerance: DEFAULT_TRANSFER_AMOUNT_TOLERANCE,
            transfer_days_window: DEFAULT_TRANSFER_DAYS_WINDOW,
            gift_threshold: DEFAULT_GIFT_THRESHOLD,
            fuzzy: FuzzyConfig::default(),
        }
    }
}

impl AnalysisSettings {
    pub fn from_user_settings(user: &UserSettings) -> Self {
        let fuzzy_raw = user.fuzzy_matching.clone().unwrap_or_default();
        let fuzzy_default = FuzzyConfig::default();
        let fuzzy = FuzzyConfig {
            enabled: fuzzy_raw.enabled.unwrap_or(fuzzy_default.enabled),
            threshold: fuzzy_raw
                .threshold
                .map(|t| t.clamp(0, 100) as u8)
                .unwrap_or(fuzzy_default.threshold),
            use_token_set_ratio: fuzzy_raw
                .use_token_set_ratio
                .unwrap_or(fuzzy_default.use_token_set_ratio),
        };

        let window = non_negative(
            "TRANSFER_DAYS_WINDOW",
            user.transfer_days_window,
            DEFAULT_TRANSFER_DAYS_WINDOW,
        );
        if window > MAX_TRANSFER_DAYS_WINDOW {
            tracing::warn!(
                "TRANSFER_DAYS_WINDOW {window} exceeds {MAX_TRANSFER_DAYS_WINDOW}; clamping"
            );
        }

        AnalysisSettings {
            large_amount_threshold: non_negative(
                "LARGE_AMOUNT_THRESHOLD",
                user.large_amount_threshold,
                DEFAULT_LARGE_AMOUNT_THRESHOLD,
            ),
            transfer_amount_tolerance: non_negative(
                "TRANSFER_AMOUNT_TOLERANCE",
                user.transfer_amount_tolerance,
                DEFAULT_TRANSFER_AMOUNT_TOLERANCE,
            ),
            transfer_days_window: window.min(MAX_TRANSFER_DAYS_WINDOW),
            gift_threshold: non_negative("GIFT_THRESHOLD", user.gift_threshold, DEFAULT_GIFT_THRESHOLD),
            fuzzy,
        }
    }
}

fn non_negative(key: &str, value: Option<i64>, default: i64) -> i64 {
    match value {
        Some(v) if v < 0 => {
            tracing::warn!("{key} is negative ({v}); using default {default}");
            default
        }
        Some(v) => v,
        None => default,
    }
}

/// In-process settings backend.
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: Mutex<UserSettings>,
}

impl MemorySettings {
    pub fn new(settings: UserSettings) -> Self {
        MemorySettings {
            inner: Mutex::new(settings),
        }
    }
}

impl SettingsBackend for MemorySettings {
    fn load(&self) -> Result<UserSettings, SettingsError> {
        self.inner
            .lock()
            .map(|s| s.clone())
            .map_err(|e| SettingsError::Unavailable(e.to_string()))
    }

    fn save(&self, settings: &UserSettings) -> Result<(), SettingsError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| SettingsError::Unavailable(e.to_string()))?;
        *guard = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_resolve_to_defaults() {
        let resolved = AnalysisSettings::from_user_settings(&UserSettings::default());
        assert_eq!(resolved, AnalysisSettings::default());
    }

    #[test]
    fn negative_values_fall_back_to_defaults() {
        let user = UserSettings {
            large_amount_threshold: Some(-1),
            transfer_amount_tolerance: Some(-5),
            transfer_days_window: Some(-3),
            gift_threshold: Some(-100),
            ..Default::default()
        };
        assert_eq!(
            AnalysisSettings::from_user_settings(&user),
            AnalysisSettings::default()
        );
    }

    #[test]
    fn window_is_clamped_and_threshold_bounded() {
        let user = UserSettings {
            transfer_days_window: Some(90),
            fuzzy_matching: Some(FuzzySettings {
                enabled: Some(false),
                threshold: Some(250),
                use_token_set_ratio: None,
            }),
            ..Default::default()
        };
        let resolved = AnalysisSettings::from_user_settings(&user);
        assert_eq!(resolved.transfer_days_window, 30);
        assert!(!resolved.fuzzy.enabled);
        assert_eq!(resolved.fuzzy.threshold, 100);
        assert!(resolved.fuzzy.use_token_set_ratio);
    }

    #[test]
    fn settings_document_uses_upper_case_keys_and_keeps_unknown_ones() {
        let json = r#"{
            "GIFT_THRESHOLD": 2000000,
            "FUZZY_MATCHING": {"enabled": true, "threshold": 85},
            "CLASSIFICATION_PATTERNS": {"給与": ["給与"]},
            "THEME": "dark"
        }"#;
        let user: UserSettings = serde_json::from_str(json).unwrap();
        assert_eq!(user.gift_threshold, Some(2_000_000));
        assert_eq!(user.global_patterns().keywords("給与"), ["給与"]);
        assert_eq!(user.extra["THEME"], "dark");

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["THEME"], "dark");
        assert_eq!(back["FUZZY_MATCHING"]["threshold"], 85);
        assert!(back.get("TRANSFER_DAYS_WINDOW").is_none());
    }

    #[test]
    fn missing_patterns_fall_back_to_taxonomy() {
        assert_eq!(UserSettings::default().global_patterns(), PatternSet::defaults());
    }

    #[test]
    fn memory_backend_round_trip() {
        let backend = MemorySettings::default();
        let user = UserSettings {
            gift_threshold: Some(5),
            ..Default::default()
        };
        backend.save(&user).unwrap();
        assert_eq!(backend.load().unwrap(), user);
    }
}
