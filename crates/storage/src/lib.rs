pub mod settings_file;

pub use settings_file::{JsonSettingsFile, SettingsCache};
