use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::settings::Settings;

pub const APP_DIR: &str = "survival_narrator";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path.push(SETTINGS_FILE);
    path
}

/// Load settings from the user config dir, then apply environment overrides.
pub fn load_settings() -> Settings {
    let mut settings = load_settings_from(&settings_path());
    settings.apply_env(|var| std::env::var(var).ok());
    settings
}

/// A missing or unreadable file yields defaults.
pub fn load_settings_from(path: &Path) -> Settings {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(target: "survival_narrator", "no settings at {}: {}", path.display(), e);
            return Settings::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(
                target: "survival_narrator",
                "ignoring invalid settings file {}: {}",
                path.display(),
                e
            );
            Settings::default()
        }
    }
}

pub fn save_settings(settings: &Settings) -> Result<PathBuf, SettingsError> {
    let path = settings_path();
    save_settings_to(settings, &path)?;
    Ok(path)
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    let json = serde_json::to_string_pretty(settings)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| SettingsError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, json).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let settings = Settings {
            api_key: "sk-test".into(),
            model: "local-model".into(),
            ..Settings::default()
        };
        save_settings_to(&settings, &path).unwrap();
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn missing_or_invalid_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        assert_eq!(load_settings_from(&path), Settings::default());

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings_from(&path), Settings::default());
    }
}
