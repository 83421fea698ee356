use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::analysis::AnalysisSettings;

/// Directory that receives comparison artifacts when no override is given.
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub settings: AnalysisSettings,
}

impl AppConfig {
    /// Resolves the output directory (creating it if missing) and loads optional settings.
    pub fn from_overrides(output_dir: Option<PathBuf>, settings_file: Option<PathBuf>) -> Result<Self> {
        let output_dir = ensure_dir(&output_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)))?;
        let settings = match settings_file {
            Some(path) => load_settings(&path)?,
            None => AnalysisSettings::default(),
        };
        Ok(Self {
            output_dir,
            settings,
        })
    }
}

fn ensure_dir(path: &Path) -> Result<PathBuf> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create output directory at {:?}", path))?;
    let canonical = path
        .canonicalize()
        .with_context(|| format!("failed to resolve output directory at {:?}", path))?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(anyhow!("output path {:?} is not a directory", canonical))
    }
}

/// Reads analysis settings from a JSON file; omitted fields keep their defaults.
pub fn load_settings(path: &Path) -> Result<AnalysisSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {:?}", path))?;
    let settings: AnalysisSettings = serde_json::from_str(&raw)
        .with_context(|| format!("invalid settings in {:?}", path))?;
    settings
        .validate()
        .with_context(|| format!("rejected settings in {:?}", path))?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::{load_settings, AppConfig};
    use crate::analysis::AnalysisSettings;

    #[test]
    fn creates_missing_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested").join("outputs");
        let config = AppConfig::from_overrides(Some(target.clone()), None).unwrap();
        assert!(target.is_dir());
        assert!(config.output_dir.ends_with("outputs"));
        assert_eq!(config.settings, AnalysisSettings::default());
    }

    #[test]
    fn loads_partial_settings_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"energy_threshold": 0.25, "vibrato": {"window_secs": 1.0}}"#)
            .unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.energy_threshold, 0.25);
        assert_eq!(settings.vibrato.window_secs, 1.0);
        assert_eq!(settings.vibrato.band_low_hz, 4.0);
        assert_eq!(settings.weights, AnalysisSettings::default().weights);
    }

    #[test]
    fn rejects_invalid_settings_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"energy_threshold": 4.0}"#).unwrap();
        assert!(load_settings(&path).is_err());
        std::fs::write(&path, "not json").unwrap();
        assert!(load_settings(&path).is_err());
        assert!(load_settings(&tmp.path().join("missing.json")).is_err());
    }
}
