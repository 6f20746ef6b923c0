//! Run settings as persisted by the settings screen.
//!
//! The engine treats a [`Settings`] value as read-only input for one run.
//! Persistence lives with the front end; this module only knows the shape,
//! the defaults, the numeric ranges and a filesystem sanity check.

use serde::{Deserialize, Deserializer, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Joins key names inside an escape combo.
pub const COMBO_DELIMITER: char = '|';

/// Placeholder older settings files store for an unset folder.
const NOT_SET: &str = "Not set!";

pub const BLOCK_SIZE_RANGE: RangeInclusive<u32> = 1..=100;
pub const REPETITIONS_RANGE: RangeInclusive<u32> = 1..=10;
pub const RESPONSE_LENGTH_RANGE: RangeInclusive<u32> = 1..=10;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("{0} folder not set")]
    Unset(&'static str),
    #[error("{name} folder {} does not exist", path.display())]
    Missing { name: &'static str, path: PathBuf },
    #[error("{name} folder {} is not a directory", path.display())]
    NotADirectory { name: &'static str, path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(deserialize_with = "folder")]
    pub stimuli_path_audio: Option<PathBuf>,
    #[serde(deserialize_with = "folder")]
    pub stimuli_path_image: Option<PathBuf>,
    #[serde(deserialize_with = "folder")]
    pub responses_path: Option<PathBuf>,
    pub block_size: u32,
    pub repetitions: u32,
    /// Seconds. Carried for the front end; the engine does not time out
    /// responses.
    pub response_length: u32,
    pub stratified_sampling: bool,
    pub escape_combo: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stimuli_path_audio: None,
            stimuli_path_image: None,
            responses_path: None,
            block_size: 10,
            repetitions: 3,
            response_length: 5,
            stratified_sampling: false,
            escape_combo: "Escape|Escape|Escape".to_string(),
        }
    }
}

impl Settings {
    /// Forces the numeric fields into their allowed ranges.
    pub fn clamped(mut self) -> Self {
        self.block_size = clamp(self.block_size, &BLOCK_SIZE_RANGE);
        self.repetitions = clamp(self.repetitions, &REPETITIONS_RANGE);
        self.response_length = clamp(self.response_length, &RESPONSE_LENGTH_RANGE);
        self
    }

    /// Checks that every folder is set and exists.
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_folder("audio stimuli", self.stimuli_path_audio.as_deref())?;
        check_folder("image stimuli", self.stimuli_path_image.as_deref())?;
        check_folder("responses", self.responses_path.as_deref())?;
        Ok(())
    }
}

fn clamp(value: u32, range: &RangeInclusive<u32>) -> u32 {
    value.clamp(*range.start(), *range.end())
}

fn check_folder(name: &'static str, path: Option<&Path>) -> Result<(), SettingsError> {
    let path = path.ok_or(SettingsError::Unset(name))?;
    if !path.exists() {
        return Err(SettingsError::Missing {
            name,
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(SettingsError::NotADirectory {
            name,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn folder<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.is_empty() && s != NOT_SET)
        .map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_camel_case_keys_with_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "stimuliPathAudio": "/data/audio",
                "stimuliPathImage": "Not set!",
                "blockSize": 4,
                "stratifiedSampling": true
            }"#,
        )
        .unwrap();
        assert_eq!(settings.stimuli_path_audio, Some(PathBuf::from("/data/audio")));
        assert_eq!(settings.stimuli_path_image, None);
        assert_eq!(settings.responses_path, None);
        assert_eq!(settings.block_size, 4);
        assert_eq!(settings.repetitions, 3);
        assert!(settings.stratified_sampling);
        assert_eq!(settings.escape_combo, "Escape|Escape|Escape");
    }

    #[test]
    fn clamps_numeric_ranges() {
        let settings = Settings {
            block_size: 0,
            repetitions: 50,
            response_length: 60,
            ..Settings::default()
        }
        .clamped();
        assert_eq!(settings.block_size, 1);
        assert_eq!(settings.repetitions, 10);
        assert_eq!(settings.response_length, 10);
    }

    #[test]
    fn validation_reports_the_first_bad_folder() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        let mut settings = Settings::default();
        assert_eq!(
            settings.validate(),
            Err(SettingsError::Unset("audio stimuli"))
        );

        settings.stimuli_path_audio = Some(dir.path().to_path_buf());
        settings.stimuli_path_image = Some(dir.path().join("missing"));
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Missing { name: "image stimuli", .. })
        ));

        settings.stimuli_path_image = Some(dir.path().to_path_buf());
        settings.responses_path = Some(file);
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::NotADirectory { name: "responses", .. })
        ));

        settings.responses_path = Some(dir.path().to_path_buf());
        assert_eq!(settings.validate(), Ok(()));
    }
}
