//! Audio and image stimulus inventories for one run.

use crate::error::{EngineError, StimulusKind};
use picword_cache::Atom;
use picword_core::TrialItem;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const AUDIO_EXTENSIONS: &[&str] = &["wav"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Lookup maps from stimulus keys to files.
///
/// Audio keys are `word-talker` stems; image keys are bare words. Files whose
/// stem does not parse as a stimulus key are left out without complaint.
#[derive(Debug, Clone, Default)]
pub struct StimulusCatalog {
    audio: BTreeMap<String, PathBuf>,
    images: BTreeMap<String, PathBuf>,
    items: Vec<TrialItem>,
    words: Vec<Atom>,
    talkers: Vec<Atom>,
}

impl StimulusCatalog {
    /// Lists both folders and builds the catalog.
    ///
    /// Fails with [`EngineError::EmptyStimuli`] when a folder holds no file
    /// with a matching extension.
    pub async fn load(audio_dir: &Path, image_dir: &Path) -> Result<Self, EngineError> {
        info!(dir = %audio_dir.display(), "loading audio stimuli");
        let audio = list_stimuli(audio_dir, AUDIO_EXTENSIONS, StimulusKind::Audio).await?;
        info!(dir = %image_dir.display(), "loading image stimuli");
        let images = list_stimuli(image_dir, IMAGE_EXTENSIONS, StimulusKind::Image).await?;

        let catalog = Self::from_paths(audio, images);
        info!(
            audio = catalog.audio.len(),
            images = catalog.images.len(),
            words = catalog.words.len(),
            talkers = catalog.talkers.len(),
            "stimuli loaded"
        );
        Ok(catalog)
    }

    pub fn from_paths(
        audio: impl IntoIterator<Item = PathBuf>,
        images: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        let mut catalog = Self::default();

        for path in audio {
            let Some(stem) = stimulus_key(&path) else {
                continue;
            };
            if TrialItem::parse_key(stem).is_none() {
                debug!(path = %path.display(), "audio file is not named word-talker, skipped");
                continue;
            }
            catalog.audio.insert(stem.to_string(), path);
        }

        let mut seen_words = HashSet::new();
        let mut seen_talkers = HashSet::new();
        for key in catalog.audio.keys() {
            let Some(item) = TrialItem::parse_key(key) else {
                continue;
            };
            if seen_words.insert(item.word.clone()) {
                catalog.words.push(item.word.clone());
            }
            if seen_talkers.insert(item.talker.clone()) {
                catalog.talkers.push(item.talker.clone());
            }
            catalog.items.push(item);
        }

        for path in images {
            if let Some(stem) = stimulus_key(&path) {
                catalog.images.insert(stem.to_string(), path);
            }
        }

        catalog
    }

    /// One item per audio file, in key order.
    pub fn audio_items(&self) -> &[TrialItem] {
        &self.items
    }

    pub fn audio_path(&self, item: &TrialItem) -> Option<&Path> {
        self.audio.get(&item.audio_key()).map(PathBuf::as_path)
    }

    pub fn image_path(&self, word: &str) -> Option<&Path> {
        self.images.get(word).map(PathBuf::as_path)
    }

    pub fn image_keys(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Distinct words, in first-seen key order.
    pub fn words(&self) -> &[Atom] {
        &self.words
    }

    /// Distinct talkers, in first-seen key order.
    pub fn talkers(&self) -> &[Atom] {
        &self.talkers
    }

    /// Words among `trials` that have no image to show.
    pub fn missing_images(&self, trials: &[TrialItem]) -> Vec<Atom> {
        let mut missing: Vec<Atom> = Vec::new();
        for item in trials {
            if !self.images.contains_key(&*item.word) && !missing.contains(&item.word) {
                missing.push(item.word.clone());
            }
        }
        missing
    }
}

/// File stem used as the stimulus key for `path`.
pub fn stimulus_key(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

async fn list_stimuli(
    dir: &Path,
    extensions: &[&str],
    kind: StimulusKind,
) -> Result<Vec<PathBuf>, EngineError> {
    let list_err = |source| EngineError::ListStimuli {
        kind,
        dir: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(list_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if matches && entry.file_type().await.map_err(list_err)?.is_file() {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(EngineError::EmptyStimuli {
            kind,
            dir: dir.to_path_buf(),
        });
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"stimulus").unwrap();
    }

    #[tokio::test]
    async fn filters_by_extension_and_key_shape() {
        let audio = tempfile::tempdir().unwrap();
        let images = tempfile::tempdir().unwrap();
        for name in ["dog-t2.wav", "cat-t1.wav", "cat-t2.wav", "notes.txt", "badname.wav", "a-b-c.wav"] {
            touch(audio.path(), name);
        }
        for name in ["cat.png", "dog.jpg", "bird.jpeg", "readme.md", "fish.gif"] {
            touch(images.path(), name);
        }
        fs::create_dir(images.path().join("nested.png")).unwrap();

        let catalog = StimulusCatalog::load(audio.path(), images.path())
            .await
            .unwrap();

        let keys: Vec<String> = catalog
            .audio_items()
            .iter()
            .map(TrialItem::audio_key)
            .collect();
        assert_eq!(keys, ["cat-t1", "cat-t2", "dog-t2"]);
        assert_eq!(catalog.words(), [Atom::from("cat"), Atom::from("dog")]);
        assert_eq!(catalog.talkers(), [Atom::from("t1"), Atom::from("t2")]);
        assert_eq!(
            catalog.image_keys().collect::<Vec<_>>(),
            ["bird", "cat", "dog"]
        );
        assert_eq!(
            catalog.audio_path(&TrialItem::new("cat", "t2")),
            Some(audio.path().join("cat-t2.wav").as_path())
        );
        assert_eq!(catalog.audio_path(&TrialItem::new("dog", "t1")), None);
    }

    #[tokio::test]
    async fn empty_audio_folder_is_an_error() {
        let audio = tempfile::tempdir().unwrap();
        let images = tempfile::tempdir().unwrap();
        touch(audio.path(), "cat-t1.mp3");
        touch(images.path(), "cat.png");

        let err = StimulusCatalog::load(audio.path(), images.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::EmptyStimuli {
                kind: StimulusKind::Audio,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_image_folder_is_an_error() {
        let audio = tempfile::tempdir().unwrap();
        let images = tempfile::tempdir().unwrap();
        touch(audio.path(), "cat-t1.wav");

        let err = StimulusCatalog::load(audio.path(), images.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::EmptyStimuli {
                kind: StimulusKind::Image,
                ..
            }
        ));
    }

    #[test]
    fn reports_words_without_images() {
        let catalog = StimulusCatalog::from_paths(
            [PathBuf::from("/a/cat-t1.wav"), PathBuf::from("/a/owl-t1.wav")],
            [PathBuf::from("/i/cat.png")],
        );
        let trials = catalog.audio_items().to_vec();
        assert_eq!(catalog.missing_images(&trials), [Atom::from("owl")]);
    }
}
