use picword_cache::Atom;
use picword_core::{RunEvent, RunPhase, SettingsError};
use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StimulusKind {
    Audio,
    Image,
}

impl fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StimulusKind::Audio => "WAV",
            StimulusKind::Image => "image",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("cannot list {kind} stimuli in {}: {source}", dir.display())]
    ListStimuli {
        kind: StimulusKind,
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("there were no {kind} files in {}", dir.display())]
    EmptyStimuli { kind: StimulusKind, dir: PathBuf },

    #[error("need at least one word and one talker, found {words} words and {talkers} talkers")]
    InsufficientStimuli { words: usize, talkers: usize },

    #[error("need at least 3 images to show a target with two distractors, found {found}")]
    InsufficientImages { found: usize },

    #[error("no image for word `{0}`")]
    MissingImage(Atom),

    #[error("cannot read image {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write results to {}: {source}", path.display())]
    ResultsLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("trial {trial} shows images other than the ones chosen for it")]
    TileMismatch { trial: usize },

    #[error("no transition from {from:?} on {event:?}")]
    InvalidTransition { from: RunPhase, event: RunEvent },
}
