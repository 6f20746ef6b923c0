pub mod abort;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod results;
pub mod sampling;
pub mod state;
pub mod tiles;
pub mod trial;
pub use abort::AbortWatcher;
pub use catalog::StimulusCatalog;
pub use collaborators::{
    AudioError, AudioPlayer, DialogHost, Prompt, PromptHandle, PromptKind, RunInput,
};
pub use config::ExperimentConfig;
pub use error::{EngineError, StimulusKind};
pub use results::ResultsLog;
pub use sampling::{SamplingMode, TrialSetBuilder};
pub use state::{RunOutcome, RunReport, TrialScheduler};
pub use tiles::{EncodedImage, Tile, TileAnimator, TileBoard};
pub use trial::Trial;
