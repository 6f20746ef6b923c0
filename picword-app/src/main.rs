mod app;
mod audio;
mod engine;
mod prompts;

use ab_glyph::FontVec;
use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use picword_core::Settings;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE: &str = "picword.log";

/// Picture-word matching experiment: hear a word, pick its picture.
#[derive(Debug, Parser)]
#[command(name = "picword", version, about)]
struct Cli {
    /// Settings file as saved by the settings screen (JSON)
    #[arg(long, short)]
    settings: Option<PathBuf>,

    /// Font for prompt text (TrueType or OpenType)
    #[arg(long)]
    font: Option<PathBuf>,

    /// Folder of `<word>-<talker>.wav` recordings
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Folder of `<word>.<jpg|jpeg|png>` pictures
    #[arg(long)]
    images: Option<PathBuf>,

    /// Folder receiving one results folder per participant
    #[arg(long)]
    responses: Option<PathBuf>,

    #[arg(long)]
    block_size: Option<u32>,

    #[arg(long)]
    repetitions: Option<u32>,

    /// Deal each word to one talker per repetition
    #[arg(long)]
    stratified: bool,

    /// Keys that end the run, joined by `|`
    #[arg(long)]
    escape_combo: Option<String>,

    /// Append logs here instead of `picword.log` in the responses folder
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Run in a window instead of fullscreen
    #[arg(long)]
    windowed: bool,
}

impl Cli {
    /// Settings file (or defaults) with command-line overrides, clamped and
    /// checked against the filesystem.
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.settings {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading settings {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing settings {}", path.display()))?
            }
            None => Settings::default(),
        };

        if let Some(audio) = &self.audio {
            settings.stimuli_path_audio = Some(audio.clone());
        }
        if let Some(images) = &self.images {
            settings.stimuli_path_image = Some(images.clone());
        }
        if let Some(responses) = &self.responses {
            settings.responses_path = Some(responses.clone());
        }
        if let Some(block_size) = self.block_size {
            settings.block_size = block_size;
        }
        if let Some(repetitions) = self.repetitions {
            settings.repetitions = repetitions;
        }
        if self.stratified {
            settings.stratified_sampling = true;
        }
        if let Some(combo) = &self.escape_combo {
            settings.escape_combo = combo.clone();
        }

        let settings = settings.clamped();
        settings.validate()?;
        Ok(settings)
    }
}

fn init_tracing(log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let opened = log_file.map(|path| {
        let file = OpenOptions::new().create(true).append(true).open(path);
        (path, file)
    });
    match opened {
        Some((path, Ok(file))) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .init();
            info!(path = %path.display(), "logging initialized");
        }
        Some((path, Err(err))) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(env_filter)
                .init();
            warn!(path = %path.display(), %err, "cannot open log file, logging to stderr");
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(env_filter)
                .init();
        }
    }
}

fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontVec::try_from_vec(bytes).with_context(|| format!("{} is not a usable font", path.display()))
}

/// Log destination: `--log-file`, else next to the participant folders.
fn log_path(cli: &Cli, settings: &Settings) -> Option<PathBuf> {
    cli.log_file.clone().or_else(|| {
        settings
            .responses_path
            .as_ref()
            .map(|responses| responses.join(LOG_FILE))
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    init_tracing(log_path(&cli, &settings).as_deref());
    info!(?settings, "settings loaded");
    let font = match &cli.font {
        Some(path) => Some(load_font(path)?),
        None => {
            warn!("no --font given, prompts will show without text");
            None
        }
    };

    App::new(font, !cli.windowed).run(settings)
}
