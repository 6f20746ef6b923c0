//! Interfaces to the audio backend, the prompt host and the participant's
//! input devices.

use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("audio output unavailable: {0}")]
    Output(String),
}

pub trait AudioPlayer {
    /// Loads a WAV file, replacing whatever was loaded before.
    fn load_wav(&mut self, path: &Path) -> impl Future<Output = Result<(), AudioError>>;
    fn play(&mut self);
    fn stop(&mut self);
    fn playing(&self) -> bool;
}

/// The closed set of prompts a run can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Ready,
    Break,
    Finish,
    Error,
}

impl PromptKind {
    fn slot(self) -> usize {
        match self {
            PromptKind::Ready => 0,
            PromptKind::Break => 1,
            PromptKind::Finish => 2,
            PromptKind::Error => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub title: String,
    pub body: String,
}

impl Prompt {
    pub fn ready() -> Self {
        Self {
            kind: PromptKind::Ready,
            title: "Ready?".to_string(),
            body: "Listen to each word and pick the matching picture.\nPress space to begin."
                .to_string(),
        }
    }

    pub fn rest(escape_combo: &str) -> Self {
        Self {
            kind: PromptKind::Break,
            title: "Take a break".to_string(),
            body: format!(
                "Press space when you are ready to continue.\nThe experimenter can end the session with {escape_combo}."
            ),
        }
    }

    pub fn finish() -> Self {
        Self {
            kind: PromptKind::Finish,
            title: "All done".to_string(),
            body: "Thank you for taking part.".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: PromptKind::Error,
            title: "Ooops!".to_string(),
            body: message.into(),
        }
    }
}

/// Resolves once when its prompt closes, whether the participant dismissed
/// it or the host closed it.
#[derive(Debug)]
pub struct PromptHandle {
    pub kind: PromptKind,
    closed: oneshot::Receiver<()>,
}

impl PromptHandle {
    pub fn new(kind: PromptKind) -> (Self, oneshot::Sender<()>) {
        let (tx, closed) = oneshot::channel();
        (Self { kind, closed }, tx)
    }

    pub async fn closed(&mut self) {
        let _ = (&mut self.closed).await;
    }
}

pub trait DialogHost {
    fn open(&mut self, prompt: Prompt) -> PromptHandle;
    /// Closes one prompt kind, or every open prompt for `None`.
    fn close(&mut self, kind: Option<PromptKind>);
}

/// Tracks which prompt kinds are open so a kind is closed before it is
/// opened again.
#[derive(Debug, Default)]
pub struct PromptRegistry {
    open: [bool; 4],
}

impl PromptRegistry {
    pub fn open<D: DialogHost>(&mut self, host: &mut D, prompt: Prompt) -> PromptHandle {
        let slot = prompt.kind.slot();
        if self.open[slot] {
            host.close(Some(prompt.kind));
        }
        self.open[slot] = true;
        host.open(prompt)
    }

    pub fn closed(&mut self, kind: PromptKind) {
        self.open[kind.slot()] = false;
    }

    pub fn close_all<D: DialogHost>(&mut self, host: &mut D) {
        host.close(None);
        self.open = [false; 4];
    }

}

/// What the participant station feeds the run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    /// Any key-down, named as the platform reports it (e.g. `Escape`, `q`).
    KeyDown { key: String, at: Instant },
    /// Choice of one of the three displayed images.
    Select(usize),
    Replay,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingHost {
        opened: Vec<PromptKind>,
        closed: Vec<Option<PromptKind>>,
    }

    impl DialogHost for RecordingHost {
        fn open(&mut self, prompt: Prompt) -> PromptHandle {
            self.opened.push(prompt.kind);
            PromptHandle::new(prompt.kind).0
        }
        fn close(&mut self, kind: Option<PromptKind>) {
            self.closed.push(kind);
        }
    }

    #[test]
    fn reopening_a_kind_closes_it_first() {
        let mut host = RecordingHost::default();
        let mut prompts = PromptRegistry::default();

        prompts.open(&mut host, Prompt::rest("Escape|Escape|Escape"));
        assert!(host.closed.is_empty());
        prompts.open(&mut host, Prompt::rest("Escape|Escape|Escape"));
        assert_eq!(host.closed, [Some(PromptKind::Break)]);

        prompts.closed(PromptKind::Break);
        prompts.open(&mut host, Prompt::finish());
        prompts.close_all(&mut host);
        assert_eq!(host.closed, [Some(PromptKind::Break), None]);

        // Nothing is open after closing everything, so no extra close.
        prompts.open(&mut host, Prompt::finish());
        assert_eq!(host.closed, [Some(PromptKind::Break), None]);
    }

    #[tokio::test]
    async fn handle_resolves_when_the_host_drops_it() {
        let (mut handle, tx) = PromptHandle::new(PromptKind::Error);
        drop(tx);
        handle.closed().await;
        assert_eq!(handle.kind, PromptKind::Error);
    }
}
