/// Phases of one experiment run.
///
/// `Finished` and `Aborted` are terminal: once reached, [`RunPhase::next`]
/// refuses every event.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Loading,
    ReadyPrompt,
    Running,
    Break,
    Finishing,
    Finished,
    Aborted,
}

/// Events that move a run between phases.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started,
    StimuliLoaded,
    PromptDismissed,
    BlockBoundary,
    TrialsExhausted,
    Failed,
    Abort,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Aborted)
    }

    /// Participant selections only count while trials are running.
    pub fn allows_response(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn next(&self, event: RunEvent) -> Option<Self> {
        use RunEvent::*;
        use RunPhase::*;
        Some(match (self, event) {
            (phase, _) if phase.is_terminal() => return None,
            (_, Abort | Failed) => Aborted,
            (Idle, Started) => Loading,
            (Loading, StimuliLoaded) => ReadyPrompt,
            (ReadyPrompt, PromptDismissed) => Running,
            (Running, BlockBoundary) => Break,
            (Break, PromptDismissed) => Running,
            (Running, TrialsExhausted) => Finishing,
            (Finishing, PromptDismissed) => Finished,
            _ => return None,
        })
    }
}
