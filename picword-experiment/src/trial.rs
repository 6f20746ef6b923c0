use picword_cache::Atom;
use picword_core::{TrialItem, TrialStep};

/// The trial currently being driven by the scheduler.
#[derive(Debug, Clone)]
pub struct Trial<T> {
    /// 0-based position in the run.
    pub index: usize,
    pub item: TrialItem,
    /// Presentation order of the three images, once chosen.
    pub choices: Option<[Atom; 3]>,
    pub step: TrialStep,
    pub started: T,
}

impl<T> Trial<T> {
    pub fn new(index: usize, item: TrialItem, started: T) -> Self {
        Self {
            index,
            item,
            choices: None,
            step: TrialStep::Started,
            started,
        }
    }

    /// 1-based trial number as logged.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}
