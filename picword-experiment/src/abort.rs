use picword_core::COMBO_DELIMITER;
use std::time::Duration;
use tokio::time::Instant;

/// Watches key-downs for the escape combo.
///
/// The buffer is emptied as a whole once `window` passes without a key-down,
/// and the combo must match the entire buffer. A stray key typed just before
/// the combo therefore blocks the match until the buffer clears.
#[derive(Debug, Clone)]
pub struct AbortWatcher {
    combo: String,
    window: Duration,
    buffer: Vec<String>,
    last_key: Option<Instant>,
}

impl AbortWatcher {
    pub fn new(combo: &str, window: Duration) -> Self {
        Self {
            combo: combo.to_lowercase(),
            window,
            buffer: Vec::new(),
            last_key: None,
        }
    }

    /// Records a key-down at `at`; returns true when it completes the combo.
    pub fn key_down(&mut self, key: &str, at: Instant) -> bool {
        if self
            .last_key
            .is_some_and(|last| at.saturating_duration_since(last) >= self.window)
        {
            self.buffer.clear();
        }
        self.last_key = Some(at);
        self.buffer.push(key.to_string());

        let typed = self.buffer.join(&COMBO_DELIMITER.to_string()).to_lowercase();
        !self.combo.is_empty() && typed == self.combo
    }

    pub fn buffer(&self) -> &[String] {
        &self.buffer
    }
}
