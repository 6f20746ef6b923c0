use std::time::Duration;

/// Fixed pacing of a run, in milliseconds.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Pause between loading the stimuli and showing the ready prompt.
    pub ready_delay_ms: u64,
    /// Cross-fade time after new images are shown; the outgoing tile is
    /// cleared once it elapses.
    pub tile_settle_ms: u64,
    pub break_delay_ms: u64,
    pub finish_delay_ms: u64,
    /// Inactivity after which the abort key buffer is emptied.
    pub abort_window_ms: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            ready_delay_ms: 1000,
            tile_settle_ms: 2000,
            break_delay_ms: 1500,
            finish_delay_ms: 2000,
            abort_window_ms: 1000,
        }
    }
}

impl ExperimentConfig {
    pub fn ready_delay(&self) -> Duration {
        Duration::from_millis(self.ready_delay_ms)
    }
    pub fn tile_settle(&self) -> Duration {
        Duration::from_millis(self.tile_settle_ms)
    }
    pub fn break_delay(&self) -> Duration {
        Duration::from_millis(self.break_delay_ms)
    }
    pub fn finish_delay(&self) -> Duration {
        Duration::from_millis(self.finish_delay_ms)
    }
    pub fn abort_window(&self) -> Duration {
        Duration::from_millis(self.abort_window_ms)
    }
}
