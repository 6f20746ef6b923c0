pub mod phase;
pub mod settings;
pub mod stimulus;
pub mod trial;

pub use phase::{RunEvent, RunPhase};
pub use settings::{Settings, SettingsError, COMBO_DELIMITER};
pub use stimulus::{Direction, TileStack, TileStyle, TrialItem, KEY_SEPARATOR};
pub use trial::{TrialRecord, TrialStep, RESULTS_HEADER};
