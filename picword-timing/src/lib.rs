pub mod timer;

pub use timer::{CalibrationStats, FrameTimes, Timer, TokioTimer};
