//! Window focus tracker: polling state machine with idle accounting.

pub mod focus;
pub mod probe;

pub use focus::{FocusTracker, PollSample, TrackerEffect, TrackerState};
pub use probe::{platform_probe, FocusProbe};
