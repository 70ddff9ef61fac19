//! Playback engine: controller, affirmation scheduler and preview gate

pub mod controller;
pub mod gate;
pub mod scheduler;

pub use controller::{
    ControllerStatus, EngineDeps, PlayOutcome, PlaybackController, SettingsChange,
};
pub use gate::{GateDecision, PreviewGate};
pub use scheduler::{SchedulerMsg, SchedulerPhase, SegmentScheduler};
