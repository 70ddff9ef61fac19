//! subl-player library
//!
//! Synchronized playback of a music track, an optional frequency track and
//! synthesized affirmations, with a one-time preview for unentitled listeners.
//! Exposed as a library so integration tests and the binary share it.

pub mod api;
pub mod config;
pub mod error;
pub mod media;
pub mod playback;
pub mod speech;

pub use error::{Error, Result};
pub use playback::{EngineDeps, PlayOutcome, PlaybackController, SettingsChange};
