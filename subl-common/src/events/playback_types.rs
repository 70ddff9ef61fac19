//! Playback-related type definitions
//!
//! Supporting types for controller state and listener-facing signals.

use serde::{Deserialize, Serialize};

/// Playback controller state enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No resource assigned yet
    Idle,
    /// Main track resource is being fetched and probed
    Loading,
    /// Loaded, never started
    Ready,
    Playing,
    Paused,
    /// Seek in progress; settles back to Playing or Paused
    Seeking,
    /// Main track reached its end
    Ended,
    /// Session-fatal error; recoverable by loading again
    Errored,
}

impl PlaybackState {
    /// True for states in which a play intent can start playback
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Ended
        )
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Seeking => write!(f, "seeking"),
            PlaybackState::Ended => write!(f, "ended"),
            PlaybackState::Errored => write!(f, "errored"),
        }
    }
}

/// Why the listener is being asked to upgrade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeReason {
    /// The one-time preview window elapsed during playback
    PreviewExpired,
    /// The preview was already used; playback refused
    PreviewExhausted,
}

impl std::fmt::Display for UpgradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradeReason::PreviewExpired => write!(f, "preview_expired"),
            UpgradeReason::PreviewExhausted => write!(f, "preview_exhausted"),
        }
    }
}
