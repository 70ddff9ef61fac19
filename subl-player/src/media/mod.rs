//! Media handles
//!
//! A [`MediaHandle`] is the transport for one playable resource: play, pause,
//! seek, volume and an end notification. Handles are produced by a
//! [`MediaBackend`], which fetches and validates the resource first.
//!
//! Notices (`Ended`, `Error`) travel over an mpsc channel back to the owner.
//! They are advisory: a notice may already be stale by the time it is read
//! (the track was seeked after the end fired), so receivers confirm with
//! [`MediaHandle::state`] before acting.

mod backend;
mod clock;

pub use backend::{probe_duration, ClockBackend};
pub use clock::ClockMedia;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// Media handle lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaState {
    Unloaded,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Errored,
}

/// Identifies which track a handle (and its notices) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaSlot {
    Main,
    Frequency,
    /// Synthesized affirmation, keyed by fetch ticket
    Speech(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    Ended,
    Error(String),
}

/// Notification from a handle to its owner
#[derive(Debug, Clone, PartialEq)]
pub struct MediaNotice {
    pub slot: MediaSlot,
    pub kind: NoticeKind,
}

pub type NoticeSender = mpsc::UnboundedSender<MediaNotice>;

/// Where a resource comes from
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// Local path, `file://` URL or `http(s)://` URL
    Url(String),
    /// Already-fetched bytes (synthesized speech)
    Bytes { label: String, data: Vec<u8> },
}

impl MediaSource {
    pub fn label(&self) -> &str {
        match self {
            MediaSource::Url(url) => url,
            MediaSource::Bytes { label, .. } => label,
        }
    }
}

/// Transport for one loaded resource
///
/// Exactly one underlying session per instance; [`release`](MediaHandle::release)
/// gives it up and leaves the handle `Unloaded`.
pub trait MediaHandle: Send {
    fn slot(&self) -> MediaSlot;
    fn url(&self) -> &str;
    fn state(&self) -> MediaState;
    /// Current position in seconds, within [0, duration]
    fn position(&self) -> f64;
    fn duration(&self) -> f64;
    fn volume(&self) -> f32;
    fn muted(&self) -> bool;
    fn rate(&self) -> f32;

    /// Start or resume; `PlaybackRejected` when the runtime refuses
    fn play(&mut self) -> Result<()>;
    /// Stop and keep position; idempotent
    fn pause(&mut self);
    /// Clamp to [0, duration] and move there; returns the applied position.
    /// Does not change the lifecycle state.
    fn seek(&mut self, seconds: f64) -> f64;
    fn set_volume(&mut self, volume: f32);
    fn set_muted(&mut self, muted: bool);
    fn set_rate(&mut self, rate: f32);
    fn release(&mut self);
}

/// Loads resources into handles
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Fetch and decode-check `source`; `Error::Load` on failure
    async fn load(
        &self,
        source: MediaSource,
        slot: MediaSlot,
        notices: NoticeSender,
    ) -> Result<Box<dyn MediaHandle>>;
}

/// Position a looping-phase track against a main-track offset
pub fn phase_aligned(offset: f64, duration: f64) -> f64 {
    if duration > 0.0 && offset.is_finite() {
        offset.max(0.0) % duration
    } else {
        0.0
    }
}
