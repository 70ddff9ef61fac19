//! Speech segments
//!
//! Affirmation text is turned into audio by a [`SpeechSynthesizer`], loaded
//! into a media handle and wrapped in a [`SpeechInstance`]. The
//! [`SpeechFetcher`] runs those steps as a cancellable background task.

mod fetcher;
mod http;

pub use fetcher::{fetch_instance, SpeechFetcher};
pub use http::HttpSynthesizer;

use crate::error::{Error, Result};
use crate::media::{MediaHandle, MediaState};
use async_trait::async_trait;
use serde::Serialize;
use subl_common::session::{AffirmationSegment, VoiceSettings};
use tracing::debug;

/// Speech audio instance lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechState {
    Pending,
    Ready,
    Playing,
    Ended,
    Cancelled,
    Errored,
}

/// Synthesized audio for one affirmation
///
/// Owns its media handle; the handle is released on finish, cancel or drop.
pub struct SpeechInstance {
    segment: AffirmationSegment,
    ticket: u64,
    handle: Box<dyn MediaHandle>,
    state: SpeechState,
}

impl SpeechInstance {
    pub fn new(segment: AffirmationSegment, ticket: u64, handle: Box<dyn MediaHandle>) -> Self {
        let state = match handle.state() {
            MediaState::Ready => SpeechState::Ready,
            MediaState::Errored | MediaState::Unloaded => SpeechState::Errored,
            _ => SpeechState::Pending,
        };
        Self {
            segment,
            ticket,
            handle,
            state,
        }
    }

    pub fn index(&self) -> usize {
        self.segment.index
    }

    pub fn text(&self) -> &str {
        &self.segment.text
    }

    /// Fetch ticket; matches the `MediaSlot::Speech` of the handle's notices
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn volume(&self) -> f32 {
        self.handle.volume()
    }

    pub fn rate(&self) -> f32 {
        self.handle.rate()
    }

    /// Apply voice volume and rate to the underlying handle
    pub fn apply_voice(&mut self, voice: &VoiceSettings) {
        self.handle.set_volume(voice.volume);
        self.handle.set_rate(voice.rate);
    }

    pub fn play(&mut self) -> Result<()> {
        if self.state != SpeechState::Ready {
            return Err(Error::InvalidState(format!(
                "speech segment {} is {:?}",
                self.segment.index, self.state
            )));
        }
        match self.handle.play() {
            Ok(()) => {
                self.state = SpeechState::Playing;
                Ok(())
            }
            Err(e) => {
                self.state = SpeechState::Errored;
                self.handle.release();
                Err(e)
            }
        }
    }

    /// True once the handle has run to its end
    pub fn has_ended(&self) -> bool {
        self.state == SpeechState::Playing && self.handle.state() == MediaState::Ended
    }

    /// Stop and release; idempotent
    pub fn cancel(&mut self) {
        if matches!(self.state, SpeechState::Cancelled | SpeechState::Ended) {
            return;
        }
        debug!(index = self.segment.index, ticket = self.ticket, "Cancelling speech");
        self.handle.pause();
        self.handle.release();
        self.state = SpeechState::Cancelled;
    }

    /// Mark as played through and release
    pub fn finish(&mut self) {
        self.handle.release();
        self.state = SpeechState::Ended;
    }
}

impl std::fmt::Debug for SpeechInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechInstance")
            .field("index", &self.segment.index)
            .field("ticket", &self.ticket)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for SpeechInstance {
    fn drop(&mut self) {
        self.handle.release();
    }
}

/// One synthesis call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    #[serde(skip)]
    pub language: String,
    #[serde(skip)]
    pub pitch: f32,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice: &VoiceSettings) -> Self {
        Self {
            text: text.into(),
            voice: voice.name.clone(),
            language: voice.language.clone(),
            pitch: voice.pitch,
        }
    }
}

/// Renders text to encoded audio
///
/// Any failure is reported as `Error::Synthesis`. Implementations do not retry.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>>;
}
