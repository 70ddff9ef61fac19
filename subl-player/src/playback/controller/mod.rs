//! Playback controller
//!
//! **Module Structure:**
//! - `mod.rs`: public handle ([`PlaybackController`]) and command types
//! - `core.rs`: actor state, dispatch loop, state transitions, notices
//! - `intents.rs`: load, play, pause, seek, preview and end-of-track handling
//! - `settings.rs`: settings side channel, entitlement, resume
//!
//! All controller state lives in one actor task. The handle only sends
//! commands and awaits their replies, so intents, media notices, timers and
//! fetch completions are processed one at a time in arrival order.

mod core;
mod intents;
mod settings;

use crate::config::EngineTiming;
use crate::error::{Error, Result};
use crate::media::MediaBackend;
use crate::playback::scheduler::SchedulerPhase;
use crate::speech::SpeechSynthesizer;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use subl_common::events::{EventBus, PlaybackState, SublEvent};
use subl_common::session::{MixSettings, ResumeSnapshot, VoiceSettings};
use subl_common::store::SessionStore;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use self::core::ControllerActor;

/// Command channel depth
const COMMAND_CAPACITY: usize = 64;

/// Collaborators the controller is built from
pub struct EngineDeps {
    pub backend: Arc<dyn MediaBackend>,
    /// Synthesizer for neural voices
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Synthesizer for system voices, if available
    pub system_synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    pub store: Arc<dyn SessionStore>,
    pub events: EventBus,
    pub timing: EngineTiming,
}

/// Result of a play or toggle intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlayOutcome {
    Started,
    /// Started as a timed preview
    Preview {
        #[serde(rename = "window_ms")]
        #[serde(serialize_with = "serialize_millis")]
        window: Duration,
    },
    /// Refused by the preview gate; an upgrade prompt was raised
    Denied,
    /// Toggle stopped playback
    Paused,
    AlreadyPlaying,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Settings side channel
///
/// Voice, affirmation volume, music volume, repetition interval and the
/// affirmation list stop playback first when applied while playing.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsChange {
    Voice(VoiceSettings),
    AffirmationVolume(f32),
    MusicVolume(f32),
    FrequencyVolume(f32),
    RepetitionInterval(f64),
    RepeatSession(bool),
    AffirmationsEnabled(bool),
    Affirmations(Vec<String>),
    SessionInfo {
        music_track: Option<String>,
        category: Option<String>,
    },
}

impl SettingsChange {
    /// True when applying this while playing requires a full stop
    pub fn requires_stop(&self) -> bool {
        matches!(
            self,
            SettingsChange::Voice(_)
                | SettingsChange::AffirmationVolume(_)
                | SettingsChange::MusicVolume(_)
                | SettingsChange::RepetitionInterval(_)
                | SettingsChange::Affirmations(_)
        )
    }
}

/// Snapshot of controller state
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub session_id: Uuid,
    pub state: PlaybackState,
    pub playing: bool,
    pub position_secs: f64,
    pub duration_secs: f64,
    /// Frequency track position, when one is loaded
    pub frequency_position_secs: Option<f64>,
    pub audio_url: Option<String>,
    pub frequency_url: Option<String>,
    pub music_track: Option<String>,
    pub category: Option<String>,
    pub entitled: bool,
    pub has_previewed_once: bool,
    pub scheduler: SchedulerPhase,
    pub affirmation_count: usize,
    pub voice: VoiceSettings,
    pub mix: MixSettings,
}

pub(crate) enum Command {
    Load {
        url: String,
        frequency_url: Option<String>,
        reply: oneshot::Sender<Result<f64>>,
    },
    TogglePlay {
        reply: oneshot::Sender<Result<PlayOutcome>>,
    },
    Play {
        reply: oneshot::Sender<Result<PlayOutcome>>,
    },
    Pause {
        reply: oneshot::Sender<()>,
    },
    Seek {
        seconds: f64,
        reply: oneshot::Sender<Result<f64>>,
    },
    Settings {
        change: SettingsChange,
        reply: oneshot::Sender<Result<()>>,
    },
    SetEntitlement {
        entitled: bool,
        reply: oneshot::Sender<()>,
    },
    ResumePending {
        reply: oneshot::Sender<Option<ResumeSnapshot>>,
    },
    Status {
        reply: oneshot::Sender<ControllerStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the playback controller task
///
/// Cheap to clone; every clone talks to the same controller.
#[derive(Clone)]
pub struct PlaybackController {
    tx: mpsc::Sender<Command>,
    events: EventBus,
}

impl PlaybackController {
    /// Spawn the controller task on the current runtime
    pub fn spawn(deps: EngineDeps) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let events = deps.events.clone();
        let actor = ControllerActor::new(deps);
        tokio::spawn(actor.run(rx));
        Self { tx, events }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| Error::Internal("playback controller stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::Internal("playback controller dropped request".to_string()))
    }

    /// Load a main track and optional frequency track; returns the main duration
    ///
    /// Resolves to `Error::Cancelled` if a newer load supersedes this one.
    pub async fn load(&self, url: impl Into<String>, frequency_url: Option<String>) -> Result<f64> {
        let url = url.into();
        self.request(|reply| Command::Load {
            url,
            frequency_url,
            reply,
        })
        .await?
    }

    pub async fn toggle_play(&self) -> Result<PlayOutcome> {
        self.request(|reply| Command::TogglePlay { reply }).await?
    }

    pub async fn play(&self) -> Result<PlayOutcome> {
        self.request(|reply| Command::Play { reply }).await?
    }

    /// Pause; idempotent
    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Seek the main track; returns the clamped position
    pub async fn seek(&self, seconds: f64) -> Result<f64> {
        self.request(|reply| Command::Seek { seconds, reply }).await?
    }

    pub async fn update_settings(&self, change: SettingsChange) -> Result<()> {
        self.request(|reply| Command::Settings { change, reply }).await?
    }

    pub async fn set_entitlement(&self, entitled: bool) -> Result<()> {
        self.request(|reply| Command::SetEntitlement { entitled, reply }).await
    }

    /// Restore the session saved when a preview ended, clearing it from storage
    pub async fn resume_pending(&self) -> Result<Option<ResumeSnapshot>> {
        self.request(|reply| Command::ResumePending { reply }).await
    }

    pub async fn status(&self) -> Result<ControllerStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SublEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stop everything and end the controller task
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
