//! Event types for the subliminal event system
//!
//! Provides shared event definitions and the EventBus used by the player and
//! its control surface.

mod playback_types;

pub use playback_types::{PlaybackState, UpgradeReason};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Listener-facing event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SublEvent {
    /// Controller state changed
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: DateTime<Utc>,
    },

    /// Play-state signal for host UI button state
    ///
    /// Emitted on every transition between playing and not playing.
    PlayingChanged {
        playing: bool,
        timestamp: DateTime<Utc>,
    },

    /// Throttled main track position
    PlaybackProgress {
        position_secs: f64,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// Main (and frequency) track loaded and ready
    SessionLoaded {
        session_id: Uuid,
        audio_url: String,
        duration_secs: f64,
        has_frequency: bool,
        timestamp: DateTime<Utc>,
    },

    /// A synthesized affirmation started playing
    AffirmationStarted {
        index: usize,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A synthesized affirmation finished playing
    AffirmationEnded {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    /// Listener must be offered an upgrade; the UI renders the dialog
    UpgradePrompt {
        reason: UpgradeReason,
        timestamp: DateTime<Utc>,
    },

    /// Main track reached its end
    SessionEnded {
        /// True when the session restarts from the beginning
        repeating: bool,
        timestamp: DateTime<Utc>,
    },

    /// Session-fatal error surfaced to the listener
    PlaybackError {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl SublEvent {
    /// Event type name, used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            SublEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            SublEvent::PlayingChanged { .. } => "PlayingChanged",
            SublEvent::PlaybackProgress { .. } => "PlaybackProgress",
            SublEvent::SessionLoaded { .. } => "SessionLoaded",
            SublEvent::AffirmationStarted { .. } => "AffirmationStarted",
            SublEvent::AffirmationEnded { .. } => "AffirmationEnded",
            SublEvent::UpgradePrompt { .. } => "UpgradePrompt",
            SublEvent::SessionEnded { .. } => "SessionEnded",
            SublEvent::PlaybackError { .. } => "PlaybackError",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Event fan-out over `tokio::sync::broadcast`
///
/// Publishing never blocks; a subscriber that falls behind by more than
/// `capacity` events sees `RecvError::Lagged` and skips ahead.
///
/// # Examples
///
/// ```
/// use subl_common::events::{EventBus, SublEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SublEvent::PlayingChanged {
///     playing: true,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "PlayingChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SublEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before the oldest are dropped
    /// for lagging subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SublEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SublEvent) -> Result<usize, broadcast::error::SendError<SublEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SublEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
