//! Session model shared between the player and its callers
//!
//! A [`PlaybackSession`] is the explicit record of everything one listening
//! session is built from: the affirmation list, voice and mix settings, and the
//! resources being played. It is owned by the playback controller and is the
//! source of the [`ResumeSnapshot`] written when a preview ends.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted repetition interval (one day)
pub const MAX_REPETITION_INTERVAL_SECS: f64 = 86_400.0;

/// Accepted range for voice rate and pitch
pub const VOICE_FACTOR_RANGE: std::ops::RangeInclusive<f32> = 0.1..=10.0;

/// One spoken-text unit scheduled for synthesis and playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffirmationSegment {
    /// Ordinal index within the session's affirmation list
    pub index: usize,
    /// Source text
    pub text: String,
}

/// Which synthesizer renders the voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceKind {
    /// Remote synthesis endpoint
    #[default]
    Neural,
    /// Platform speech synthesis fallback
    System,
}

impl std::fmt::Display for VoiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceKind::Neural => write!(f, "neural"),
            VoiceKind::System => write!(f, "system"),
        }
    }
}

/// Voice selection and rendering parameters for affirmations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default)]
    pub kind: VoiceKind,
    /// Voice identifier passed to the synthesizer
    pub name: String,
    pub language: String,
    pub pitch: f32,
    /// Playback rate applied to synthesized audio
    pub rate: f32,
    /// Affirmation volume (0.0-1.0)
    pub volume: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            kind: VoiceKind::Neural,
            name: "default".to_string(),
            language: "en-US".to_string(),
            pitch: 1.0,
            rate: 1.0,
            volume: 1.0,
        }
    }
}

impl VoiceSettings {
    /// Copy with volume clamped to 0.0-1.0 and rate/pitch clamped to
    /// [`VOICE_FACTOR_RANGE`]; non-finite values fall back to the defaults
    pub fn normalized(mut self) -> Self {
        self.volume = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.rate = clamp_factor(self.rate);
        self.pitch = clamp_factor(self.pitch);
        self
    }
}

fn clamp_factor(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(*VOICE_FACTOR_RANGE.start(), *VOICE_FACTOR_RANGE.end())
    } else {
        1.0
    }
}

/// Clamp a repetition interval to `0..=MAX_REPETITION_INTERVAL_SECS`; NaN is 0
pub fn clamp_repetition_interval(secs: f64) -> f64 {
    if secs.is_nan() {
        0.0
    } else {
        secs.clamp(0.0, MAX_REPETITION_INTERVAL_SECS)
    }
}

/// Track mix and loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixSettings {
    /// Main track volume (0.0-1.0)
    pub music_volume: f32,
    /// Frequency track volume (0.0-1.0)
    pub frequency_volume: f32,
    /// Seconds to wait after the last affirmation before repeating; 0 uses the fallback delay
    pub repetition_interval_secs: f64,
    pub affirmations_enabled: bool,
    /// Restart the whole session when the main track ends
    pub repeat_session: bool,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            music_volume: 1.0,
            frequency_volume: 0.5,
            repetition_interval_secs: 0.0,
            affirmations_enabled: true,
            repeat_session: false,
        }
    }
}

/// Resumable-session payload persisted when a preview ends or is denied
///
/// Field names follow the JSON key layout read back by the upgrade flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSnapshot {
    pub affirmations: Vec<String>,
    pub music_track: Option<String>,
    pub voice_type: VoiceKind,
    pub voice_name: String,
    pub voice_language: String,
    pub voice_pitch: f32,
    pub voice_speed: f32,
    pub volume: f32,
    pub audio_url: Option<String>,
    pub category: Option<String>,
    pub repetition_interval: f64,
}

/// Explicit per-session state owned by the playback controller
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: Uuid,
    affirmations: Vec<AffirmationSegment>,
    pub voice: VoiceSettings,
    pub mix: MixSettings,
    pub audio_url: Option<String>,
    pub frequency_url: Option<String>,
    /// Display name of the music track
    pub music_track: Option<String>,
    pub category: Option<String>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            affirmations: Vec::new(),
            voice: VoiceSettings::default(),
            mix: MixSettings::default(),
            audio_url: None,
            frequency_url: None,
            music_track: None,
            category: None,
        }
    }

    /// Rebuild a session from a persisted snapshot
    pub fn from_snapshot(snapshot: ResumeSnapshot) -> Self {
        let mut session = Self::new();
        session.replace_affirmations(snapshot.affirmations);
        session.voice = VoiceSettings {
            kind: snapshot.voice_type,
            name: snapshot.voice_name,
            language: snapshot.voice_language,
            pitch: snapshot.voice_pitch,
            rate: snapshot.voice_speed,
            volume: snapshot.volume,
        }
        .normalized();
        session.mix.repetition_interval_secs = clamp_repetition_interval(snapshot.repetition_interval);
        session.audio_url = snapshot.audio_url;
        session.music_track = snapshot.music_track;
        session.category = snapshot.category;
        session
    }

    /// Replace the affirmation list wholesale
    ///
    /// Blank entries are dropped; indices are assigned after filtering.
    pub fn replace_affirmations<I, S>(&mut self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affirmations = texts
            .into_iter()
            .map(|t| -> String { t.into() })
            .filter(|t| !t.trim().is_empty())
            .enumerate()
            .map(|(index, text)| AffirmationSegment { index, text })
            .collect();
    }

    pub fn affirmations(&self) -> &[AffirmationSegment] {
        &self.affirmations
    }

    /// True when the speech loop has something to say
    pub fn speech_active(&self) -> bool {
        self.mix.affirmations_enabled && !self.affirmations.is_empty()
    }

    pub fn snapshot(&self) -> ResumeSnapshot {
        ResumeSnapshot {
            affirmations: self.affirmations.iter().map(|a| a.text.clone()).collect(),
            music_track: self.music_track.clone(),
            voice_type: self.voice.kind,
            voice_name: self.voice.name.clone(),
            voice_language: self.voice.language.clone(),
            voice_pitch: self.voice.pitch,
            voice_speed: self.voice.rate,
            volume: self.voice.volume,
            audio_url: self.audio_url.clone(),
            category: self.category.clone(),
            repetition_interval: self.mix.repetition_interval_secs,
        }
    }
}
