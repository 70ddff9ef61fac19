//! Settings side channel, entitlement and resume

use super::core::ControllerActor;
use super::SettingsChange;
use crate::error::{Error, Result};
use subl_common::events::PlaybackState;
use subl_common::session::{
    PlaybackSession, ResumeSnapshot, VoiceSettings, MAX_REPETITION_INTERVAL_SECS, VOICE_FACTOR_RANGE,
};
use tracing::{debug, info};

impl ControllerActor {
    /// Apply one settings change
    ///
    /// Changes that alter what is being spoken (or the music level) stop
    /// playback first when it is running; the listener restarts it.
    pub(super) fn apply_settings(&mut self, change: SettingsChange) -> Result<()> {
        validate(&change)?;

        if change.requires_stop() && self.is_playing() {
            debug!(?change, "Stopping playback to apply settings");
            self.pause();
        }

        match change {
            SettingsChange::Voice(voice) => {
                self.session.voice = voice.normalized();
            }
            SettingsChange::AffirmationVolume(volume) => {
                self.session.voice.volume = volume;
            }
            SettingsChange::MusicVolume(volume) => {
                self.session.mix.music_volume = volume;
                if let Some(main) = self.main.as_mut() {
                    main.set_volume(volume);
                }
            }
            SettingsChange::FrequencyVolume(volume) => {
                self.session.mix.frequency_volume = volume;
                if let Some(frequency) = self.frequency.as_mut() {
                    frequency.set_volume(volume);
                }
            }
            SettingsChange::RepetitionInterval(secs) => {
                self.session.mix.repetition_interval_secs = secs;
            }
            SettingsChange::RepeatSession(repeat) => {
                self.session.mix.repeat_session = repeat;
            }
            SettingsChange::AffirmationsEnabled(enabled) => {
                let was_enabled = self.session.mix.affirmations_enabled;
                self.session.mix.affirmations_enabled = enabled;
                if self.state == PlaybackState::Playing && was_enabled != enabled {
                    if enabled {
                        self.start_speech(self.timing.speech_lead_in);
                    } else {
                        self.scheduler.stop();
                    }
                }
            }
            SettingsChange::Affirmations(texts) => {
                self.session.replace_affirmations(texts);
                info!(count = self.session.affirmations().len(), "Affirmations replaced");
            }
            SettingsChange::SessionInfo {
                music_track,
                category,
            } => {
                self.session.music_track = music_track;
                self.session.category = category;
            }
        }
        Ok(())
    }

    pub(super) fn set_entitlement(&mut self, entitled: bool) {
        if self.entitled == entitled {
            return;
        }
        info!(entitled, "Entitlement changed");
        self.entitled = entitled;
        if entitled {
            // A running preview becomes regular playback
            self.clear_preview();
            self.gate.reset();
        }
    }

    /// Restore the pending resume snapshot into the session
    ///
    /// Stops playback first. The caller loads `audio_url` to continue.
    pub(super) fn resume_pending(&mut self) -> Option<ResumeSnapshot> {
        let snapshot = self.gate.take_pending()?;
        self.pause();

        let mut restored = PlaybackSession::from_snapshot(snapshot.clone());
        restored.id = self.session.id;
        restored.mix.music_volume = self.session.mix.music_volume;
        restored.mix.frequency_volume = self.session.mix.frequency_volume;
        restored.mix.repeat_session = self.session.mix.repeat_session;
        restored.mix.affirmations_enabled = self.session.mix.affirmations_enabled;
        restored.frequency_url = self.session.frequency_url.clone();
        self.session = restored;

        info!(
            affirmations = self.session.affirmations().len(),
            audio_url = ?self.session.audio_url,
            "Resumed pending session"
        );
        Some(snapshot)
    }
}

fn unit(name: &str, v: f32) -> Result<()> {
    if v.is_finite() && (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{} must be within 0.0-1.0, got {}", name, v)))
    }
}

fn factor(name: &str, v: f32) -> Result<()> {
    if v.is_finite() && VOICE_FACTOR_RANGE.contains(&v) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} must be within {}-{}, got {}",
            name,
            VOICE_FACTOR_RANGE.start(),
            VOICE_FACTOR_RANGE.end(),
            v
        )))
    }
}

fn validate_voice(voice: &VoiceSettings) -> Result<()> {
    unit("voice volume", voice.volume)?;
    factor("voice rate", voice.rate)?;
    factor("voice pitch", voice.pitch)
}

fn validate(change: &SettingsChange) -> Result<()> {
    match change {
        SettingsChange::Voice(voice) => validate_voice(voice),
        SettingsChange::AffirmationVolume(v) => unit("affirmation volume", *v),
        SettingsChange::MusicVolume(v) => unit("music volume", *v),
        SettingsChange::FrequencyVolume(v) => unit("frequency volume", *v),
        SettingsChange::RepetitionInterval(secs)
            if !(0.0..=MAX_REPETITION_INTERVAL_SECS).contains(secs) =>
        {
            Err(Error::InvalidInput(format!(
                "repetition interval must be within 0-{} s, got {}",
                MAX_REPETITION_INTERVAL_SECS, secs
            )))
        }
        _ => Ok(()),
    }
}
