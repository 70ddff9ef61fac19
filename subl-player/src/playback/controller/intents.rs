//! Playback intents - load, play, pause, seek, preview and end of track

use super::core::{ControllerActor, Internal};
use super::PlayOutcome;
use crate::error::{Error, Result};
use crate::media::{phase_aligned, MediaHandle, MediaSlot, MediaSource};
use crate::playback::gate::GateDecision;
use std::time::Duration;
use subl_common::events::{PlaybackState, SublEvent, UpgradeReason};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

impl ControllerActor {
    // ========================================
    // Load
    // ========================================

    /// Release the current tracks and start loading new ones in the background
    pub(super) fn load(
        &mut self,
        url: String,
        frequency_url: Option<String>,
        reply: oneshot::Sender<Result<f64>>,
    ) {
        if let Some((superseded, previous)) = self.pending_load.take() {
            debug!(load_id = superseded, "Load superseded");
            let _ = previous.send(Err(Error::Cancelled));
        }

        self.scheduler.stop();
        self.cancel_settle();
        self.clear_preview();
        self.release_tracks();

        self.load_id += 1;
        let load_id = self.load_id;
        self.pending_load = Some((load_id, reply));
        self.session.audio_url = Some(url.clone());
        self.session.frequency_url = frequency_url.clone();
        self.set_state(PlaybackState::Loading);
        info!(load_id, url = %url, frequency = ?frequency_url, "Loading session audio");

        let backend = self.backend.clone();
        let notices = self.notice_tx.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let main_load = backend.load(MediaSource::Url(url), MediaSlot::Main, notices.clone());
            let (main, frequency) = match frequency_url {
                Some(frequency_url) => {
                    let frequency_load =
                        backend.load(MediaSource::Url(frequency_url), MediaSlot::Frequency, notices);
                    let (main, frequency) = tokio::join!(main_load, frequency_load);
                    (main, Some(frequency))
                }
                None => (main_load.await, None),
            };
            let _ = internal.send(Internal::Loaded {
                load_id,
                main,
                frequency,
            });
        });
    }

    pub(super) fn on_loaded(
        &mut self,
        load_id: u64,
        main: Result<Box<dyn MediaHandle>>,
        frequency: Option<Result<Box<dyn MediaHandle>>>,
    ) {
        let reply = match self.pending_load.take() {
            Some((pending, reply)) if pending == load_id => reply,
            other => {
                self.pending_load = other;
                debug!(load_id, "Discarding superseded load");
                release_all(main, frequency);
                return;
            }
        };

        let (mut main, frequency) = match (main, frequency) {
            (Ok(main), None) => (main, None),
            (Ok(main), Some(Ok(frequency))) => (main, Some(frequency)),
            (Ok(mut main), Some(Err(e))) => {
                main.release();
                self.fail_session(&e);
                let _ = reply.send(Err(e));
                return;
            }
            (Err(e), frequency) => {
                if let Some(Ok(mut frequency)) = frequency {
                    frequency.release();
                }
                self.fail_session(&e);
                let _ = reply.send(Err(e));
                return;
            }
        };

        main.set_volume(self.session.mix.music_volume);
        let duration = main.duration();
        let has_frequency = frequency.is_some();
        self.main = Some(main);
        self.frequency = frequency.map(|mut frequency| {
            frequency.set_volume(self.session.mix.frequency_volume);
            frequency
        });

        self.set_state(PlaybackState::Ready);
        info!(duration_secs = duration, has_frequency, "Session audio ready");
        self.events.emit_lossy(SublEvent::SessionLoaded {
            session_id: self.session.id,
            audio_url: self.session.audio_url.clone().unwrap_or_default(),
            duration_secs: duration,
            has_frequency,
            timestamp: chrono::Utc::now(),
        });
        let _ = reply.send(Ok(duration));
    }

    // ========================================
    // Play / pause
    // ========================================

    pub(super) fn toggle_play(&mut self) -> Result<PlayOutcome> {
        if self.is_playing() {
            self.pause();
            Ok(PlayOutcome::Paused)
        } else {
            self.play()
        }
    }

    pub(super) fn play(&mut self) -> Result<PlayOutcome> {
        match self.state {
            PlaybackState::Playing => return Ok(PlayOutcome::AlreadyPlaying),
            PlaybackState::Seeking if self.seek_resume == PlaybackState::Playing => {
                return Ok(PlayOutcome::AlreadyPlaying)
            }
            PlaybackState::Seeking => {}
            state if state.can_start() => {}
            state => {
                return Err(Error::InvalidState(format!("cannot play while {}", state)));
            }
        }

        let window = match self.gate.attempt_play(self.entitled) {
            GateDecision::Deny => {
                info!("Preview already used; playback refused");
                self.gate.denied(&self.session.snapshot());
                if self.state == PlaybackState::Seeking {
                    self.seek_resume = PlaybackState::Paused;
                } else {
                    self.set_state(PlaybackState::Paused);
                }
                self.events.emit_lossy(SublEvent::UpgradePrompt {
                    reason: UpgradeReason::PreviewExhausted,
                    timestamp: chrono::Utc::now(),
                });
                return Ok(PlayOutcome::Denied);
            }
            GateDecision::Allow => None,
            GateDecision::AllowWithTimeout(window) => Some(window),
        };

        if self.state == PlaybackState::Seeking {
            // Settle completes the start
            let was_playing = self.is_playing();
            self.seek_resume = PlaybackState::Playing;
            self.emit_playing_if_changed(was_playing);
        } else {
            self.enter_playing(self.timing.speech_lead_in)?;
        }

        match window {
            Some(window) => {
                self.arm_preview(window);
                Ok(PlayOutcome::Preview { window })
            }
            None => Ok(PlayOutcome::Started),
        }
    }

    /// Start main and frequency tracks and the affirmation loop
    ///
    /// The frequency track is positioned at `main_pos mod freq_dur`.
    pub(super) fn enter_playing(&mut self, lead_in: Duration) -> Result<()> {
        let Some(main) = self.main.as_mut() else {
            return Err(Error::InvalidState("no main track loaded".to_string()));
        };
        if let Err(e) = main.play() {
            return Err(self.reject_playback(e));
        }
        let position = main.position();

        if let Some(frequency) = self.frequency.as_mut() {
            let offset = phase_aligned(position, frequency.duration());
            frequency.seek(offset);
            if let Err(e) = frequency.play() {
                if let Some(main) = self.main.as_mut() {
                    main.pause();
                }
                return Err(self.reject_playback(e));
            }
        }

        self.set_state(PlaybackState::Playing);
        self.start_speech(lead_in);
        Ok(())
    }

    /// Start the affirmation loop if there is anything to say
    pub(super) fn start_speech(&mut self, lead_in: Duration) {
        if !self.session.speech_active() {
            return;
        }
        self.scheduler.start(
            self.session.affirmations().to_vec(),
            self.session.mix.repetition_interval_secs,
            self.session.voice.clone(),
            lead_in,
        );
    }

    fn reject_playback(&mut self, cause: Error) -> Error {
        let err = match cause {
            Error::PlaybackRejected(reason) => Error::PlaybackRejected(reason),
            other => Error::PlaybackRejected(other.to_string()),
        };
        warn!("{}", err);
        self.scheduler.stop();
        self.clear_preview();
        self.set_state(PlaybackState::Paused);
        self.events.emit_lossy(SublEvent::PlaybackError {
            message: err.to_string(),
            timestamp: chrono::Utc::now(),
        });
        err
    }

    /// Pause both tracks and stop the affirmation loop
    pub(super) fn halt_media(&mut self) {
        self.scheduler.stop();
        if let Some(main) = self.main.as_mut() {
            main.pause();
        }
        if let Some(frequency) = self.frequency.as_mut() {
            frequency.pause();
        }
    }

    /// Full stop to Paused; no-op unless playing or seeking
    pub(super) fn pause(&mut self) {
        match self.state {
            PlaybackState::Playing | PlaybackState::Seeking => {}
            _ => return,
        }
        self.halt_media();
        self.cancel_settle();
        self.clear_preview();
        self.set_state(PlaybackState::Paused);
        debug!("Playback paused");
    }

    // ========================================
    // Seek
    // ========================================

    pub(super) fn seek(&mut self, seconds: f64) -> Result<f64> {
        let resume = match self.state {
            PlaybackState::Playing => PlaybackState::Playing,
            PlaybackState::Paused | PlaybackState::Ready => self.state,
            PlaybackState::Ended => PlaybackState::Paused,
            PlaybackState::Seeking => self.seek_resume,
            state => {
                return Err(Error::InvalidState(format!("cannot seek while {}", state)));
            }
        };

        self.scheduler.stop();

        let Some(main) = self.main.as_mut() else {
            return Err(Error::InvalidState("no main track loaded".to_string()));
        };
        let applied = main.seek(seconds);
        if let Some(frequency) = self.frequency.as_mut() {
            let offset = phase_aligned(applied, frequency.duration());
            frequency.seek(offset);
            if resume == PlaybackState::Playing {
                if let Err(e) = frequency.play() {
                    warn!("Frequency track did not resume after seek: {}", e);
                }
            }
        }

        self.seek_resume = resume;
        self.set_state(PlaybackState::Seeking);
        self.arm_settle();
        debug!(requested = seconds, applied, resume = %resume, "Seeking");
        Ok(applied)
    }

    fn arm_settle(&mut self) {
        self.cancel_settle();
        let seek_id = self.seek_id;
        let delay = self.timing.seek_settle;
        let internal = self.internal_tx.clone();
        self.settle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal.send(Internal::SeekSettled { seek_id });
        }));
    }

    pub(super) fn on_seek_settled(&mut self, seek_id: u64) {
        if seek_id != self.seek_id || self.state != PlaybackState::Seeking {
            return;
        }
        self.settle_timer = None;

        if self.seek_resume == PlaybackState::Playing {
            if let Err(e) = self.enter_playing(Duration::ZERO) {
                warn!("Could not resume after seek: {}", e);
            }
        } else {
            self.set_state(self.seek_resume);
        }
    }

    // ========================================
    // Preview window
    // ========================================

    fn arm_preview(&mut self, window: Duration) {
        self.clear_preview();
        let preview_id = self.preview_id;
        let internal = self.internal_tx.clone();
        info!(window_ms = window.as_millis() as u64, "Preview started");
        self.preview_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = internal.send(Internal::PreviewElapsed { preview_id });
        }));
    }

    pub(super) fn on_preview_elapsed(&mut self, preview_id: u64) {
        if preview_id != self.preview_id {
            return;
        }
        self.preview_timer = None;
        info!("Preview window elapsed");

        self.halt_media();
        self.cancel_settle();
        self.set_state(PlaybackState::Paused);
        self.gate.preview_expired(&self.session.snapshot());
        self.events.emit_lossy(SublEvent::UpgradePrompt {
            reason: UpgradeReason::PreviewExpired,
            timestamp: chrono::Utc::now(),
        });
    }

    // ========================================
    // End of track / errors
    // ========================================

    pub(super) fn on_main_ended(&mut self) {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Seeking) {
            return;
        }
        self.halt_media();
        self.cancel_settle();

        if self.session.mix.repeat_session {
            info!("Main track ended; repeating session");
            self.events.emit_lossy(SublEvent::SessionEnded {
                repeating: true,
                timestamp: chrono::Utc::now(),
            });
            if let Some(main) = self.main.as_mut() {
                main.seek(0.0);
            }
            if let Err(e) = self.enter_playing(self.timing.speech_lead_in) {
                warn!("Could not restart session: {}", e);
            }
        } else {
            info!("Main track ended");
            let previewing = self.preview_timer.is_some();
            self.clear_preview();
            self.set_state(PlaybackState::Ended);
            self.events.emit_lossy(SublEvent::SessionEnded {
                repeating: false,
                timestamp: chrono::Utc::now(),
            });
            // A preview that runs to the end of the track is used up
            if previewing {
                self.gate.preview_expired(&self.session.snapshot());
                self.events.emit_lossy(SublEvent::UpgradePrompt {
                    reason: UpgradeReason::PreviewExpired,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }

    /// Session-fatal error: stop everything and enter Errored
    pub(super) fn fail_session(&mut self, err: &Error) {
        error!("Playback failed: {}", err);
        self.scheduler.stop();
        self.cancel_settle();
        self.clear_preview();
        self.release_tracks();
        self.set_state(PlaybackState::Errored);
        self.events.emit_lossy(SublEvent::PlaybackError {
            message: err.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}

fn release_all(
    main: Result<Box<dyn MediaHandle>>,
    frequency: Option<Result<Box<dyn MediaHandle>>>,
) {
    if let Ok(mut main) = main {
        main.release();
    }
    if let Some(Ok(mut frequency)) = frequency {
        frequency.release();
    }
}
