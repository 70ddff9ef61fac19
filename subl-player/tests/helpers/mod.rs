//! Test helpers for subl-player integration tests
//!
//! - [`ScriptedBackend`]: resolves URLs from a duration table and decodes
//!   speech bytes as the clip length (f64 LE); counts concurrently playing
//!   speech handles; URLs marked rejecting load but refuse `play()`
//! - [`ScriptedSynth`]: synthesizer with a fixed latency that records every
//!   request and its (tokio) time
//! - [`Harness`]: a spawned controller wired to both, plus an event receiver

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subl_common::events::{EventBus, SublEvent, UpgradeReason};
use subl_common::store::MemoryStore;
use subl_player::config::EngineTiming;
use subl_player::error::{Error, Result};
use subl_player::media::{
    ClockMedia, MediaBackend, MediaHandle, MediaSlot, MediaSource, MediaState, NoticeSender,
};
use subl_player::speech::{SpeechSynthesizer, SynthesisRequest};
use subl_player::{EngineDeps, PlaybackController};
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const MAIN_URL: &str = "main.mp3";
pub const MAIN_SECS: f64 = 600.0;

// ========================================
// Media backend
// ========================================

#[derive(Default)]
struct SpeechStats {
    live: Mutex<Vec<Arc<AtomicBool>>>,
    max_concurrent: AtomicUsize,
    plays: AtomicUsize,
}

#[derive(Default)]
pub struct ScriptedBackend {
    tracks: Mutex<HashMap<String, f64>>,
    delays: Mutex<HashMap<String, Duration>>,
    rejecting: Mutex<Vec<String>>,
    rejected_plays: Arc<AtomicUsize>,
    speech: Arc<SpeechStats>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default().with_track(MAIN_URL, MAIN_SECS)
    }

    pub fn with_track(self, url: &str, secs: f64) -> Self {
        self.tracks.lock().unwrap().insert(url.to_string(), secs);
        self
    }

    /// Make loading `url` take `delay`
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    /// Handles loaded from `url` refuse every `play()`
    pub fn with_rejecting(self, url: &str) -> Self {
        self.rejecting.lock().unwrap().push(url.to_string());
        self
    }

    /// `play()` calls refused by rejecting handles
    pub fn rejected_plays(&self) -> usize {
        self.rejected_plays.load(Ordering::SeqCst)
    }

    /// Speech handles currently playing
    pub fn live_speech(&self) -> usize {
        self.speech
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.load(Ordering::SeqCst))
            .count()
    }

    /// Highest number of speech handles ever playing at once
    pub fn max_concurrent_speech(&self) -> usize {
        self.speech.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn speech_plays(&self) -> usize {
        self.speech.plays.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    async fn load(
        &self,
        source: MediaSource,
        slot: MediaSlot,
        notices: NoticeSender,
    ) -> Result<Box<dyn MediaHandle>> {
        match source {
            MediaSource::Url(url) => {
                let delay = self.delays.lock().unwrap().get(&url).copied();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let secs = self.tracks.lock().unwrap().get(&url).copied();
                let Some(secs) = secs else {
                    return Err(Error::load(url, "HTTP 404"));
                };
                let rejecting = self.rejecting.lock().unwrap().contains(&url);
                let media = ClockMedia::new(slot, url, secs, notices);
                if rejecting {
                    Ok(Box::new(RejectingMedia {
                        inner: media,
                        attempts: Arc::clone(&self.rejected_plays),
                    }))
                } else {
                    Ok(Box::new(media))
                }
            }
            MediaSource::Bytes { label, data } => {
                let bytes: [u8; 8] = data
                    .get(..8)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| Error::load(label.clone(), "short speech payload"))?;
                let flag = Arc::new(AtomicBool::new(false));
                self.speech.live.lock().unwrap().push(Arc::clone(&flag));
                Ok(Box::new(TrackedMedia {
                    inner: ClockMedia::new(slot, label, f64::from_le_bytes(bytes), notices),
                    playing: flag,
                    stats: Arc::clone(&self.speech),
                }))
            }
        }
    }
}

/// Speech handle that reports play/stop transitions to [`SpeechStats`]
struct TrackedMedia {
    inner: ClockMedia,
    playing: Arc<AtomicBool>,
    stats: Arc<SpeechStats>,
}

impl MediaHandle for TrackedMedia {
    fn slot(&self) -> MediaSlot {
        self.inner.slot()
    }
    fn url(&self) -> &str {
        self.inner.url()
    }
    fn state(&self) -> MediaState {
        self.inner.state()
    }
    fn position(&self) -> f64 {
        self.inner.position()
    }
    fn duration(&self) -> f64 {
        self.inner.duration()
    }
    fn volume(&self) -> f32 {
        self.inner.volume()
    }
    fn muted(&self) -> bool {
        self.inner.muted()
    }
    fn rate(&self) -> f32 {
        self.inner.rate()
    }

    fn play(&mut self) -> Result<()> {
        self.inner.play()?;
        self.playing.store(true, Ordering::SeqCst);
        self.stats.plays.fetch_add(1, Ordering::SeqCst);
        let live = self
            .stats
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.load(Ordering::SeqCst))
            .count();
        self.stats.max_concurrent.fetch_max(live, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) {
        self.inner.pause();
        self.playing.store(false, Ordering::SeqCst);
    }

    fn seek(&mut self, seconds: f64) -> f64 {
        self.inner.seek(seconds)
    }
    fn set_volume(&mut self, volume: f32) {
        self.inner.set_volume(volume)
    }
    fn set_muted(&mut self, muted: bool) {
        self.inner.set_muted(muted)
    }
    fn set_rate(&mut self, rate: f32) {
        self.inner.set_rate(rate)
    }

    fn release(&mut self) {
        self.inner.release();
        self.playing.store(false, Ordering::SeqCst);
    }
}

/// Track handle whose `play()` is always refused, as a blocked autoplay would be
struct RejectingMedia {
    inner: ClockMedia,
    attempts: Arc<AtomicUsize>,
}

impl MediaHandle for RejectingMedia {
    fn slot(&self) -> MediaSlot {
        self.inner.slot()
    }
    fn url(&self) -> &str {
        self.inner.url()
    }
    fn state(&self) -> MediaState {
        self.inner.state()
    }
    fn position(&self) -> f64 {
        self.inner.position()
    }
    fn duration(&self) -> f64 {
        self.inner.duration()
    }
    fn volume(&self) -> f32 {
        self.inner.volume()
    }
    fn muted(&self) -> bool {
        self.inner.muted()
    }
    fn rate(&self) -> f32 {
        self.inner.rate()
    }

    fn play(&mut self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::PlaybackRejected(format!(
            "{}: play() not allowed",
            self.inner.url()
        )))
    }

    fn pause(&mut self) {
        self.inner.pause()
    }
    fn seek(&mut self, seconds: f64) -> f64 {
        self.inner.seek(seconds)
    }
    fn set_volume(&mut self, volume: f32) {
        self.inner.set_volume(volume)
    }
    fn set_muted(&mut self, muted: bool) {
        self.inner.set_muted(muted)
    }
    fn set_rate(&mut self, rate: f32) {
        self.inner.set_rate(rate)
    }
    fn release(&mut self) {
        self.inner.release()
    }
}

// ========================================
// Synthesizer
// ========================================

pub struct ScriptedSynth {
    latency: Duration,
    clip_secs: f64,
    failing: Mutex<Vec<String>>,
    requests: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedSynth {
    pub fn new(latency: Duration, clip_secs: f64) -> Self {
        Self {
            latency,
            clip_secs,
            failing: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests for `text` fail with an HTTP 500
    pub fn fail_on(self, text: &str) -> Self {
        self.failing.lock().unwrap().push(text.to_string());
        self
    }

    pub fn texts(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Request times in seconds since `origin`
    pub fn times_since(&self, origin: Instant) -> Vec<f64> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| at.duration_since(origin).as_secs_f64())
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynth {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap()
            .push((request.text.clone(), Instant::now()));
        tokio::time::sleep(self.latency).await;
        if self.failing.lock().unwrap().contains(&request.text) {
            return Err(Error::Synthesis("HTTP 500: synthesis failed".to_string()));
        }
        Ok(self.clip_secs.to_le_bytes().to_vec())
    }
}

// ========================================
// Harness
// ========================================

pub struct Harness {
    pub controller: PlaybackController,
    pub backend: Arc<ScriptedBackend>,
    pub synth: Arc<ScriptedSynth>,
    pub store: Arc<MemoryStore>,
    pub events: broadcast::Receiver<SublEvent>,
}

impl Harness {
    pub fn new(backend: ScriptedBackend, synth: ScriptedSynth) -> Self {
        let backend = Arc::new(backend);
        let synth = Arc::new(synth);
        let store = Arc::new(MemoryStore::new());
        let events = EventBus::new(1024);
        let rx = events.subscribe();
        let controller = PlaybackController::spawn(EngineDeps {
            backend: backend.clone(),
            synthesizer: synth.clone(),
            system_synthesizer: None,
            store: store.clone(),
            events,
            timing: EngineTiming::default(),
        });
        Self {
            controller,
            backend,
            synth,
            store,
            events: rx,
        }
    }

    /// Default harness: 600 s main track, 200 ms synthesis latency, 2 s clips
    pub fn standard() -> Self {
        Self::new(
            ScriptedBackend::new(),
            ScriptedSynth::new(Duration::from_millis(200), 2.0),
        )
    }

    /// Load the main track, mark the listener entitled and set affirmations
    pub async fn entitled_session(&self, affirmations: &[&str], interval_secs: f64) {
        use subl_player::SettingsChange;
        self.controller.set_entitlement(true).await.unwrap();
        self.controller
            .update_settings(SettingsChange::Affirmations(
                affirmations.iter().map(|s| s.to_string()).collect(),
            ))
            .await
            .unwrap();
        self.controller
            .update_settings(SettingsChange::RepetitionInterval(interval_secs))
            .await
            .unwrap();
        self.controller.load(MAIN_URL, None).await.unwrap();
    }

    /// Everything broadcast since the last drain
    pub fn drain(&mut self) -> Vec<SublEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

// ========================================
// Event filters
// ========================================

pub fn started_indices(events: &[SublEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            SublEvent::AffirmationStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

pub fn playing_signals(events: &[SublEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            SublEvent::PlayingChanged { playing, .. } => Some(*playing),
            _ => None,
        })
        .collect()
}

pub fn upgrade_prompts(events: &[SublEvent]) -> Vec<UpgradeReason> {
    events
        .iter()
        .filter_map(|e| match e {
            SublEvent::UpgradePrompt { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

pub fn session_ends(events: &[SublEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            SublEvent::SessionEnded { repeating, .. } => Some(*repeating),
            _ => None,
        })
        .collect()
}

pub fn error_count(events: &[SublEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SublEvent::PlaybackError { .. }))
        .count()
}

pub fn assert_near(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < 0.05,
        "{}: expected ~{:.3}, got {:.3}",
        what,
        expected,
        actual
    );
}

pub async fn advance(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}
