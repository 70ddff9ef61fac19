//! Controller integration tests
//!
//! Drive a real controller against the scripted backend and synthesizer on a
//! paused tokio clock, so timer and fetch interleavings are deterministic.

mod helpers;

use helpers::*;
use std::time::Duration;
use subl_common::events::{PlaybackState, SublEvent, UpgradeReason};
use subl_common::session::{PlaybackSession, VoiceSettings, MAX_REPETITION_INTERVAL_SECS};
use subl_common::store::SessionStore;
use subl_player::playback::SchedulerPhase;
use subl_player::{Error, PlayOutcome, SettingsChange};
use tokio::time::Instant;

// ========================================
// Affirmation loop
// ========================================

#[tokio::test(start_paused = true)]
async fn test_affirmations_cycle_in_order_with_repetition_interval() {
    let mut h = Harness::standard();
    h.entitled_session(&["a", "b", "c"], 10.0).await;

    let t0 = Instant::now();
    assert_eq!(h.controller.play().await.unwrap(), PlayOutcome::Started);
    advance(20.0).await;

    assert_eq!(h.synth.texts(), vec!["a", "b", "c", "a"]);

    // lead-in 1 s, latency 0.2 s, clip 2 s, gap 1 s
    let times = h.synth.times_since(t0);
    assert_near(times[0], 1.0, "first fetch");
    assert_near(times[1], 4.2, "second fetch");
    assert_near(times[2], 7.4, "third fetch");
    // Last segment ends at 7.4 + 0.2 + 2.0; the list restarts 10 s later
    assert_near(times[3] - (times[2] + 0.2 + 2.0), 10.0, "repetition interval");

    assert_eq!(h.backend.max_concurrent_speech(), 1);
    let events = h.drain();
    assert_eq!(started_indices(&events), vec![0, 1, 2, 0]);
    assert_eq!(playing_signals(&events), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_uses_fallback_delay() {
    let h = Harness::standard();
    h.entitled_session(&["only"], 0.0).await;

    let t0 = Instant::now();
    h.controller.play().await.unwrap();
    advance(10.0).await;

    let times = h.synth.times_since(t0);
    assert!(times.len() >= 2, "expected a repeat, got {:?}", times);
    // 1.0 fetch, 1.2-3.2 speaking, then the 5 s fallback
    assert_near(times[1], 8.2, "repeat after fallback");
}

#[tokio::test(start_paused = true)]
async fn test_failed_segment_is_skipped() {
    let mut h = Harness::new(
        ScriptedBackend::new(),
        ScriptedSynth::new(Duration::from_millis(200), 2.0).fail_on("b"),
    );
    h.entitled_session(&["a", "b", "c"], 30.0).await;

    h.controller.play().await.unwrap();
    advance(12.0).await;

    assert_eq!(h.synth.texts(), vec!["a", "b", "c"]);
    let events = h.drain();
    assert_eq!(started_indices(&events), vec![0, 2]);
    assert_eq!(h.controller.status().await.unwrap().state, PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_affirmations_never_fetch() {
    let h = Harness::standard();
    h.entitled_session(&["a", "b"], 5.0).await;
    h.controller
        .update_settings(SettingsChange::AffirmationsEnabled(false))
        .await
        .unwrap();

    h.controller.play().await.unwrap();
    advance(10.0).await;
    assert!(h.synth.texts().is_empty());

    // Re-enabling while playing starts the loop after the lead-in
    h.controller
        .update_settings(SettingsChange::AffirmationsEnabled(true))
        .await
        .unwrap();
    advance(1.5).await;
    assert_eq!(h.synth.texts(), vec!["a"]);
    assert_eq!(h.controller.status().await.unwrap().state, PlaybackState::Playing);
}

// ========================================
// Seek
// ========================================

#[tokio::test(start_paused = true)]
async fn test_seek_during_fetch_cancels_and_restarts_from_first_segment() {
    let mut h = Harness::new(
        ScriptedBackend::new(),
        ScriptedSynth::new(Duration::from_secs(2), 2.0),
    );
    h.entitled_session(&["a", "b", "c"], 10.0).await;

    let t0 = Instant::now();
    h.controller.play().await.unwrap();

    // a: fetch 1-3, speak 3-5; b: fetch from 6
    advance(7.0).await;
    assert_eq!(
        h.controller.status().await.unwrap().scheduler,
        SchedulerPhase::Fetching { index: 1 }
    );
    assert_eq!(h.controller.seek(30.0).await.unwrap(), 30.0);
    assert_eq!(h.controller.status().await.unwrap().state, PlaybackState::Seeking);

    advance(0.5).await;
    assert_eq!(h.synth.texts(), vec!["a", "b", "a"]);
    let times = h.synth.times_since(t0);
    assert_near(times[2], 7.2, "fetch after settle");

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_near(status.position_secs, 30.5, "main position");

    // The cancelled fetch for b never plays
    advance(3.0).await;
    let events = h.drain();
    assert_eq!(started_indices(&events), vec![0, 0]);
    assert_eq!(h.backend.max_concurrent_speech(), 1);
    // Playing stays asserted through the seek
    assert_eq!(playing_signals(&events), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn test_seek_while_speaking_silences_current_segment() {
    let mut h = Harness::new(
        ScriptedBackend::new(),
        ScriptedSynth::new(Duration::from_millis(200), 4.0),
    );
    h.entitled_session(&["a", "b"], 10.0).await;

    h.controller.play().await.unwrap();
    advance(2.0).await;
    assert_eq!(
        h.controller.status().await.unwrap().scheduler,
        SchedulerPhase::Speaking { index: 0 }
    );

    h.controller.seek(100.0).await.unwrap();
    advance(3.0).await;

    let events = h.drain();
    // The interrupted segment does not report a natural end
    let ended = events
        .iter()
        .filter(|e| matches!(e, SublEvent::AffirmationEnded { .. }))
        .count();
    assert_eq!(ended, 0);
    assert_eq!(started_indices(&events), vec![0, 0]);
    assert_eq!(h.backend.max_concurrent_speech(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_seek_aligns_frequency_phase() {
    let h = Harness::new(
        ScriptedBackend::new().with_track("tone.wav", 12.0),
        ScriptedSynth::new(Duration::from_millis(200), 2.0),
    );
    h.controller.set_entitlement(true).await.unwrap();
    h.controller
        .load(MAIN_URL, Some("tone.wav".to_string()))
        .await
        .unwrap();

    h.controller.seek(30.0).await.unwrap();
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.frequency_position_secs, Some(6.0));

    // Seeking from Ready settles back to Ready
    advance(0.3).await;
    assert_eq!(h.controller.status().await.unwrap().state, PlaybackState::Ready);

    h.controller.play().await.unwrap();
    advance(2.0).await;
    let status = h.controller.status().await.unwrap();
    assert_near(status.position_secs, 32.0, "main position");
    assert_near(status.frequency_position_secs.unwrap(), 8.0, "frequency position");
}

#[tokio::test(start_paused = true)]
async fn test_seek_clamps_and_rejects_without_track() {
    let h = Harness::standard();
    let err = h.controller.seek(10.0).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    h.controller.load(MAIN_URL, None).await.unwrap();
    assert_eq!(h.controller.seek(-5.0).await.unwrap(), 0.0);
    assert_eq!(h.controller.seek(10_000.0).await.unwrap(), MAIN_SECS);
}

// ========================================
// Pause / settings
// ========================================

#[tokio::test(start_paused = true)]
async fn test_pause_is_idempotent() {
    let mut h = Harness::standard();
    h.entitled_session(&["a"], 5.0).await;

    h.controller.play().await.unwrap();
    advance(1.5).await;
    h.controller.pause().await.unwrap();
    h.controller.pause().await.unwrap();

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Paused);
    assert_eq!(status.scheduler, SchedulerPhase::Stopped);

    let events = h.drain();
    assert_eq!(playing_signals(&events), vec![true, false]);
    let paused_transitions = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                SublEvent::PlaybackStateChanged {
                    new_state: PlaybackState::Paused,
                    ..
                }
            )
        })
        .count();
    assert_eq!(paused_transitions, 1);

    // Nothing outstanding fires later
    advance(10.0).await;
    assert_eq!(h.synth.texts(), vec!["a"]);
    assert!(started_indices(&h.drain()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_play_alternates() {
    let h = Harness::standard();
    h.entitled_session(&[], 5.0).await;

    assert_eq!(h.controller.toggle_play().await.unwrap(), PlayOutcome::Started);
    assert!(h.controller.status().await.unwrap().playing);
    assert_eq!(h.controller.toggle_play().await.unwrap(), PlayOutcome::Paused);
    assert!(!h.controller.status().await.unwrap().playing);
    assert_eq!(h.controller.play().await.unwrap(), PlayOutcome::Started);
    assert_eq!(h.controller.play().await.unwrap(), PlayOutcome::AlreadyPlaying);
}

#[tokio::test(start_paused = true)]
async fn test_voice_change_while_playing_stops_playback() {
    let h = Harness::standard();
    h.entitled_session(&["a", "b"], 5.0).await;

    h.controller.play().await.unwrap();
    advance(1.1).await;
    assert!(matches!(
        h.controller.status().await.unwrap().scheduler,
        SchedulerPhase::Fetching { index: 0 }
    ));

    let voice = VoiceSettings {
        name: "alloy".to_string(),
        ..VoiceSettings::default()
    };
    h.controller
        .update_settings(SettingsChange::Voice(voice))
        .await
        .unwrap();

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Paused);
    assert_eq!(status.voice.name, "alloy");
    advance(10.0).await;
    assert_eq!(h.synth.texts(), vec!["a"]);
    assert_eq!(h.backend.speech_plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_frequency_volume_does_not_stop_playback() {
    let h = Harness::standard();
    h.entitled_session(&["a"], 5.0).await;

    h.controller.play().await.unwrap();
    h.controller
        .update_settings(SettingsChange::FrequencyVolume(0.2))
        .await
        .unwrap();

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_eq!(status.mix.frequency_volume, 0.2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_settings_rejected_without_side_effects() {
    let h = Harness::standard();
    h.entitled_session(&["a"], 5.0).await;
    h.controller.play().await.unwrap();

    let err = h
        .controller
        .update_settings(SettingsChange::MusicVolume(1.5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_eq!(status.mix.music_volume, 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_repetition_interval_rejected() {
    let h = Harness::standard();
    h.entitled_session(&["a"], 5.0).await;
    h.controller.play().await.unwrap();

    let err = h
        .controller
        .update_settings(SettingsChange::RepetitionInterval(1e20))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    advance(10.0).await;
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_eq!(status.mix.repetition_interval_secs, 5.0);
    assert_eq!(h.synth.texts(), vec!["a", "a"]);
}

#[tokio::test(start_paused = true)]
async fn test_resumed_interval_is_capped() {
    let h = Harness::standard();
    let mut snapshot = PlaybackSession::new().snapshot();
    snapshot.affirmations = vec!["a".to_string()];
    snapshot.audio_url = Some(MAIN_URL.to_string());
    snapshot.repetition_interval = 1e20;
    h.store.save_snapshot(&snapshot).unwrap();

    h.controller.resume_pending().await.unwrap().unwrap();
    assert_eq!(
        h.controller.status().await.unwrap().mix.repetition_interval_secs,
        MAX_REPETITION_INTERVAL_SECS
    );

    h.controller.set_entitlement(true).await.unwrap();
    h.controller.load(MAIN_URL, None).await.unwrap();
    h.controller.play().await.unwrap();
    advance(10.0).await;

    // Waiting out the day-long interval, controller still answering
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_eq!(status.scheduler, SchedulerPhase::AwaitingRepeat);
    assert_eq!(h.synth.texts(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_voice_rate_rejected() {
    let h = Harness::standard();
    h.entitled_session(&["a"], 5.0).await;
    h.controller.play().await.unwrap();

    let voice = VoiceSettings {
        rate: 1e-30,
        ..VoiceSettings::default()
    };
    let err = h
        .controller
        .update_settings(SettingsChange::Voice(voice))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    // Loop keeps cycling at the old rate
    advance(9.0).await;
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_eq!(status.voice.rate, 1.0);
    assert_eq!(h.synth.texts(), vec!["a", "a"]);
    assert_eq!(h.backend.speech_plays(), 2);
}

// ========================================
// Preview gate
// ========================================

#[tokio::test(start_paused = true)]
async fn test_preview_expires_once_then_denies() {
    let mut h = Harness::standard();
    h.controller
        .update_settings(SettingsChange::Affirmations(vec!["a".to_string()]))
        .await
        .unwrap();
    h.controller.load(MAIN_URL, None).await.unwrap();

    let outcome = h.controller.toggle_play().await.unwrap();
    assert_eq!(
        outcome,
        PlayOutcome::Preview {
            window: Duration::from_secs(5)
        }
    );
    advance(4.9).await;
    assert_eq!(h.controller.status().await.unwrap().state, PlaybackState::Playing);

    advance(1.1).await;
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Paused);
    assert!(status.has_previewed_once);
    assert_near(status.position_secs, 5.0, "stopped at window");

    let events = h.drain();
    assert_eq!(upgrade_prompts(&events), vec![UpgradeReason::PreviewExpired]);
    assert_eq!(playing_signals(&events), vec![true, false]);
    assert_eq!(h.store.write_count(), 1);

    assert_eq!(h.controller.toggle_play().await.unwrap(), PlayOutcome::Denied);
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Paused);
    let events = h.drain();
    assert_eq!(upgrade_prompts(&events), vec![UpgradeReason::PreviewExhausted]);
    assert!(playing_signals(&events).is_empty());
    assert_eq!(h.store.write_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_pause_clears_preview_timer() {
    let mut h = Harness::standard();
    h.controller.load(MAIN_URL, None).await.unwrap();

    h.controller.play().await.unwrap();
    advance(2.0).await;
    h.controller.pause().await.unwrap();
    advance(10.0).await;

    let events = h.drain();
    assert!(upgrade_prompts(&events).is_empty());
    assert!(!h.controller.status().await.unwrap().has_previewed_once);
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_entitlement_during_preview_lifts_limit() {
    let mut h = Harness::standard();
    h.controller.load(MAIN_URL, None).await.unwrap();

    assert!(matches!(
        h.controller.play().await.unwrap(),
        PlayOutcome::Preview { .. }
    ));
    advance(2.0).await;
    h.controller.set_entitlement(true).await.unwrap();
    advance(10.0).await;

    assert_eq!(h.controller.status().await.unwrap().state, PlaybackState::Playing);
    assert!(upgrade_prompts(&h.drain()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_track_ending_inside_preview_uses_it_up() {
    let mut h = Harness::new(
        ScriptedBackend::new().with_track("short.mp3", 3.0),
        ScriptedSynth::new(Duration::from_millis(200), 2.0),
    );
    h.controller.load("short.mp3", None).await.unwrap();

    assert!(matches!(
        h.controller.play().await.unwrap(),
        PlayOutcome::Preview { .. }
    ));
    advance(3.5).await;

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Ended);
    assert!(status.has_previewed_once);
    let events = h.drain();
    assert_eq!(session_ends(&events), vec![false]);
    assert_eq!(upgrade_prompts(&events), vec![UpgradeReason::PreviewExpired]);
    assert_eq!(h.store.write_count(), 1);

    // No second preview from the top of the track
    assert_eq!(h.controller.play().await.unwrap(), PlayOutcome::Denied);
    advance(10.0).await;
    assert_eq!(upgrade_prompts(&h.drain()), vec![UpgradeReason::PreviewExhausted]);
}

#[tokio::test(start_paused = true)]
async fn test_resume_pending_restores_session() {
    let h = Harness::standard();
    h.controller
        .update_settings(SettingsChange::Affirmations(vec![
            "one".to_string(),
            "two".to_string(),
        ]))
        .await
        .unwrap();
    h.controller
        .update_settings(SettingsChange::RepetitionInterval(12.0))
        .await
        .unwrap();
    h.controller.load(MAIN_URL, None).await.unwrap();

    h.controller.play().await.unwrap();
    advance(6.0).await;

    let snapshot = h.controller.resume_pending().await.unwrap().unwrap();
    assert_eq!(snapshot.affirmations, vec!["one", "two"]);
    assert_eq!(snapshot.audio_url.as_deref(), Some(MAIN_URL));
    assert_eq!(snapshot.repetition_interval, 12.0);

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.affirmation_count, 2);
    assert_eq!(status.mix.repetition_interval_secs, 12.0);

    // Taken once
    assert!(h.controller.resume_pending().await.unwrap().is_none());
}

// ========================================
// Load
// ========================================

#[tokio::test(start_paused = true)]
async fn test_newer_load_supersedes_pending_one() {
    let h = Harness::new(
        ScriptedBackend::new()
            .with_track("slow.mp3", 90.0)
            .with_delay("slow.mp3", Duration::from_secs(2)),
        ScriptedSynth::new(Duration::from_millis(200), 2.0),
    );

    let controller = h.controller.clone();
    let first = tokio::spawn(async move { controller.load("slow.mp3", None).await });
    advance(0.1).await;
    assert_eq!(h.controller.status().await.unwrap().state, PlaybackState::Loading);

    assert_eq!(h.controller.load(MAIN_URL, None).await.unwrap(), MAIN_SECS);
    assert!(matches!(first.await.unwrap(), Err(Error::Cancelled)));

    advance(3.0).await;
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Ready);
    assert_eq!(status.audio_url.as_deref(), Some(MAIN_URL));
    assert_eq!(status.duration_secs, MAIN_SECS);
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_enters_errored_and_recovers() {
    let mut h = Harness::standard();

    let err = h.controller.load("missing.mp3", None).await.unwrap_err();
    assert!(matches!(err, Error::Load { .. }));
    assert_eq!(h.controller.status().await.unwrap().state, PlaybackState::Errored);
    assert_eq!(error_count(&h.drain()), 1);

    assert!(matches!(
        h.controller.play().await.unwrap_err(),
        Error::InvalidState(_)
    ));

    h.controller.load(MAIN_URL, None).await.unwrap();
    assert_eq!(h.controller.status().await.unwrap().state, PlaybackState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_frequency_load_failure_is_fatal() {
    let h = Harness::standard();
    let err = h
        .controller
        .load(MAIN_URL, Some("missing.wav".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Load { .. }));

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Errored);
    assert_eq!(status.duration_secs, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_load_while_playing_stops_everything() {
    let h = Harness::new(
        ScriptedBackend::new().with_track("next.mp3", 120.0),
        ScriptedSynth::new(Duration::from_millis(200), 2.0),
    );
    h.entitled_session(&["a", "b"], 5.0).await;
    h.controller.play().await.unwrap();
    advance(1.1).await;

    assert_eq!(h.controller.load("next.mp3", None).await.unwrap(), 120.0);
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Ready);
    assert!(!status.playing);

    advance(10.0).await;
    assert_eq!(h.synth.texts(), vec!["a"]);
    assert_eq!(h.backend.speech_plays(), 0);
}

// ========================================
// Rejected playback
// ========================================

#[tokio::test(start_paused = true)]
async fn test_rejected_play_reverts_to_paused_without_retry() {
    let mut h = Harness::new(
        ScriptedBackend::new().with_rejecting(MAIN_URL),
        ScriptedSynth::new(Duration::from_millis(200), 2.0),
    );
    h.controller
        .update_settings(SettingsChange::Affirmations(vec!["a".to_string()]))
        .await
        .unwrap();
    h.controller.load(MAIN_URL, None).await.unwrap();
    h.drain();

    let err = h.controller.play().await.unwrap_err();
    assert!(matches!(err, Error::PlaybackRejected(_)));

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Paused);
    assert!(!status.playing);
    assert_eq!(status.scheduler, SchedulerPhase::Idle);

    // Preview window never armed, loop never started
    advance(10.0).await;
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Paused);
    assert!(!status.has_previewed_once);
    let events = h.drain();
    assert_eq!(error_count(&events), 1);
    assert!(upgrade_prompts(&events).is_empty());
    assert!(!playing_signals(&events).contains(&true));
    assert!(h.synth.texts().is_empty());
    assert_eq!(h.store.write_count(), 0);
    assert_eq!(h.backend.rejected_plays(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_frequency_track_pauses_main() {
    let mut h = Harness::new(
        ScriptedBackend::new()
            .with_track("tone.wav", 10.0)
            .with_rejecting("tone.wav"),
        ScriptedSynth::new(Duration::from_millis(200), 2.0),
    );
    h.controller.set_entitlement(true).await.unwrap();
    h.controller
        .load(MAIN_URL, Some("tone.wav".to_string()))
        .await
        .unwrap();
    h.drain();

    assert!(matches!(
        h.controller.play().await.unwrap_err(),
        Error::PlaybackRejected(_)
    ));
    advance(2.0).await;

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Paused);
    assert!(!status.playing);
    assert_near(status.position_secs, 0.0, "main held at start");
    assert_eq!(error_count(&h.drain()), 1);
    assert_eq!(h.backend.rejected_plays(), 1);
}

// ========================================
// End of track
// ========================================

#[tokio::test(start_paused = true)]
async fn test_main_track_end_without_repeat() {
    let mut h = Harness::new(
        ScriptedBackend::new().with_track("short.mp3", 3.0),
        ScriptedSynth::new(Duration::from_millis(200), 2.0),
    );
    h.controller.set_entitlement(true).await.unwrap();
    h.controller.load("short.mp3", None).await.unwrap();

    h.controller.play().await.unwrap();
    advance(3.5).await;

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Ended);
    assert!(!status.playing);
    let events = h.drain();
    assert_eq!(session_ends(&events), vec![false]);
    assert_eq!(playing_signals(&events), vec![true, false]);

    // Play from Ended starts over
    h.controller.play().await.unwrap();
    advance(1.0).await;
    assert_near(
        h.controller.status().await.unwrap().position_secs,
        1.0,
        "restart position",
    );
}

#[tokio::test(start_paused = true)]
async fn test_main_track_end_silences_speech() {
    let mut h = Harness::new(
        ScriptedBackend::new().with_track("short.mp3", 3.0),
        ScriptedSynth::new(Duration::from_millis(200), 4.0),
    );
    h.controller.set_entitlement(true).await.unwrap();
    h.controller
        .update_settings(SettingsChange::Affirmations(vec![
            "a".to_string(),
            "b".to_string(),
        ]))
        .await
        .unwrap();
    h.controller.load("short.mp3", None).await.unwrap();

    h.controller.play().await.unwrap();
    advance(2.0).await;
    assert!(matches!(
        h.controller.status().await.unwrap().scheduler,
        SchedulerPhase::Speaking { index: 0 }
    ));
    assert_eq!(h.backend.live_speech(), 1);

    advance(1.5).await;
    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Ended);
    assert_eq!(status.scheduler, SchedulerPhase::Stopped);
    assert_eq!(h.backend.live_speech(), 0);

    advance(10.0).await;
    let events = h.drain();
    assert!(!events
        .iter()
        .any(|e| matches!(e, SublEvent::AffirmationEnded { .. })));
    assert_eq!(started_indices(&events), vec![0]);
    assert_eq!(h.synth.texts(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_main_track_end_with_repeat_restarts_session() {
    let mut h = Harness::new(
        ScriptedBackend::new().with_track("short.mp3", 3.0),
        ScriptedSynth::new(Duration::from_millis(200), 2.0),
    );
    h.controller.set_entitlement(true).await.unwrap();
    h.controller
        .update_settings(SettingsChange::RepeatSession(true))
        .await
        .unwrap();
    h.controller.load("short.mp3", None).await.unwrap();

    h.controller.play().await.unwrap();
    advance(3.5).await;

    let status = h.controller.status().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_near(status.position_secs, 0.5, "position after restart");
    assert_eq!(session_ends(&h.drain()), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_controller() {
    let h = Harness::standard();
    h.entitled_session(&["a"], 5.0).await;
    h.controller.play().await.unwrap();

    h.controller.shutdown().await.unwrap();
    assert!(matches!(
        h.controller.status().await.unwrap_err(),
        Error::Internal(_)
    ));
}
