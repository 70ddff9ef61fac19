//! Affirmation segment scheduler
//!
//! Plays the affirmation list one segment at a time over the music:
//!
//! ```text
//! Idle -> Starting -> Fetching(0) -> Speaking(0) -> Gap(1) -> Fetching(1) ...
//!      ... Speaking(n-1) -> AwaitingRepeat -> Fetching(0) ...
//! any --stop--> Stopped
//! ```
//!
//! The scheduler never blocks. Timers and fetches run as spawned tasks that
//! post a [`SchedulerMsg`] back to the owner, which feeds it to
//! [`SegmentScheduler::handle`]. Every message carries the run id it was
//! issued under; `start` and `stop` bump the run id so anything issued by an
//! earlier run is dropped on arrival.

use crate::config::EngineTiming;
use crate::error::Result;
use crate::media::{NoticeKind, NoticeSender};
use crate::speech::{SpeechFetcher, SpeechInstance};
use serde::Serialize;
use std::time::Duration;
use subl_common::events::{EventBus, SublEvent};
use subl_common::session::{clamp_repetition_interval, AffirmationSegment, VoiceSettings};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Scheduler position in the affirmation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SchedulerPhase {
    Idle,
    /// Waiting out the lead-in before the first fetch
    Starting,
    Fetching { index: usize },
    Speaking { index: usize },
    /// Silence before fetching `next`
    Gap { next: usize },
    /// End of list reached; waiting the repetition interval
    AwaitingRepeat,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    LeadIn,
    Gap,
    Repeat,
}

/// Completion posted back by scheduler tasks
#[derive(Debug)]
pub enum SchedulerMsg {
    Timer {
        run: u64,
        kind: TimerKind,
    },
    Fetched {
        run: u64,
        ticket: u64,
        result: Result<SpeechInstance>,
    },
}

pub type SchedulerOutbox = mpsc::UnboundedSender<SchedulerMsg>;

pub struct SegmentScheduler {
    fetcher: SpeechFetcher,
    timing: EngineTiming,
    outbox: SchedulerOutbox,
    notices: NoticeSender,
    events: EventBus,

    run: u64,
    phase: SchedulerPhase,
    segments: Vec<AffirmationSegment>,
    repetition_interval: Duration,
    voice: VoiceSettings,

    /// The single Ready/Playing speech instance
    current: Option<SpeechInstance>,
    timer: Option<JoinHandle<()>>,
}

impl SegmentScheduler {
    pub fn new(
        fetcher: SpeechFetcher,
        timing: EngineTiming,
        outbox: SchedulerOutbox,
        notices: NoticeSender,
        events: EventBus,
    ) -> Self {
        Self {
            fetcher,
            timing,
            outbox,
            notices,
            events,
            run: 0,
            phase: SchedulerPhase::Idle,
            segments: Vec::new(),
            repetition_interval: Duration::ZERO,
            voice: VoiceSettings::default(),
            current: None,
            timer: None,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// The speech instance currently playing, if any
    pub fn current_speech(&self) -> Option<&SpeechInstance> {
        self.current.as_ref()
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, SchedulerPhase::Idle | SchedulerPhase::Stopped)
    }

    /// Begin a fresh run at segment 0
    ///
    /// Cancels whatever the previous run had outstanding. A zero `lead_in`
    /// fetches the first segment immediately.
    pub fn start(
        &mut self,
        segments: Vec<AffirmationSegment>,
        repetition_interval_secs: f64,
        voice: VoiceSettings,
        lead_in: Duration,
    ) {
        self.cancel_outstanding();
        self.run += 1;

        if segments.is_empty() {
            self.phase = SchedulerPhase::Idle;
            return;
        }

        self.segments = segments;
        self.repetition_interval = interval_duration(repetition_interval_secs);
        self.voice = voice;
        info!(
            run = self.run,
            segments = self.segments.len(),
            interval_secs = self.repetition_interval.as_secs_f64(),
            "Starting affirmation scheduler"
        );

        if lead_in.is_zero() {
            self.fetch(0);
        } else {
            self.phase = SchedulerPhase::Starting;
            self.arm_timer(lead_in, TimerKind::LeadIn);
        }
    }

    /// Cancel the in-flight fetch, the playing instance and all timers
    ///
    /// Callable from any phase; repeated calls are no-ops beyond the first.
    pub fn stop(&mut self) {
        if self.phase == SchedulerPhase::Stopped && self.current.is_none() && self.timer.is_none() {
            return;
        }
        self.cancel_outstanding();
        self.run += 1;
        if self.phase != SchedulerPhase::Idle {
            self.phase = SchedulerPhase::Stopped;
        }
        debug!(run = self.run, "Affirmation scheduler stopped");
    }

    fn cancel_outstanding(&mut self) {
        self.fetcher.cancel();
        if let Some(mut speech) = self.current.take() {
            speech.cancel();
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Process a completion posted by one of this scheduler's tasks
    ///
    /// `main_playing` gates the end-of-list restart.
    pub fn handle(&mut self, msg: SchedulerMsg, main_playing: bool) {
        match msg {
            SchedulerMsg::Timer { run, kind } => {
                if run != self.run {
                    trace!(run, current = self.run, ?kind, "Dropping stale scheduler timer");
                    return;
                }
                self.timer = None;
                self.on_timer(kind, main_playing);
            }
            SchedulerMsg::Fetched { run, ticket, result } => {
                // Claim the ticket first so a stale result is released by drop
                if !self.fetcher.complete(ticket) || run != self.run {
                    trace!(run, ticket, "Dropping stale speech fetch");
                    return;
                }
                self.on_fetched(result);
            }
        }
    }

    fn on_timer(&mut self, kind: TimerKind, main_playing: bool) {
        match (kind, self.phase) {
            (TimerKind::LeadIn, SchedulerPhase::Starting) => self.fetch(0),
            (TimerKind::Gap, SchedulerPhase::Gap { next }) => self.fetch(next),
            (TimerKind::Repeat, SchedulerPhase::AwaitingRepeat) => {
                if main_playing {
                    debug!("Repeating affirmation list");
                    self.fetch(0);
                } else {
                    debug!("Main track not playing; not repeating affirmations");
                    self.stop();
                }
            }
            (kind, phase) => trace!(?kind, ?phase, "Timer does not apply to phase"),
        }
    }

    fn on_fetched(&mut self, result: Result<SpeechInstance>) {
        let SchedulerPhase::Fetching { index } = self.phase else {
            return;
        };

        match result {
            Ok(mut speech) => match speech.play() {
                Ok(()) => {
                    debug!(index, ticket = speech.ticket(), "Speaking affirmation");
                    self.events.emit_lossy(SublEvent::AffirmationStarted {
                        index,
                        text: speech.text().to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    self.phase = SchedulerPhase::Speaking { index };
                    self.current = Some(speech);
                }
                Err(e) => {
                    warn!(index, "Affirmation playback rejected, skipping: {}", e);
                    self.advance_after(index);
                }
            },
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                warn!(index, "Affirmation fetch failed, skipping: {}", e);
                self.advance_after(index);
            }
        }
    }

    /// Notice from a speech handle, keyed by fetch ticket
    pub fn on_speech_notice(&mut self, ticket: u64, kind: NoticeKind) {
        let Some(speech) = self.current.as_ref() else {
            return;
        };
        if speech.ticket() != ticket {
            return;
        }
        if matches!(kind, NoticeKind::Ended) && !speech.has_ended() {
            trace!(ticket, "Ignoring stale speech end");
            return;
        }
        if let NoticeKind::Error(message) = &kind {
            warn!(ticket, "Speech playback error: {}", message);
        }

        let Some(mut speech) = self.current.take() else {
            return;
        };
        let index = speech.index();
        speech.finish();
        self.events.emit_lossy(SublEvent::AffirmationEnded {
            index,
            timestamp: chrono::Utc::now(),
        });
        self.advance_after(index);
    }

    /// Move on after segment `index` ended or was skipped
    fn advance_after(&mut self, index: usize) {
        let next = index + 1;
        if next < self.segments.len() {
            self.phase = SchedulerPhase::Gap { next };
            self.arm_timer(self.timing.speech_gap, TimerKind::Gap);
        } else {
            let wait = if self.repetition_interval.is_zero() {
                self.timing.repeat_fallback
            } else {
                self.repetition_interval
            };
            debug!(wait_secs = wait.as_secs_f64(), "End of affirmation list");
            self.phase = SchedulerPhase::AwaitingRepeat;
            self.arm_timer(wait, TimerKind::Repeat);
        }
    }

    fn fetch(&mut self, index: usize) {
        let Some(segment) = self.segments.get(index).cloned() else {
            self.stop();
            return;
        };
        self.phase = SchedulerPhase::Fetching { index };

        let run = self.run;
        let outbox = self.outbox.clone();
        self.fetcher
            .spawn(segment, &self.voice, self.notices.clone(), move |ticket, result| {
                let _ = outbox.send(SchedulerMsg::Fetched { run, ticket, result });
            });
    }

    fn arm_timer(&mut self, delay: Duration, kind: TimerKind) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let run = self.run;
        let outbox = self.outbox.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = outbox.send(SchedulerMsg::Timer { run, kind });
        }));
    }
}

impl Drop for SegmentScheduler {
    fn drop(&mut self) {
        self.cancel_outstanding();
    }
}

fn interval_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(clamp_repetition_interval(secs)).unwrap_or(Duration::ZERO)
}
