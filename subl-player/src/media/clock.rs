//! Clock-driven media transport
//!
//! Tracks position against the tokio clock and posts an `Ended` notice when
//! the resource runs out. Rendering is left to whoever consumes the event
//! stream; this type keeps the authoritative timeline.

use super::{MediaHandle, MediaNotice, MediaSlot, MediaState, NoticeKind, NoticeSender};
use crate::error::{Error, Result};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

/// Positions this close to the end count as ended
const END_TOLERANCE_SECS: f64 = 0.005;

/// Playback rates outside this range are clamped
const RATE_RANGE: std::ops::RangeInclusive<f32> = 0.1..=10.0;

pub struct ClockMedia {
    slot: MediaSlot,
    url: String,
    duration: f64,
    volume: f32,
    muted: bool,
    rate: f32,
    state: MediaState,
    /// Position at `started_at` (or the frozen position when not playing)
    base_position: f64,
    started_at: Option<Instant>,
    end_watch: Option<JoinHandle<()>>,
    notices: NoticeSender,
}

impl ClockMedia {
    /// Create a Ready handle for a resource of `duration` seconds
    pub fn new(slot: MediaSlot, url: impl Into<String>, duration: f64, notices: NoticeSender) -> Self {
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        Self {
            slot,
            url: url.into(),
            duration,
            volume: 1.0,
            muted: false,
            rate: 1.0,
            state: MediaState::Ready,
            base_position: 0.0,
            started_at: None,
            end_watch: None,
            notices,
        }
    }

    fn current_position(&self) -> f64 {
        match self.started_at {
            Some(started) => {
                let elapsed = started.elapsed().as_secs_f64() * self.rate as f64;
                (self.base_position + elapsed).min(self.duration)
            }
            None => self.base_position,
        }
    }

    fn at_end(&self, position: f64) -> bool {
        position >= self.duration - END_TOLERANCE_SECS
    }

    /// Freeze the running clock into `base_position`
    fn freeze(&mut self) {
        self.base_position = self.current_position();
        self.started_at = None;
    }

    fn disarm(&mut self) {
        if let Some(watch) = self.end_watch.take() {
            watch.abort();
        }
    }

    /// Restart the clock at `base_position` and schedule the end notice
    fn arm(&mut self) {
        self.disarm();
        self.started_at = Some(Instant::now());

        let remaining = ((self.duration - self.base_position).max(0.0)) / self.rate as f64;
        let notices = self.notices.clone();
        let slot = self.slot;
        trace!(?slot, remaining, "Arming end watch");
        // Unrepresentable waits never end
        let wait = Duration::try_from_secs_f64(remaining).unwrap_or(Duration::MAX);
        self.end_watch = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = notices.send(MediaNotice {
                slot,
                kind: NoticeKind::Ended,
            });
        }));
    }
}

impl MediaHandle for ClockMedia {
    fn slot(&self) -> MediaSlot {
        self.slot
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn state(&self) -> MediaState {
        if self.state == MediaState::Playing && self.at_end(self.current_position()) {
            MediaState::Ended
        } else {
            self.state
        }
    }

    fn position(&self) -> f64 {
        self.current_position()
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn muted(&self) -> bool {
        self.muted
    }

    fn rate(&self) -> f32 {
        self.rate
    }

    fn play(&mut self) -> Result<()> {
        match self.state {
            MediaState::Unloaded | MediaState::Loading | MediaState::Errored => {
                return Err(Error::InvalidState(format!(
                    "cannot play {} while {:?}",
                    self.url, self.state
                )));
            }
            MediaState::Playing if !self.at_end(self.current_position()) => return Ok(()),
            _ => {}
        }

        self.freeze();
        if self.at_end(self.base_position) {
            self.base_position = 0.0;
        }
        self.state = MediaState::Playing;
        self.arm();
        debug!(slot = ?self.slot, position = self.base_position, "Media playing");
        Ok(())
    }

    fn pause(&mut self) {
        if self.state != MediaState::Playing {
            return;
        }
        self.freeze();
        self.disarm();
        self.state = if self.at_end(self.base_position) {
            MediaState::Ended
        } else {
            MediaState::Paused
        };
    }

    fn seek(&mut self, seconds: f64) -> f64 {
        if self.state == MediaState::Unloaded {
            return 0.0;
        }
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, self.duration)
        } else {
            0.0
        };
        self.base_position = target;
        if self.state == MediaState::Playing {
            self.arm();
        } else {
            self.started_at = None;
        }
        target
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn set_rate(&mut self, rate: f32) {
        let rate = if rate.is_finite() {
            rate.clamp(*RATE_RANGE.start(), *RATE_RANGE.end())
        } else {
            1.0
        };
        if self.state == MediaState::Playing {
            self.freeze();
            self.rate = rate;
            self.arm();
        } else {
            self.rate = rate;
        }
    }

    fn release(&mut self) {
        self.disarm();
        self.started_at = None;
        self.state = MediaState::Unloaded;
    }
}

impl Drop for ClockMedia {
    fn drop(&mut self) {
        self.disarm();
    }
}
