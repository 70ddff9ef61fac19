//! Controller actor - state, dispatch loop and notices

use super::{Command, ControllerStatus, EngineDeps};
use crate::config::EngineTiming;
use crate::error::{Error, Result};
use crate::media::{MediaBackend, MediaHandle, MediaNotice, MediaSlot, MediaState, NoticeKind};
use crate::playback::gate::PreviewGate;
use crate::playback::scheduler::{SchedulerMsg, SegmentScheduler};
use crate::speech::SpeechFetcher;
use std::sync::Arc;
use subl_common::events::{EventBus, PlaybackState, SublEvent};
use subl_common::session::PlaybackSession;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Messages the actor posts to itself from spawned tasks
pub(super) enum Internal {
    Loaded {
        load_id: u64,
        main: Result<Box<dyn MediaHandle>>,
        frequency: Option<Result<Box<dyn MediaHandle>>>,
    },
    SeekSettled {
        seek_id: u64,
    },
    PreviewElapsed {
        preview_id: u64,
    },
}

pub(super) struct ControllerActor {
    pub(super) state: PlaybackState,
    pub(super) session: PlaybackSession,
    pub(super) entitled: bool,

    /// Main (music) track
    pub(super) main: Option<Box<dyn MediaHandle>>,
    /// Secondary frequency track, phase-aligned to main
    pub(super) frequency: Option<Box<dyn MediaHandle>>,

    pub(super) scheduler: SegmentScheduler,
    pub(super) gate: PreviewGate,
    pub(super) backend: Arc<dyn MediaBackend>,
    pub(super) events: EventBus,
    pub(super) timing: EngineTiming,

    /// In-flight load and its caller
    pub(super) pending_load: Option<(u64, oneshot::Sender<Result<f64>>)>,
    pub(super) load_id: u64,

    /// State to return to once a seek settles
    pub(super) seek_resume: PlaybackState,
    pub(super) seek_id: u64,
    pub(super) settle_timer: Option<JoinHandle<()>>,

    pub(super) preview_id: u64,
    pub(super) preview_timer: Option<JoinHandle<()>>,

    pub(super) internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,
    pub(super) notice_tx: mpsc::UnboundedSender<MediaNotice>,
    notice_rx: Option<mpsc::UnboundedReceiver<MediaNotice>>,
    scheduler_rx: Option<mpsc::UnboundedReceiver<SchedulerMsg>>,
}

impl ControllerActor {
    pub(super) fn new(deps: EngineDeps) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (scheduler_tx, scheduler_rx) = mpsc::unbounded_channel();

        let fetcher = SpeechFetcher::new(
            deps.synthesizer,
            deps.system_synthesizer,
            Arc::clone(&deps.backend),
        );
        let scheduler = SegmentScheduler::new(
            fetcher,
            deps.timing,
            scheduler_tx,
            notice_tx.clone(),
            deps.events.clone(),
        );
        let gate = PreviewGate::new(deps.store, deps.timing.preview_window);

        Self {
            state: PlaybackState::Idle,
            session: PlaybackSession::new(),
            entitled: false,
            main: None,
            frequency: None,
            scheduler,
            gate,
            backend: deps.backend,
            events: deps.events,
            timing: deps.timing,
            pending_load: None,
            load_id: 0,
            seek_resume: PlaybackState::Paused,
            seek_id: 0,
            settle_timer: None,
            preview_id: 0,
            preview_timer: None,
            internal_tx,
            internal_rx: Some(internal_rx),
            notice_tx,
            notice_rx: Some(notice_rx),
            scheduler_rx: Some(scheduler_rx),
        }
    }

    /// Actor loop; returns after shutdown or when every handle is dropped
    pub(super) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let (Some(mut internal_rx), Some(mut notice_rx), Some(mut scheduler_rx)) = (
            self.internal_rx.take(),
            self.notice_rx.take(),
            self.scheduler_rx.take(),
        ) else {
            return;
        };

        let mut progress = interval(self.timing.progress_interval);
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(session_id = %self.session.id, "Playback controller started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.dispatch(command),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(msg) = internal_rx.recv() => self.on_internal(msg),
                Some(notice) = notice_rx.recv() => self.on_notice(notice),
                Some(msg) = scheduler_rx.recv() => {
                    let main_playing = self.main_playing();
                    self.scheduler.handle(msg, main_playing);
                }
                _ = progress.tick() => self.emit_progress(),
            }
        }

        info!("Playback controller stopped");
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::Load {
                url,
                frequency_url,
                reply,
            } => self.load(url, frequency_url, reply),
            Command::TogglePlay { reply } => {
                let _ = reply.send(self.toggle_play());
            }
            Command::Play { reply } => {
                let _ = reply.send(self.play());
            }
            Command::Pause { reply } => {
                self.pause();
                let _ = reply.send(());
            }
            Command::Seek { seconds, reply } => {
                let _ = reply.send(self.seek(seconds));
            }
            Command::Settings { change, reply } => {
                let _ = reply.send(self.apply_settings(change));
            }
            Command::SetEntitlement { entitled, reply } => {
                self.set_entitlement(entitled);
                let _ = reply.send(());
            }
            Command::ResumePending { reply } => {
                let _ = reply.send(self.resume_pending());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
    }

    fn on_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Loaded {
                load_id,
                main,
                frequency,
            } => self.on_loaded(load_id, main, frequency),
            Internal::SeekSettled { seek_id } => self.on_seek_settled(seek_id),
            Internal::PreviewElapsed { preview_id } => self.on_preview_elapsed(preview_id),
        }
    }

    fn on_notice(&mut self, notice: MediaNotice) {
        match notice.slot {
            MediaSlot::Speech(ticket) => self.scheduler.on_speech_notice(ticket, notice.kind),
            MediaSlot::Main => match notice.kind {
                NoticeKind::Ended => {
                    let ended = self
                        .main
                        .as_ref()
                        .is_some_and(|main| main.state() == MediaState::Ended);
                    if ended {
                        self.on_main_ended();
                    } else {
                        trace!("Ignoring stale main track end");
                    }
                }
                NoticeKind::Error(message) => {
                    let url = self.session.audio_url.clone().unwrap_or_default();
                    self.fail_session(&Error::load(url, message));
                }
            },
            MediaSlot::Frequency => match notice.kind {
                NoticeKind::Ended => {
                    // Not looped; it restarts phase-aligned on the next play or seek
                    if let Some(frequency) = self.frequency.as_mut() {
                        if frequency.state() == MediaState::Ended {
                            debug!("Frequency track ended");
                            frequency.pause();
                        }
                    }
                }
                NoticeKind::Error(message) => {
                    let url = self.session.frequency_url.clone().unwrap_or_default();
                    self.fail_session(&Error::load(url, message));
                }
            },
        }
    }

    /// True while the listener hears (or is about to hear) the music
    pub(super) fn is_playing(&self) -> bool {
        match self.state {
            PlaybackState::Playing => true,
            PlaybackState::Seeking => self.seek_resume == PlaybackState::Playing,
            _ => false,
        }
    }

    pub(super) fn main_playing(&self) -> bool {
        self.state == PlaybackState::Playing
            && self
                .main
                .as_ref()
                .is_some_and(|main| main.state() == MediaState::Playing)
    }

    /// Transition and emit state/playing signals
    pub(super) fn set_state(&mut self, new_state: PlaybackState) {
        let was_playing = self.is_playing();
        let old_state = self.state;
        self.state = new_state;

        if old_state != new_state {
            debug!(%old_state, %new_state, "Playback state changed");
            self.events.emit_lossy(SublEvent::PlaybackStateChanged {
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
        self.emit_playing_if_changed(was_playing);
    }

    pub(super) fn emit_playing_if_changed(&self, was_playing: bool) {
        let playing = self.is_playing();
        if playing != was_playing {
            self.events.emit_lossy(SublEvent::PlayingChanged {
                playing,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn emit_progress(&self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if let Some(main) = self.main.as_ref() {
            self.events.emit_lossy(SublEvent::PlaybackProgress {
                position_secs: main.position(),
                duration_secs: main.duration(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    pub(super) fn status(&self) -> ControllerStatus {
        let (position_secs, duration_secs) = self
            .main
            .as_ref()
            .map(|main| (main.position(), main.duration()))
            .unwrap_or((0.0, 0.0));

        ControllerStatus {
            session_id: self.session.id,
            state: self.state,
            playing: self.is_playing(),
            position_secs,
            duration_secs,
            frequency_position_secs: self.frequency.as_ref().map(|f| f.position()),
            audio_url: self.session.audio_url.clone(),
            frequency_url: self.session.frequency_url.clone(),
            music_track: self.session.music_track.clone(),
            category: self.session.category.clone(),
            entitled: self.entitled,
            has_previewed_once: self.gate.has_previewed_once(),
            scheduler: self.scheduler.phase(),
            affirmation_count: self.session.affirmations().len(),
            voice: self.session.voice.clone(),
            mix: self.session.mix.clone(),
        }
    }

    pub(super) fn cancel_settle(&mut self) {
        self.seek_id += 1;
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
    }

    pub(super) fn clear_preview(&mut self) {
        self.preview_id += 1;
        if let Some(timer) = self.preview_timer.take() {
            trace!("Preview timer cleared");
            timer.abort();
        }
    }

    /// Release both tracks
    pub(super) fn release_tracks(&mut self) {
        if let Some(mut main) = self.main.take() {
            main.pause();
            main.release();
        }
        if let Some(mut frequency) = self.frequency.take() {
            frequency.pause();
            frequency.release();
        }
    }

    fn shutdown(&mut self) {
        self.scheduler.stop();
        self.cancel_settle();
        self.clear_preview();
        self.release_tracks();
        if let Some((_, reply)) = self.pending_load.take() {
            let _ = reply.send(Err(Error::Cancelled));
        }
        if self.state != PlaybackState::Idle {
            self.set_state(PlaybackState::Idle);
        }
        info!("Playback controller shutting down");
    }
}
