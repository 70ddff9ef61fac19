//! Preview gate for unentitled listeners
//!
//! An unentitled listener gets one timed preview per session. When the
//! preview runs out (or is refused) the session is written to the resume
//! store so it can be picked up again once the listener is entitled.

use std::sync::Arc;
use std::time::Duration;
use subl_common::session::ResumeSnapshot;
use subl_common::store::SessionStore;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// Play, but stop after the window elapses
    AllowWithTimeout(Duration),
    Deny,
}

pub struct PreviewGate {
    store: Arc<dyn SessionStore>,
    window: Duration,
    has_previewed_once: bool,
}

impl PreviewGate {
    pub fn new(store: Arc<dyn SessionStore>, window: Duration) -> Self {
        Self {
            store,
            window,
            has_previewed_once: false,
        }
    }

    pub fn attempt_play(&self, is_entitled: bool) -> GateDecision {
        if is_entitled {
            GateDecision::Allow
        } else if !self.has_previewed_once {
            GateDecision::AllowWithTimeout(self.window)
        } else {
            GateDecision::Deny
        }
    }

    pub fn has_previewed_once(&self) -> bool {
        self.has_previewed_once
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Preview window elapsed
    pub fn preview_expired(&mut self, snapshot: &ResumeSnapshot) {
        if !self.has_previewed_once {
            info!("Preview window used up");
        }
        self.has_previewed_once = true;
        self.persist(snapshot);
    }

    /// Play refused after the preview was used
    pub fn denied(&mut self, snapshot: &ResumeSnapshot) {
        self.persist(snapshot);
    }

    /// Start a new session's preview allowance
    pub fn reset(&mut self) {
        self.has_previewed_once = false;
    }

    /// Read and clear the stored resume snapshot
    pub fn take_pending(&self) -> Option<ResumeSnapshot> {
        let snapshot = match self.store.load_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to read resume snapshot: {}", e);
                return None;
            }
        };
        if snapshot.is_some() {
            if let Err(e) = self.store.clear_snapshot() {
                warn!("Failed to clear resume snapshot: {}", e);
            }
        }
        snapshot
    }

    fn persist(&self, snapshot: &ResumeSnapshot) {
        if let Err(e) = self.store.save_snapshot(snapshot) {
            warn!("Failed to persist resume snapshot: {}", e);
        }
    }
}
