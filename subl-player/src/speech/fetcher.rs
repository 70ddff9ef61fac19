//! Cancellable speech fetch
//!
//! One fetch is outstanding at a time. Starting a new fetch cancels the
//! previous one before anything else happens, and a cancelled fetch never
//! hands back a playable instance: if the audio arrives after cancellation it
//! is released on the spot.

use super::{SpeechInstance, SpeechSynthesizer, SynthesisRequest};
use crate::error::{Error, Result};
use crate::media::{MediaBackend, MediaSlot, MediaSource, NoticeSender};
use std::sync::Arc;
use subl_common::session::{AffirmationSegment, VoiceKind, VoiceSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct InFlight {
    ticket: u64,
    token: CancellationToken,
}

pub struct SpeechFetcher {
    neural: Arc<dyn SpeechSynthesizer>,
    system: Option<Arc<dyn SpeechSynthesizer>>,
    backend: Arc<dyn MediaBackend>,
    in_flight: Option<InFlight>,
    next_ticket: u64,
}

impl SpeechFetcher {
    pub fn new(
        neural: Arc<dyn SpeechSynthesizer>,
        system: Option<Arc<dyn SpeechSynthesizer>>,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        Self {
            neural,
            system,
            backend,
            in_flight: None,
            next_ticket: 1,
        }
    }

    /// Start fetching `segment` in the background
    ///
    /// Cancels any outstanding fetch first. `on_done` receives the ticket and
    /// the outcome exactly once; the outcome is `Error::Cancelled` when the
    /// fetch was cancelled. Returns the ticket.
    pub fn spawn<F>(
        &mut self,
        segment: AffirmationSegment,
        voice: &VoiceSettings,
        notices: NoticeSender,
        on_done: F,
    ) -> u64
    where
        F: FnOnce(u64, Result<SpeechInstance>) + Send + 'static,
    {
        self.cancel();

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            ticket,
            token: token.clone(),
        });

        let synthesizer = self.synthesizer_for(voice.kind);
        let backend = Arc::clone(&self.backend);
        let voice = voice.clone();
        debug!(ticket, index = segment.index, "Fetching speech");

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                r = fetch_instance(synthesizer, backend, segment, &voice, notices, ticket) => r,
            };
            let result = match result {
                Ok(instance) if token.is_cancelled() => {
                    trace!(ticket, "Discarding speech fetched after cancellation");
                    drop(instance);
                    Err(Error::Cancelled)
                }
                other => other,
            };
            on_done(ticket, result);
        });

        ticket
    }

    /// Cancel the outstanding fetch, if any
    pub fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            trace!(ticket = in_flight.ticket, "Cancelling speech fetch");
            in_flight.token.cancel();
        }
    }

    /// Claim the result for `ticket`; false when it was superseded or cancelled
    pub fn complete(&mut self, ticket: u64) -> bool {
        match &self.in_flight {
            Some(in_flight) if in_flight.ticket == ticket && !in_flight.token.is_cancelled() => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    fn synthesizer_for(&self, kind: VoiceKind) -> Option<Arc<dyn SpeechSynthesizer>> {
        match kind {
            VoiceKind::Neural => Some(Arc::clone(&self.neural)),
            VoiceKind::System => self.system.clone(),
        }
    }
}

/// Synthesize and load one segment
///
/// Load failures of the synthesized audio are reported as synthesis errors.
pub async fn fetch_instance(
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    backend: Arc<dyn MediaBackend>,
    segment: AffirmationSegment,
    voice: &VoiceSettings,
    notices: NoticeSender,
    ticket: u64,
) -> Result<SpeechInstance> {
    let synthesizer = synthesizer
        .ok_or_else(|| Error::Synthesis(format!("no synthesizer for {} voices", voice.kind)))?;

    let request = SynthesisRequest::new(segment.text.clone(), voice);
    let data = synthesizer.synthesize(&request).await?;

    let source = MediaSource::Bytes {
        label: format!("speech:{}", segment.index),
        data,
    };
    let handle = backend
        .load(source, MediaSlot::Speech(ticket), notices)
        .await
        .map_err(|e| match e {
            Error::Cancelled => Error::Cancelled,
            other => Error::Synthesis(other.to_string()),
        })?;

    let mut instance = SpeechInstance::new(segment, ticket, handle);
    instance.apply_voice(voice);
    Ok(instance)
}
