//! Event ingress: producer notifications into the playback engine
//!
//! Parses the inbound message contract, validates locators and forwards
//! them to the engine, which deduplicates against the queue and the
//! active/preloading handles. Malformed payloads are logged and dropped
//! without touching playback state.

use crate::error::IngressError;
use crate::playback::{AdmitOutcome, EngineHandle, SegmentLocator};
use segue_common::events::InboundMessage;
use serde::Serialize;
use tracing::{debug, info, warn};

/// What became of one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressOutcome {
    /// Appended to the queue
    Queued,
    /// Already queued, preloading or active
    Duplicate,
    /// Previously abandoned; refused
    Abandoned,
    /// Producer session echo forwarded to hosts
    SessionEcho,
    /// Informational or unknown message type
    Ignored,
}

impl From<AdmitOutcome> for IngressOutcome {
    fn from(outcome: AdmitOutcome) -> Self {
        match outcome {
            AdmitOutcome::Queued => IngressOutcome::Queued,
            AdmitOutcome::Duplicate => IngressOutcome::Duplicate,
            AdmitOutcome::Abandoned => IngressOutcome::Abandoned,
        }
    }
}

/// Adapter from the producer's event channel to the engine
#[derive(Clone)]
pub struct EventIngress {
    engine: EngineHandle,
}

impl EventIngress {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    /// Handle one raw text message from the event channel
    pub async fn handle_raw(&self, raw: &str) -> Result<IngressOutcome, IngressError> {
        let message = InboundMessage::parse(raw).map_err(|e| {
            warn!("Dropping malformed event: {}", e);
            IngressError::MalformedEvent(e.to_string())
        })?;
        self.handle(message).await
    }

    /// Handle one parsed message
    pub async fn handle(&self, message: InboundMessage) -> Result<IngressOutcome, IngressError> {
        match message {
            InboundMessage::SegmentReady { locator } => {
                let locator = SegmentLocator::parse(&locator).inspect_err(|e| {
                    warn!("Dropping segment_ready: {}", e);
                })?;

                let outcome = self.engine.segment_ready(locator.clone()).await?;
                match outcome {
                    AdmitOutcome::Queued => debug!("Segment ready: {}", locator),
                    AdmitOutcome::Duplicate => debug!("Discarded duplicate segment_ready: {}", locator),
                    AdmitOutcome::Abandoned => info!("Ignoring abandoned segment {}", locator),
                }
                Ok(outcome.into())
            }
            InboundMessage::PlaybackStarted => {
                self.engine.producer_session_started()?;
                Ok(IngressOutcome::SessionEcho)
            }
            InboundMessage::Informational { kind } => {
                debug!("Informational producer event: {}", kind);
                Ok(IngressOutcome::Ignored)
            }
            InboundMessage::Unrecognized { kind } => {
                debug!("Ignoring unrecognized producer event type '{}'", kind);
                Ok(IngressOutcome::Ignored)
            }
        }
    }
}
