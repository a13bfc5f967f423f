//! Playback engine: the single owner of the playback controller
//!
//! All session mutations happen inside one tokio task that drains three
//! channels (host inputs, media events, fired timers) one message at a
//! time. Other components hold an [`EngineHandle`] and only send messages.
//!
//! Controller effects are carried out here: media calls go to the
//! [`MediaBackend`], timers become sleeping tasks that post back, producer
//! signals and host events go out through SSE broadcasters.

use super::controller::PlaybackController;
use super::events::{AdmitOutcome, Effect, MediaEvent, Timer};
use super::session::PlaybackStatus;
use super::types::SegmentLocator;
use crate::config::ControllerConfig;
use crate::error::{Error, IngressError, Result};
use crate::ingress::EventIngress;
use crate::media::{MediaBackend, MediaEventSender};
use crate::sse::SseBroadcaster;
use segue_common::events::{OutboundMessage, PlayerEvent};
use segue_common::time;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Buffered events per SSE stream
const BROADCAST_CAPACITY: usize = 100;

/// Messages from hosts and the ingress edge
#[derive(Debug)]
enum EngineInput {
    SegmentReady {
        locator: SegmentLocator,
        reply: oneshot::Sender<AdmitOutcome>,
    },
    ProducerSessionStarted,
    Resume,
    Status(oneshot::Sender<PlaybackStatus>),
    Shutdown,
}

/// Clock reading for controller inputs (follows a paused tokio clock)
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

/// Event loop owning the [`PlaybackController`]
pub struct PlaybackEngine {
    controller: PlaybackController,
    backend: Arc<dyn MediaBackend>,
    inputs: mpsc::UnboundedReceiver<EngineInput>,
    media_tx: MediaEventSender,
    media_rx: mpsc::UnboundedReceiver<MediaEvent>,
    timer_tx: mpsc::UnboundedSender<Timer>,
    timer_rx: mpsc::UnboundedReceiver<Timer>,
    signals: SseBroadcaster<OutboundMessage>,
    events: SseBroadcaster<PlayerEvent>,
}

impl PlaybackEngine {
    /// Create the engine and the handle used to talk to it
    ///
    /// Nothing runs until [`PlaybackEngine::run`] is spawned, so callers can
    /// subscribe to the outbound streams first.
    pub fn new(config: ControllerConfig, backend: Arc<dyn MediaBackend>) -> (Self, EngineHandle) {
        let (input_tx, inputs) = mpsc::unbounded_channel();
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let signals = SseBroadcaster::new("signals", BROADCAST_CAPACITY);
        let events = SseBroadcaster::new("events", BROADCAST_CAPACITY);

        let handle = EngineHandle {
            tx: input_tx,
            signals: signals.clone(),
            events: events.clone(),
        };

        let engine = Self {
            controller: PlaybackController::new(config),
            backend,
            inputs,
            media_tx,
            media_rx,
            timer_tx,
            timer_rx,
            signals,
            events,
        };

        (engine, handle)
    }

    /// Create the engine and spawn it on the current runtime
    pub fn start(config: ControllerConfig, backend: Arc<dyn MediaBackend>) -> (EngineHandle, JoinHandle<()>) {
        let (engine, handle) = Self::new(config, backend);
        let task = tokio::spawn(engine.run());
        (handle, task)
    }

    /// Run until shutdown is requested or every handle is dropped
    pub async fn run(mut self) {
        let session_id = self.controller.session().id();
        info!("Playback engine started, session {}", session_id);

        self.signals.broadcast_lossy(OutboundMessage::Play);
        self.events.broadcast_lossy(PlayerEvent::SessionStarted {
            session_id,
            timestamp: time::now(),
        });

        loop {
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(EngineInput::Shutdown) | None => break,
                    Some(input) => self.handle_input(input),
                },
                Some(event) = self.media_rx.recv() => {
                    let effects = self.controller.on_media(event, now());
                    self.apply(effects);
                }
                Some(timer) = self.timer_rx.recv() => {
                    let effects = self.controller.on_timer(timer, now());
                    self.apply(effects);
                }
            }
        }

        let effects = self.controller.teardown();
        self.apply(effects);
        info!("Playback engine stopped, session {}", session_id);
    }

    fn handle_input(&mut self, input: EngineInput) {
        match input {
            EngineInput::SegmentReady { locator, reply } => {
                let (outcome, effects) = self.controller.admit(locator, now());
                self.apply(effects);
                let _ = reply.send(outcome);
            }
            EngineInput::ProducerSessionStarted => {
                info!("Producer confirmed session start");
                self.events.broadcast_lossy(PlayerEvent::ProducerSessionEcho {
                    timestamp: time::now(),
                });
            }
            EngineInput::Resume => {
                self.backend.unlock();
                let effects = self.controller.resume(now());
                self.apply(effects);
            }
            EngineInput::Status(reply) => {
                let _ = reply.send(self.controller.session().snapshot());
            }
            // Handled by the loop
            EngineInput::Shutdown => {}
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Load { handle, locator } => {
                    self.backend.load(handle, locator, self.media_tx.clone());
                }
                Effect::Play { handle } => self.backend.play(handle),
                Effect::Release { handle } => self.backend.release(handle),
                Effect::Schedule { timer, after } => self.schedule(timer, after),
                Effect::Send(message) => {
                    debug!("Signal to producer: {}", message.kind());
                    self.signals.broadcast_lossy(message);
                }
                Effect::Report(event) => self.events.broadcast_lossy(event),
            }
        }
    }

    fn schedule(&self, timer: Timer, after: Duration) {
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Engine gone: nothing left to wake
            let _ = tx.send(timer);
        });
    }
}

/// Cloneable handle to a running [`PlaybackEngine`]
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineInput>,
    signals: SseBroadcaster<OutboundMessage>,
    events: SseBroadcaster<PlayerEvent>,
}

impl EngineHandle {
    /// Offer a segment; resolves once the controller has decided
    pub async fn segment_ready(&self, locator: SegmentLocator) -> std::result::Result<AdmitOutcome, IngressError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(EngineInput::SegmentReady { locator, reply })
            .map_err(|_| IngressError::EngineStopped)?;
        outcome.await.map_err(|_| IngressError::EngineStopped)
    }

    /// The producer echoed that its session is running
    pub fn producer_session_started(&self) -> std::result::Result<(), IngressError> {
        self.tx
            .send(EngineInput::ProducerSessionStarted)
            .map_err(|_| IngressError::EngineStopped)
    }

    /// User gesture: clear `AutoplayBlocked`
    pub fn resume(&self) -> Result<()> {
        self.tx.send(EngineInput::Resume).map_err(|_| Error::EngineStopped)
    }

    /// Snapshot of the session
    pub async fn status(&self) -> Result<PlaybackStatus> {
        let (reply, status) = oneshot::channel();
        self.tx
            .send(EngineInput::Status(reply))
            .map_err(|_| Error::EngineStopped)?;
        status.await.map_err(|_| Error::EngineStopped)
    }

    /// Ask the engine to tear the session down and exit
    pub fn shutdown(&self) {
        if self.tx.send(EngineInput::Shutdown).is_err() {
            debug!("Shutdown requested but engine already stopped");
        }
    }

    /// Ingress adapter feeding this engine
    pub fn ingress(&self) -> EventIngress {
        EventIngress::new(self.clone())
    }

    /// Outbound producer signals
    pub fn signals(&self) -> &SseBroadcaster<OutboundMessage> {
        &self.signals
    }

    /// Host-facing player events
    pub fn events(&self) -> &SseBroadcaster<PlayerEvent> {
        &self.events
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<OutboundMessage> {
        self.signals.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }
}
