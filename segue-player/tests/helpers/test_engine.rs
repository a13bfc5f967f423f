//! Engine harness over an in-memory segment store

use super::audio_generator::silent_wav;
use segue_common::events::{OutboundMessage, PlayerEvent};
use segue_player::config::{AutoplayPolicy, ControllerConfig, MediaSettings};
use segue_player::media::{ClockedBackend, MemoryFetcher};
use segue_player::playback::{AdmitOutcome, PrefetchThreshold, RetryPolicy, SegmentLocator};
use segue_player::{EngineHandle, EventIngress, PlaybackEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;

/// Short thresholds so a whole session fits in a few virtual seconds
pub fn fast_config() -> ControllerConfig {
    ControllerConfig {
        prefetch: PrefetchThreshold::Fixed(Duration::from_secs(1)),
        overlap_window: Duration::from_millis(200),
        min_queue: 2,
        retry: RetryPolicy::new(2, Duration::from_millis(200)),
        replenish_cooldown: Duration::from_secs(10),
        load_timeout: Duration::from_secs(15),
    }
}

pub fn media_settings(autoplay: AutoplayPolicy) -> MediaSettings {
    MediaSettings {
        probe_bytes: 1024,
        position_interval_ms: 50,
        autoplay,
    }
}

/// Running engine plus subscriptions taken before it started
pub struct TestEngine {
    pub handle: EngineHandle,
    pub ingress: EventIngress,
    pub fetcher: Arc<MemoryFetcher>,
    pub signals: broadcast::Receiver<OutboundMessage>,
    pub events: broadcast::Receiver<PlayerEvent>,
    pub task: JoinHandle<()>,
}

impl TestEngine {
    pub fn start(config: ControllerConfig, autoplay: AutoplayPolicy) -> Self {
        let fetcher = Arc::new(MemoryFetcher::new());
        let backend = Arc::new(ClockedBackend::new(Arc::clone(&fetcher), media_settings(autoplay)));
        let (engine, handle) = PlaybackEngine::new(config, backend);

        let signals = handle.subscribe_signals();
        let events = handle.subscribe_events();
        let task = tokio::spawn(engine.run());

        Self {
            ingress: handle.ingress(),
            handle,
            fetcher,
            signals,
            events,
            task,
        }
    }

    /// Store a segment of `duration_ms` and return its locator
    pub fn add_segment(&self, name: &str, duration_ms: u64) -> String {
        let locator = format!("/segments/{}.wav", name);
        self.fetcher.insert(&locator, silent_wav(duration_ms));
        locator
    }

    pub async fn announce(&self, locator: &str) -> AdmitOutcome {
        self.handle
            .segment_ready(SegmentLocator::parse(locator).expect("valid locator"))
            .await
            .expect("engine running")
    }

    /// Wait for the next host event matching `pred`
    pub async fn wait_for<F>(&mut self, pred: F) -> PlayerEvent
    where
        F: FnMut(&PlayerEvent) -> bool,
    {
        next_event(&mut self.events, pred).await
    }

    /// Signals sent so far, without waiting
    pub fn drain_signals(&mut self) -> Vec<OutboundMessage> {
        let mut drained = Vec::new();
        loop {
            match self.signals.try_recv() {
                Ok(message) => drained.push(message),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        drained
    }
}

/// Next item on `rx` matching `pred`, failing after a minute of (virtual) time
pub async fn next_event<T, F>(rx: &mut broadcast::Receiver<T>, mut pred: F) -> T
where
    T: Clone + std::fmt::Debug,
    F: FnMut(&T) -> bool,
{
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(item) if pred(&item) => return item,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("stream closed while waiting"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .expect("timed out waiting for event")
}

pub fn is_started(event: &PlayerEvent, locator: &str) -> bool {
    matches!(event, PlayerEvent::SegmentStarted { locator: l, .. } if l == locator)
}
