//! Clock-driven media backend
//!
//! Fetches a prefix of each segment, probes its duration, and then plays it
//! against the tokio clock: `Started`, periodic `Position` ticks, and
//! `Ended` once the duration has elapsed. Output is not rendered; a host
//! that owns a real audio device mirrors these events.
//!
//! The tokio clock makes the whole path deterministic under
//! `tokio::time::pause()`.

use super::fetch::{ByteRange, ResourceFetcher};
use super::probe;
use super::{MediaBackend, MediaEventSender};
use crate::config::{AutoplayPolicy, MediaSettings};
use crate::error::MediaError;
use crate::playback::{HandleId, MediaEvent, SegmentLocator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

struct HandleSlot {
    events: MediaEventSender,
    duration: Option<Duration>,
    /// Load task, then clock task once playing
    task: Option<JoinHandle<()>>,
}

type Slots = Arc<Mutex<HashMap<HandleId, HandleSlot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<HandleId, HandleSlot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Media backend that plays segments on the tokio clock
pub struct ClockedBackend<F> {
    fetcher: Arc<F>,
    settings: MediaSettings,
    unlocked: AtomicBool,
    slots: Slots,
}

impl<F: ResourceFetcher> ClockedBackend<F> {
    pub fn new(fetcher: Arc<F>, settings: MediaSettings) -> Self {
        info!(
            "Clocked media backend: probe {} bytes, position every {}ms, autoplay {:?}",
            settings.probe_bytes, settings.position_interval_ms, settings.autoplay
        );
        Self {
            fetcher,
            settings,
            unlocked: AtomicBool::new(false),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handles currently held (loading, ready or playing)
    pub fn live_handles(&self) -> usize {
        lock(&self.slots).len()
    }

    fn autoplay_allowed(&self) -> bool {
        self.settings.autoplay == AutoplayPolicy::Allowed || self.unlocked.load(Ordering::SeqCst)
    }
}

/// Fetch enough of `locator` to know its duration
///
/// The prefix is probed first. If it declares no length, or is too short to
/// even open (large tags, a trailing index), the whole resource is fetched
/// and probed again, scanning packets as a last resort.
async fn prepare<F: ResourceFetcher>(
    fetcher: &F,
    locator: &SegmentLocator,
    probe_bytes: u64,
) -> Result<Duration, MediaError> {
    let extension = probe::extension_hint(locator.as_str());
    let head = fetcher.fetch_range(locator, ByteRange::prefix(probe_bytes)).await?;
    let complete = head.is_complete();
    let retained = complete.then(|| head.bytes.clone());

    let ext = extension.clone();
    match blocking(move || probe::probe_duration(head.bytes, ext.as_deref())).await {
        Ok(Some(duration)) => return Ok(duration),
        Ok(None) => debug!("{} has no declared length, reading full resource", locator),
        Err(e) if !complete => debug!("Prefix of {} not enough to probe ({}), reading full resource", locator, e),
        Err(e) => return Err(e),
    }

    let bytes = match retained {
        Some(bytes) => bytes,
        None => fetcher.fetch_range(locator, ByteRange::full()).await?.bytes,
    };
    blocking(move || probe::resource_duration(bytes, extension.as_deref())).await
}

async fn blocking<T, W>(work: W) -> Result<T, MediaError>
where
    T: Send + 'static,
    W: FnOnce() -> Result<T, MediaError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| MediaError::Decode(format!("Probe task failed: {}", e)))?
}

/// Emit Started, Position ticks and Ended for one playing handle
async fn run_clock(handle: HandleId, duration: Duration, tick: Duration, events: MediaEventSender) {
    let started = Instant::now();
    if events.send(MediaEvent::Started { handle }).is_err() {
        return;
    }

    let end = sleep_until(started + duration);
    tokio::pin!(end);
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut end => {
                let _ = events.send(MediaEvent::Ended { handle });
                return;
            }
            _ = ticker.tick() => {
                let position = started.elapsed().min(duration);
                if events.send(MediaEvent::Position { handle, position }).is_err() {
                    return;
                }
            }
        }
    }
}

impl<F: ResourceFetcher> MediaBackend for ClockedBackend<F> {
    fn load(&self, handle: HandleId, locator: SegmentLocator, events: MediaEventSender) {
        debug!("Loading {} as {}", locator, handle);
        lock(&self.slots).insert(
            handle,
            HandleSlot {
                events: events.clone(),
                duration: None,
                task: None,
            },
        );

        let fetcher = Arc::clone(&self.fetcher);
        let slots = Arc::clone(&self.slots);
        let probe_bytes = self.settings.probe_bytes;
        let task = tokio::spawn(async move {
            let result = prepare(fetcher.as_ref(), &locator, probe_bytes).await;
            let event = match result {
                Ok(duration) => {
                    match lock(&slots).get_mut(&handle) {
                        Some(slot) => slot.duration = Some(duration),
                        None => return,
                    }
                    MediaEvent::Ready { handle, duration }
                }
                Err(error) => {
                    warn!("Load of {} ({}) failed: {}", locator, handle, error);
                    MediaEvent::Failed { handle, error }
                }
            };
            let _ = events.send(event);
        });

        if let Some(slot) = lock(&self.slots).get_mut(&handle) {
            slot.task = Some(task);
        }
    }

    fn play(&self, handle: HandleId) {
        let allowed = self.autoplay_allowed();
        let mut slots = lock(&self.slots);
        let Some(slot) = slots.get_mut(&handle) else {
            warn!("play() for unknown handle {}", handle);
            return;
        };

        if !allowed {
            info!("Autoplay not permitted yet, blocking {}", handle);
            let _ = slot.events.send(MediaEvent::PlayBlocked { handle });
            return;
        }

        let Some(duration) = slot.duration else {
            let _ = slot.events.send(MediaEvent::Failed {
                handle,
                error: MediaError::Playback("play() before ready".to_string()),
            });
            return;
        };

        if let Some(previous) = slot.task.take() {
            previous.abort();
        }
        let tick = Duration::from_millis(self.settings.position_interval_ms.max(1));
        slot.task = Some(tokio::spawn(run_clock(handle, duration, tick, slot.events.clone())));
    }

    fn release(&self, handle: HandleId) {
        if let Some(slot) = lock(&self.slots).remove(&handle) {
            if let Some(task) = slot.task {
                task.abort();
            }
            debug!("Released {}", handle);
        }
    }

    fn unlock(&self) {
        if !self.unlocked.swap(true, Ordering::SeqCst) {
            info!("Audio output unlocked by user gesture");
        }
    }
}
