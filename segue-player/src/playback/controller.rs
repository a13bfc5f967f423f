//! Playback controller: the segment scheduling state machine
//!
//! Owns the [`PlaybackSession`] and decides when to load, prefetch, hand
//! off, retry or skip. It performs no I/O and reads no clock: every input
//! carries `now`, and every decision is returned as a list of [`Effect`]s.
//!
//! ```text
//! Idle ──admit──▶ Loading ──Started──▶ Playing ──overlap──▶ Transitioning
//!                   ▲  │                  │                      │
//!                   │  └─PlayBlocked─▶ AutoplayBlocked           │ old Ended
//!                   │        (resume)     │                      ▼
//!                   └──── Ended, queue ◀──┘                   Playing
//!                                │ empty
//!                                ▼
//!                             Starved ──admit──▶ Loading
//! ```
//!
//! Gapless handoff: when the active segment has `overlap_window` left and
//! the preloaded segment is ready, the preloaded one is started and the old
//! one keeps playing until its own end. Exactly two handles are audible in
//! that window and never more.

use super::events::{AdmitOutcome, Effect, MediaEvent, Timer};
use super::handle::{MediaHandle, Readiness};
use super::retry::RetryDecision;
use super::session::{PlaybackSession, Slot};
use super::types::{HandleId, SegmentLocator};
use crate::config::ControllerConfig;
use crate::error::MediaError;
use segue_common::events::{OutboundMessage, PlayerEvent, PlayerState};
use segue_common::time;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Segment scheduler for one listening session
pub struct PlaybackController {
    config: ControllerConfig,
    session: PlaybackSession,
    next_handle: u64,
    effects: Vec<Effect>,
}

impl PlaybackController {
    /// Create a controller with a fresh session in `Idle`
    pub fn new(config: ControllerConfig) -> Self {
        let session = PlaybackSession::new(config.replenish_cooldown);
        Self {
            config,
            session,
            next_handle: 1,
            effects: Vec::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn state(&self) -> PlayerState {
        self.session.state
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Offer a segment announced by the producer
    ///
    /// Duplicates of a queued, preloading or active locator are dropped.
    /// Starts loading straight away when nothing is playing.
    pub fn admit(&mut self, locator: SegmentLocator, now: Instant) -> (AdmitOutcome, Vec<Effect>) {
        if self.session.is_abandoned(&locator) {
            debug!("Refusing abandoned segment {}", locator);
            return (AdmitOutcome::Abandoned, self.take_effects());
        }
        if self.session.is_known(&locator) {
            debug!("Duplicate segment_ready for {}", locator);
            return (AdmitOutcome::Duplicate, self.take_effects());
        }

        self.session.queue.push_back(locator.clone());
        let queue_len = self.session.queue.len();
        info!("Queued segment {} (queue size: {})", locator, queue_len);
        self.report(PlayerEvent::SegmentQueued {
            locator: locator.to_string(),
            queue_len,
            timestamp: time::now(),
        });

        if matches!(self.session.state, PlayerState::Idle | PlayerState::Starved) {
            self.start_from_queue(now);
        }

        (AdmitOutcome::Queued, self.take_effects())
    }

    /// Apply a media backend notification
    pub fn on_media(&mut self, event: MediaEvent, now: Instant) -> Vec<Effect> {
        match self.session.slot_of(event.handle()) {
            Some(Slot::Active) => self.on_active_event(event, now),
            Some(Slot::Preloading) => self.on_preload_event(event, now),
            Some(Slot::Retiring) => self.on_retiring_event(event),
            None => debug!("Ignoring {:?} from released handle", event),
        }
        self.take_effects()
    }

    /// A timer armed through [`Effect::Schedule`] fired
    pub fn on_timer(&mut self, timer: Timer, now: Instant) -> Vec<Effect> {
        match timer {
            Timer::Retry { handle } => self.retry(handle),
            Timer::LoadTimeout { handle } => {
                let error = MediaError::Timeout(self.config.load_timeout);
                match self.session.slot_of(handle) {
                    Some(slot @ (Slot::Active | Slot::Preloading))
                        if self.readiness(slot) == Some(Readiness::Loading) =>
                    {
                        warn!("Load of {} timed out", handle);
                        if slot == Slot::Active {
                            self.active_failed(error, now);
                        } else {
                            self.preload_failed(error);
                        }
                    }
                    _ => debug!("Load timeout for {} no longer relevant", handle),
                }
            }
        }
        self.take_effects()
    }

    /// External resume trigger (user gesture)
    ///
    /// Only meaningful in `AutoplayBlocked`; ignored otherwise.
    pub fn resume(&mut self, _now: Instant) -> Vec<Effect> {
        if self.session.state != PlayerState::AutoplayBlocked {
            debug!("Resume ignored in state {}", self.session.state);
            return self.take_effects();
        }

        if let Some(active) = self.session.active.as_ref() {
            if active.readiness() == Readiness::Ready {
                info!("Resuming blocked segment {}", active.locator());
                let handle = active.id();
                self.effects.push(Effect::Play { handle });
                self.set_state(PlayerState::Loading);
            }
        }
        self.take_effects()
    }

    /// End the session: release every handle and forget the queue
    pub fn teardown(&mut self) -> Vec<Effect> {
        let handles = [
            self.session.active.take(),
            self.session.preloading.take(),
            self.session.retiring.take(),
        ];
        for handle in handles.into_iter().flatten() {
            self.effects.push(Effect::Release { handle: handle.id() });
        }
        let dropped = self.session.queue.len();
        self.session.queue.clear();
        self.session.retries.clear();
        self.session.governor.reset();
        info!("Session {} torn down ({} queued segments dropped)", self.session.id(), dropped);
        self.set_state(PlayerState::Idle);
        self.take_effects()
    }

    // ========================================================================
    // Per-slot event handling
    // ========================================================================

    fn on_active_event(&mut self, event: MediaEvent, now: Instant) {
        match event {
            MediaEvent::Ready { handle, duration } => {
                let state = self.session.state;
                let Some(active) = self.session.active.as_mut() else { return };
                if active.readiness() != Readiness::Loading {
                    debug!("Duplicate Ready for {}", handle);
                    return;
                }
                active.mark_ready(duration);
                debug!("{} ready ({:.1}s)", active.locator(), duration.as_secs_f64());
                if state == PlayerState::Loading {
                    self.effects.push(Effect::Play { handle });
                }
            }
            MediaEvent::Started { .. } => {
                let gapless = self.session.state == PlayerState::Transitioning;
                let Some(active) = self.session.active.as_mut() else { return };
                active.mark_playing();
                let locator = active.locator().clone();
                if matches!(
                    self.session.state,
                    PlayerState::Loading | PlayerState::AutoplayBlocked
                ) {
                    self.set_state(PlayerState::Playing);
                }
                self.acknowledge(locator, gapless);
            }
            MediaEvent::Position { position, .. } => {
                let Some(active) = self.session.active.as_mut() else { return };
                active.set_position(position);
                let audible = active.is_audible();
                if audible
                    && matches!(
                        self.session.state,
                        PlayerState::Playing | PlayerState::Transitioning
                    )
                {
                    self.evaluate(now);
                }
            }
            MediaEvent::Ended { .. } => self.active_ended(now),
            MediaEvent::Failed { error, .. } => self.active_failed(error, now),
            MediaEvent::PlayBlocked { handle } => {
                warn!("Playback of {} blocked until user gesture", handle);
                self.set_state(PlayerState::AutoplayBlocked);
            }
        }
    }

    fn on_preload_event(&mut self, event: MediaEvent, _now: Instant) {
        match event {
            MediaEvent::Ready { duration, .. } => {
                if let Some(preloading) = self.session.preloading.as_mut() {
                    if preloading.readiness() == Readiness::Loading {
                        preloading.mark_ready(duration);
                        debug!(
                            "Preloaded {} ready ({:.1}s)",
                            preloading.locator(),
                            duration.as_secs_f64()
                        );
                    }
                }
            }
            MediaEvent::Failed { error, .. } => self.preload_failed(error),
            other => debug!("Ignoring {:?} from preloading handle", other),
        }
    }

    fn on_retiring_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::Position { position, .. } => {
                if let Some(retiring) = self.session.retiring.as_mut() {
                    retiring.set_position(position);
                }
            }
            MediaEvent::Ended { .. } | MediaEvent::Failed { .. } => {
                let Some(mut retiring) = self.session.retiring.take() else { return };
                if let MediaEvent::Failed { error, .. } = &event {
                    warn!("Superseded segment {} failed while finishing: {}", retiring.locator(), error);
                }
                retiring.mark_ended();
                self.effects.push(Effect::Release { handle: retiring.id() });
                self.report(PlayerEvent::SegmentFinished {
                    locator: retiring.locator().to_string(),
                    timestamp: time::now(),
                });
                if self.session.state == PlayerState::Transitioning {
                    self.set_state(PlayerState::Playing);
                }
            }
            other => debug!("Ignoring {:?} from retiring handle", other),
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Position-driven decisions for the audible active handle
    fn evaluate(&mut self, now: Instant) {
        let Some(active) = self.session.active.as_ref() else { return };
        let (Some(duration), Some(remaining)) = (active.duration(), active.remaining()) else {
            return;
        };

        // Prefetch: move the queue head into the preloading slot
        if self.session.preloading.is_none() && remaining <= self.config.prefetch.for_duration(duration) {
            if let Some(locator) = self.session.queue.pop_front() {
                info!(
                    "Prefetching {} ({:.1}s left on current segment)",
                    locator,
                    remaining.as_secs_f64()
                );
                let handle = self.begin_load(locator);
                self.session.preloading = Some(handle);
            }
        }

        self.replenish_if_low(now);

        // Gapless handoff
        let preload_ready = self
            .session
            .preloading
            .as_ref()
            .is_some_and(|h| h.readiness() == Readiness::Ready);
        if remaining <= self.config.overlap_window && preload_ready {
            self.hand_off(remaining);
        }
    }

    /// Start the preloaded handle and let the current one finish on its own
    fn hand_off(&mut self, remaining: std::time::Duration) {
        // A third audible handle is never allowed
        if let Some(stale) = self.session.retiring.take() {
            warn!("Releasing {} early to start next handoff", stale.locator());
            self.effects.push(Effect::Release { handle: stale.id() });
        }

        let Some(next) = self.session.preloading.take() else { return };
        let next_id = next.id();
        info!(
            "Gapless handoff to {} ({}ms before end of current)",
            next.locator(),
            remaining.as_millis()
        );

        let previous = self.session.active.replace(next);
        self.session.retiring = previous;
        self.effects.push(Effect::Play { handle: next_id });
        self.set_state(PlayerState::Transitioning);
    }

    /// Active handle played to its end without a handoff
    fn active_ended(&mut self, now: Instant) {
        let Some(mut finished) = self.session.active.take() else { return };
        finished.mark_ended();
        info!("Segment {} finished", finished.locator());
        self.effects.push(Effect::Release { handle: finished.id() });
        self.report(PlayerEvent::SegmentFinished {
            locator: finished.locator().to_string(),
            timestamp: time::now(),
        });
        self.advance(now);
    }

    /// Fill the empty active slot from preloading, then the queue
    fn advance(&mut self, now: Instant) {
        if let Some(next) = self.session.preloading.take() {
            debug!("Promoting preloading {} ({:?})", next.locator(), next.readiness());
            if next.readiness() == Readiness::Ready {
                self.effects.push(Effect::Play { handle: next.id() });
            }
            // Loading or waiting on a retry: the pending work carries on as active
            self.session.active = Some(next);
            self.set_state(PlayerState::Loading);
        } else if !self.session.queue.is_empty() {
            self.start_from_queue(now);
        } else {
            info!("Queue exhausted, waiting for segments");
            self.set_state(PlayerState::Starved);
            self.replenish_if_low(now);
        }
    }

    /// Pop the queue head into the active slot
    fn start_from_queue(&mut self, now: Instant) {
        let Some(locator) = self.session.queue.pop_front() else { return };
        info!("Loading segment {}", locator);
        let handle = self.begin_load(locator);
        self.session.active = Some(handle);
        self.set_state(PlayerState::Loading);
        self.replenish_if_low(now);
    }

    /// Create a handle for `locator` and issue its load with a deadline
    fn begin_load(&mut self, locator: SegmentLocator) -> MediaHandle {
        let id = self.allocate_handle();
        let retry_count = self.session.retries.failures(&locator);
        self.push_load(id, locator.clone());
        MediaHandle::loading(id, locator, retry_count)
    }

    fn push_load(&mut self, handle: HandleId, locator: SegmentLocator) {
        self.effects.push(Effect::Load { handle, locator });
        self.effects.push(Effect::Schedule {
            timer: Timer::LoadTimeout { handle },
            after: self.config.load_timeout,
        });
    }

    fn replenish_if_low(&mut self, now: Instant) {
        let upcoming = self.session.upcoming();
        if upcoming >= self.config.min_queue {
            return;
        }
        if self.session.governor.request(now) {
            info!("Requesting more segments ({} upcoming)", upcoming);
            self.effects.push(Effect::Send(OutboundMessage::RequestSegments));
            self.report(PlayerEvent::ReplenishmentRequested {
                upcoming,
                timestamp: time::now(),
            });
        }
    }

    // ========================================================================
    // Error policy
    // ========================================================================

    fn active_failed(&mut self, error: MediaError, now: Instant) {
        let Some(active) = self.session.active.as_mut() else { return };
        active.mark_errored();
        let handle = active.id();
        let locator = active.locator().clone();
        self.effects.push(Effect::Release { handle });

        match self.session.retries.record_failure(&locator, &self.config.retry) {
            RetryDecision::Retry { attempt, after } => {
                warn!(
                    "Segment {} failed ({}), retry {} in {}ms",
                    locator,
                    error,
                    attempt,
                    after.as_millis()
                );
                self.effects.push(Effect::Schedule {
                    timer: Timer::Retry { handle },
                    after,
                });
                self.set_state(PlayerState::Loading);
            }
            RetryDecision::Abandon { failures } => {
                self.session.active = None;
                self.abandon(locator, failures, &error);
                self.advance(now);
            }
        }
    }

    fn preload_failed(&mut self, error: MediaError) {
        let Some(preloading) = self.session.preloading.as_mut() else { return };
        preloading.mark_errored();
        let handle = preloading.id();
        let locator = preloading.locator().clone();
        self.effects.push(Effect::Release { handle });

        match self.session.retries.record_failure(&locator, &self.config.retry) {
            RetryDecision::Retry { attempt, after } => {
                warn!(
                    "Preload of {} failed ({}), retry {} in {}ms",
                    locator,
                    error,
                    attempt,
                    after.as_millis()
                );
                self.effects.push(Effect::Schedule {
                    timer: Timer::Retry { handle },
                    after,
                });
            }
            RetryDecision::Abandon { failures } => {
                // Cancelled; the next position tick prefetches the new queue head
                self.session.preloading = None;
                self.abandon(locator, failures, &error);
            }
        }
    }

    /// Backoff elapsed: reload the same locator under a new handle id
    fn retry(&mut self, failed: HandleId) {
        let slot = match self.session.slot_of(failed) {
            Some(slot @ (Slot::Active | Slot::Preloading))
                if self.readiness(slot) == Some(Readiness::Errored) =>
            {
                slot
            }
            _ => {
                debug!("Retry for {} no longer relevant", failed);
                return;
            }
        };

        let Some(locator) = self.session.slot_mut(slot).map(|h| h.locator().clone()) else {
            return;
        };
        let retry_count = self.session.retries.failures(&locator);
        let id = self.allocate_handle();
        if let Some(handle) = self.session.slot_mut(slot) {
            handle.reload(id, retry_count);
        }
        info!("Retrying {} as {} (failures so far: {})", locator, id, retry_count);
        self.push_load(id, locator);
    }

    fn abandon(&mut self, locator: SegmentLocator, failures: u32, error: &MediaError) {
        warn!(
            "Abandoning segment {} after {} failures (last: {})",
            locator, failures, error
        );
        self.report(PlayerEvent::SegmentAbandoned {
            locator: locator.to_string(),
            failures,
            reason: error.to_string(),
            timestamp: time::now(),
        });
        self.session.abandoned.insert(locator);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Send the one-time "segment now audible" acknowledgment
    fn acknowledge(&mut self, locator: SegmentLocator, gapless: bool) {
        info!("Now audible: {}{}", locator, if gapless { " (gapless)" } else { "" });
        if self.session.acknowledged.insert(locator.clone()) {
            self.effects.push(Effect::Send(OutboundMessage::SegmentConsumed {
                locator: locator.to_string(),
            }));
        }
        self.report(PlayerEvent::SegmentStarted {
            locator: locator.to_string(),
            gapless,
            timestamp: time::now(),
        });
    }

    fn set_state(&mut self, to: PlayerState) {
        let from = self.session.state;
        if from == to {
            return;
        }
        info!("Playback state: {} -> {}", from, to);
        self.session.state = to;
        self.report(PlayerEvent::StateChanged {
            from,
            to,
            timestamp: time::now(),
        });
    }

    fn readiness(&self, slot: Slot) -> Option<Readiness> {
        match slot {
            Slot::Active => self.session.active.as_ref(),
            Slot::Preloading => self.session.preloading.as_ref(),
            Slot::Retiring => self.session.retiring.as_ref(),
        }
        .map(MediaHandle::readiness)
    }

    fn report(&mut self, event: PlayerEvent) {
        self.effects.push(Effect::Report(event));
    }

    fn allocate_handle(&mut self) -> HandleId {
        let id = HandleId::new(self.next_handle);
        self.next_handle += 1;
        id
    }

    fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{PrefetchThreshold, RetryPolicy};
    use std::time::Duration;

    fn loc(name: &str) -> SegmentLocator {
        SegmentLocator::parse(&format!("/segments/{}.mp3", name)).unwrap()
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            prefetch: PrefetchThreshold::Fixed(Duration::from_secs(10)),
            overlap_window: ms(200),
            min_queue: 2,
            retry: RetryPolicy::new(2, Duration::from_secs(1)),
            replenish_cooldown: Duration::from_secs(10),
            load_timeout: Duration::from_secs(15),
        }
    }

    fn position(handle: HandleId, millis: u64) -> MediaEvent {
        MediaEvent::Position {
            handle,
            position: ms(millis),
        }
    }

    fn loads(effects: &[Effect]) -> Vec<(HandleId, SegmentLocator)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Load { handle, locator } => Some((*handle, locator.clone())),
                _ => None,
            })
            .collect()
    }

    fn plays(effects: &[Effect]) -> Vec<HandleId> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Play { handle } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    fn releases(effects: &[Effect]) -> Vec<HandleId> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Release { handle } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    fn retries(effects: &[Effect]) -> Vec<(HandleId, Duration)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Schedule {
                    timer: Timer::Retry { handle },
                    after,
                } => Some((*handle, *after)),
                _ => None,
            })
            .collect()
    }

    fn replenish_count(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Send(OutboundMessage::RequestSegments)))
            .count()
    }

    fn consumed(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(OutboundMessage::SegmentConsumed { locator }) => Some(locator.clone()),
                _ => None,
            })
            .collect()
    }

    fn started(effects: &[Effect]) -> Vec<(String, bool)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Report(PlayerEvent::SegmentStarted { locator, gapless, .. }) => {
                    Some((locator.clone(), *gapless))
                }
                _ => None,
            })
            .collect()
    }

    fn only_load(effects: &[Effect], expected: &str) -> HandleId {
        let fetched = loads(effects);
        assert_eq!(fetched.len(), 1, "expected one load, got {:?}", effects);
        assert_eq!(fetched[0].1, loc(expected));
        fetched[0].0
    }

    /// Admit `name` into an idle controller and drive it to audible
    fn start_playing(c: &mut PlaybackController, name: &str, duration: Duration, now: Instant) -> HandleId {
        let (_, effects) = c.admit(loc(name), now);
        let handle = only_load(&effects, name);
        let effects = c.on_media(MediaEvent::Ready { handle, duration }, now);
        assert_eq!(plays(&effects), vec![handle]);
        c.on_media(MediaEvent::Started { handle }, now);
        assert_eq!(c.state(), PlayerState::Playing);
        handle
    }

    #[test]
    fn test_gapless_sequence_of_three_segments() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let mut audible = Vec::new();

        let (outcome, effects) = c.admit(loc("a"), t0);
        assert_eq!(outcome, AdmitOutcome::Queued);
        let a = only_load(&effects, "a");
        assert_eq!(c.admit(loc("b"), t0).0, AdmitOutcome::Queued);
        assert_eq!(c.admit(loc("c"), t0).0, AdmitOutcome::Queued);
        assert_eq!(c.state(), PlayerState::Loading);
        assert_eq!(c.session().queue().len(), 2);

        let effects = c.on_media(MediaEvent::Ready { handle: a, duration: ms(30_000) }, t0);
        assert_eq!(plays(&effects), vec![a]);
        let effects = c.on_media(MediaEvent::Started { handle: a }, t0);
        audible.extend(consumed(&effects));
        assert_eq!(started(&effects), vec![(loc("a").to_string(), false)]);
        assert_eq!(c.state(), PlayerState::Playing);

        // B starts loading once 10s remain on A
        let effects = c.on_media(position(a, 19_000), t0 + ms(19_000));
        assert!(loads(&effects).is_empty());
        let effects = c.on_media(position(a, 20_000), t0 + ms(20_000));
        let b = only_load(&effects, "b");
        assert!(!c.session().queue().contains(&loc("b")));
        assert_eq!(c.session().upcoming(), 2);

        c.on_media(MediaEvent::Ready { handle: b, duration: ms(40_000) }, t0 + ms(21_000));

        // B becomes audible 200ms before A ends
        let effects = c.on_media(position(a, 29_750), t0 + ms(29_750));
        assert!(plays(&effects).is_empty());
        let effects = c.on_media(position(a, 29_800), t0 + ms(29_800));
        assert_eq!(plays(&effects), vec![b]);
        assert_eq!(c.state(), PlayerState::Transitioning);
        assert_eq!(c.session().retiring().map(MediaHandle::id), Some(a));

        let effects = c.on_media(MediaEvent::Started { handle: b }, t0 + ms(29_800));
        audible.extend(consumed(&effects));
        assert_eq!(started(&effects), vec![(loc("b").to_string(), true)]);
        assert_eq!(c.session().audible_count(), 2);

        let effects = c.on_media(MediaEvent::Ended { handle: a }, t0 + ms(30_000));
        assert_eq!(releases(&effects), vec![a]);
        assert_eq!(c.state(), PlayerState::Playing);
        assert_eq!(c.session().audible_count(), 1);

        // Same again for C
        let effects = c.on_media(position(b, 30_000), t0 + ms(59_800));
        let c_handle = only_load(&effects, "c");
        assert_eq!(replenish_count(&effects), 1);
        c.on_media(MediaEvent::Ready { handle: c_handle, duration: ms(25_000) }, t0 + ms(60_000));
        let effects = c.on_media(position(b, 39_800), t0 + ms(69_600));
        assert_eq!(plays(&effects), vec![c_handle]);
        let effects = c.on_media(MediaEvent::Started { handle: c_handle }, t0 + ms(69_600));
        audible.extend(consumed(&effects));
        c.on_media(MediaEvent::Ended { handle: b }, t0 + ms(69_800));
        assert!(c.session().audible_count() <= 2);

        let effects = c.on_media(MediaEvent::Ended { handle: c_handle }, t0 + ms(94_600));
        assert_eq!(releases(&effects), vec![c_handle]);
        assert_eq!(c.state(), PlayerState::Starved);

        assert_eq!(
            audible,
            vec![loc("a").to_string(), loc("b").to_string(), loc("c").to_string()]
        );
    }

    #[test]
    fn test_starved_then_resupplied() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let a = start_playing(&mut c, "a", ms(30_000), t0);

        let effects = c.on_media(MediaEvent::Ended { handle: a }, t0 + ms(30_000));
        assert_eq!(releases(&effects), vec![a]);
        assert_eq!(c.state(), PlayerState::Starved);
        assert!(c.session().active().is_none());
        // Starvation asks for more once the cooldown allows it
        assert_eq!(replenish_count(&effects), 1);

        let (outcome, effects) = c.admit(loc("b"), t0 + ms(31_000));
        assert_eq!(outcome, AdmitOutcome::Queued);
        let b = only_load(&effects, "b");
        assert_eq!(c.state(), PlayerState::Loading);

        c.on_media(MediaEvent::Ready { handle: b, duration: ms(20_000) }, t0 + ms(31_500));
        let effects = c.on_media(MediaEvent::Started { handle: b }, t0 + ms(31_500));
        assert_eq!(c.state(), PlayerState::Playing);
        assert_eq!(consumed(&effects), vec![loc("b").to_string()]);
    }

    #[test]
    fn test_preload_abandoned_after_max_retries() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let a = start_playing(&mut c, "a", ms(30_000), t0);
        c.admit(loc("b"), t0);
        c.admit(loc("c"), t0);

        let effects = c.on_media(position(a, 20_000), t0 + ms(20_000));
        let b1 = only_load(&effects, "b");

        let effects = c.on_media(
            MediaEvent::Failed { handle: b1, error: MediaError::Fetch("404".to_string()) },
            t0 + ms(20_100),
        );
        assert_eq!(releases(&effects), vec![b1]);
        assert_eq!(retries(&effects), vec![(b1, Duration::from_secs(1))]);
        assert_eq!(c.session().failures(&loc("b")), 1);

        let effects = c.on_timer(Timer::Retry { handle: b1 }, t0 + ms(21_100));
        let b2 = only_load(&effects, "b");
        assert_ne!(b1, b2);
        assert_eq!(c.session().preloading().map(MediaHandle::retry_count), Some(1));

        let effects = c.on_media(
            MediaEvent::Failed { handle: b2, error: MediaError::Decode("garbage".to_string()) },
            t0 + ms(21_200),
        );
        assert_eq!(releases(&effects), vec![b2]);
        assert!(retries(&effects).is_empty());
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Report(PlayerEvent::SegmentAbandoned { failures: 2, .. })
        )));
        assert!(c.session().preloading().is_none());
        assert!(c.session().is_abandoned(&loc("b")));
        assert_eq!(c.session().failures(&loc("b")), 2);

        // Next tick moves on to C
        let effects = c.on_media(position(a, 21_300), t0 + ms(21_300));
        let c_handle = only_load(&effects, "c");
        c.on_media(MediaEvent::Ready { handle: c_handle, duration: ms(25_000) }, t0 + ms(22_000));
        let effects = c.on_media(position(a, 29_800), t0 + ms(29_800));
        assert_eq!(plays(&effects), vec![c_handle]);
        let effects = c.on_media(MediaEvent::Started { handle: c_handle }, t0 + ms(29_800));
        assert_eq!(consumed(&effects), vec![loc("c").to_string()]);

        // B is refused if announced again
        assert_eq!(c.admit(loc("b"), t0 + ms(30_000)).0, AdmitOutcome::Abandoned);
    }

    #[test]
    fn test_active_abandoned_then_starved() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();

        let (_, effects) = c.admit(loc("a"), t0);
        let a1 = only_load(&effects, "a");
        let effects = c.on_media(
            MediaEvent::Failed { handle: a1, error: MediaError::Fetch("connection reset".to_string()) },
            t0 + ms(100),
        );
        assert_eq!(retries(&effects), vec![(a1, Duration::from_secs(1))]);
        assert_eq!(c.state(), PlayerState::Loading);

        let effects = c.on_timer(Timer::Retry { handle: a1 }, t0 + ms(1_100));
        let a2 = only_load(&effects, "a");

        // Late events from the first attempt are ignored
        let effects = c.on_media(MediaEvent::Ready { handle: a1, duration: ms(30_000) }, t0 + ms(1_200));
        assert!(effects.is_empty());

        let effects = c.on_media(
            MediaEvent::Failed { handle: a2, error: MediaError::Fetch("connection reset".to_string()) },
            t0 + ms(1_300),
        );
        assert!(retries(&effects).is_empty());
        assert!(c.session().active().is_none());
        assert_eq!(c.state(), PlayerState::Starved);
        assert!(c.session().is_abandoned(&loc("a")));
    }

    #[test]
    fn test_duplicate_announcements_queue_once() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let a = start_playing(&mut c, "a", ms(30_000), t0);

        assert_eq!(c.admit(loc("b"), t0).0, AdmitOutcome::Queued);
        assert_eq!(c.admit(loc("b"), t0 + ms(1)).0, AdmitOutcome::Duplicate);
        assert_eq!(c.session().queue().len(), 1);

        // Active and preloading locators count as known too
        assert_eq!(c.admit(loc("a"), t0 + ms(2)).0, AdmitOutcome::Duplicate);
        c.on_media(position(a, 20_000), t0 + ms(20_000));
        assert_eq!(c.admit(loc("b"), t0 + ms(20_001)).0, AdmitOutcome::Duplicate);
        assert!(c.session().queue().is_empty());
    }

    #[test]
    fn test_replenishment_signals_are_rate_limited() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();

        let (_, effects) = c.admit(loc("a"), t0);
        assert_eq!(replenish_count(&effects), 1);
        let a = only_load(&effects, "a");
        c.on_media(MediaEvent::Ready { handle: a, duration: ms(60_000) }, t0);
        c.on_media(MediaEvent::Started { handle: a }, t0);

        let mut emitted = 0;
        for step in 1..=4 {
            let effects = c.on_media(position(a, step * 500), t0 + ms(step * 500));
            emitted += replenish_count(&effects);
        }
        assert_eq!(emitted, 0);
        assert_eq!(c.session().last_replenishment(), Some(t0));

        let effects = c.on_media(position(a, 10_000), t0 + ms(10_000));
        assert_eq!(replenish_count(&effects), 1);
        assert_eq!(c.session().last_replenishment(), Some(t0 + ms(10_000)));
    }

    #[test]
    fn test_no_replenishment_when_queue_is_full() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        c.admit(loc("a"), t0);
        c.admit(loc("b"), t0);
        let (_, effects) = c.admit(loc("c"), t0);
        assert_eq!(replenish_count(&effects), 0);
        assert_eq!(c.session().upcoming(), 2);
    }

    #[test]
    fn test_never_three_audible_handles() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let a = start_playing(&mut c, "a", ms(30_000), t0);
        c.admit(loc("b"), t0);
        c.admit(loc("c"), t0);

        let effects = c.on_media(position(a, 20_000), t0 + ms(20_000));
        let b = only_load(&effects, "b");
        c.on_media(MediaEvent::Ready { handle: b, duration: ms(1_000) }, t0 + ms(20_000));
        c.on_media(position(a, 29_800), t0 + ms(29_800));
        c.on_media(MediaEvent::Started { handle: b }, t0 + ms(29_800));
        assert_eq!(c.session().audible_count(), 2);

        // B is so short that C is due before A reports its end
        let effects = c.on_media(position(b, 0), t0 + ms(29_810));
        let c_handle = only_load(&effects, "c");
        c.on_media(MediaEvent::Ready { handle: c_handle, duration: ms(25_000) }, t0 + ms(29_850));
        let effects = c.on_media(position(b, 800), t0 + ms(30_600));
        assert_eq!(releases(&effects), vec![a]);
        assert_eq!(plays(&effects), vec![c_handle]);

        c.on_media(MediaEvent::Started { handle: c_handle }, t0 + ms(30_600));
        assert_eq!(c.session().audible_count(), 2);
        assert_eq!(c.session().retiring().map(MediaHandle::id), Some(b));

        // Late end of the released handle changes nothing
        let effects = c.on_media(MediaEvent::Ended { handle: a }, t0 + ms(30_700));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_autoplay_blocked_until_resume() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();

        let (_, effects) = c.admit(loc("a"), t0);
        let a = only_load(&effects, "a");
        c.on_media(MediaEvent::Ready { handle: a, duration: ms(30_000) }, t0);
        c.on_media(MediaEvent::PlayBlocked { handle: a }, t0);
        assert_eq!(c.state(), PlayerState::AutoplayBlocked);

        // Segments keep queueing while blocked
        c.admit(loc("b"), t0 + ms(500));
        assert_eq!(c.state(), PlayerState::AutoplayBlocked);
        assert_eq!(c.session().queue().len(), 1);

        let effects = c.resume(t0 + ms(5_000));
        assert_eq!(plays(&effects), vec![a]);
        assert_eq!(c.state(), PlayerState::Loading);

        let effects = c.on_media(MediaEvent::Started { handle: a }, t0 + ms(5_000));
        assert_eq!(c.state(), PlayerState::Playing);
        assert_eq!(consumed(&effects), vec![loc("a").to_string()]);

        // Resume outside AutoplayBlocked does nothing
        assert!(c.resume(t0 + ms(6_000)).is_empty());
    }

    #[test]
    fn test_load_timeout_counts_as_failure() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();

        let (_, effects) = c.admit(loc("a"), t0);
        let a = only_load(&effects, "a");
        assert!(effects.contains(&Effect::Schedule {
            timer: Timer::LoadTimeout { handle: a },
            after: Duration::from_secs(15),
        }));

        let effects = c.on_timer(Timer::LoadTimeout { handle: a }, t0 + ms(15_000));
        assert_eq!(releases(&effects), vec![a]);
        assert_eq!(retries(&effects), vec![(a, Duration::from_secs(1))]);
        assert_eq!(c.session().failures(&loc("a")), 1);
    }

    #[test]
    fn test_load_timeout_after_ready_is_ignored() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let a = start_playing(&mut c, "a", ms(30_000), t0);

        let effects = c.on_timer(Timer::LoadTimeout { handle: a }, t0 + ms(15_000));
        assert!(effects.is_empty());
        assert_eq!(c.session().failures(&loc("a")), 0);
    }

    #[test]
    fn test_consumed_acknowledged_once_per_locator() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let a1 = start_playing(&mut c, "a", ms(30_000), t0);

        c.on_media(
            MediaEvent::Failed { handle: a1, error: MediaError::Playback("device lost".to_string()) },
            t0 + ms(3_000),
        );
        assert_eq!(c.state(), PlayerState::Loading);
        let effects = c.on_timer(Timer::Retry { handle: a1 }, t0 + ms(4_000));
        let a2 = only_load(&effects, "a");

        let effects = c.on_media(MediaEvent::Ready { handle: a2, duration: ms(30_000) }, t0 + ms(4_100));
        assert_eq!(plays(&effects), vec![a2]);
        let effects = c.on_media(MediaEvent::Started { handle: a2 }, t0 + ms(4_100));
        assert!(consumed(&effects).is_empty());
        assert_eq!(started(&effects), vec![(loc("a").to_string(), false)]);
    }

    #[test]
    fn test_preload_still_loading_when_active_ends() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let a = start_playing(&mut c, "a", ms(30_000), t0);
        c.admit(loc("b"), t0);
        let effects = c.on_media(position(a, 20_000), t0 + ms(20_000));
        let b = only_load(&effects, "b");

        // No handoff without a ready preload
        let effects = c.on_media(position(a, 29_900), t0 + ms(29_900));
        assert!(plays(&effects).is_empty());

        let effects = c.on_media(MediaEvent::Ended { handle: a }, t0 + ms(30_000));
        assert_eq!(releases(&effects), vec![a]);
        assert!(plays(&effects).is_empty());
        assert!(loads(&effects).is_empty());
        assert_eq!(c.state(), PlayerState::Loading);
        assert_eq!(c.session().active().map(MediaHandle::id), Some(b));
        assert!(c.session().preloading().is_none());

        let effects = c.on_media(MediaEvent::Ready { handle: b, duration: ms(40_000) }, t0 + ms(31_000));
        assert_eq!(plays(&effects), vec![b]);
        let effects = c.on_media(MediaEvent::Started { handle: b }, t0 + ms(31_000));
        assert_eq!(c.state(), PlayerState::Playing);
        assert_eq!(consumed(&effects), vec![loc("b").to_string()]);
        assert_eq!(started(&effects), vec![(loc("b").to_string(), false)]);
    }

    #[test]
    fn test_preload_waiting_on_retry_when_active_ends() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let a = start_playing(&mut c, "a", ms(30_000), t0);
        c.admit(loc("b"), t0);
        let effects = c.on_media(position(a, 20_000), t0 + ms(20_000));
        let b = only_load(&effects, "b");

        let error = MediaError::Fetch("connection reset".to_string());
        let effects = c.on_media(MediaEvent::Failed { handle: b, error }, t0 + ms(29_500));
        assert_eq!(retries(&effects), vec![(b, Duration::from_secs(1))]);
        assert_eq!(c.session().preloading().map(MediaHandle::readiness), Some(Readiness::Errored));

        let effects = c.on_media(MediaEvent::Ended { handle: a }, t0 + ms(30_000));
        assert_eq!(releases(&effects), vec![a]);
        assert!(plays(&effects).is_empty());
        assert_eq!(c.state(), PlayerState::Loading);
        assert_eq!(c.session().active().map(MediaHandle::id), Some(b));

        // Backoff elapses: B reloads in the active slot under a new id
        let effects = c.on_timer(Timer::Retry { handle: b }, t0 + ms(30_500));
        let b2 = only_load(&effects, "b");
        assert_ne!(b2, b);
        let active = c.session().active().unwrap();
        assert_eq!(active.id(), b2);
        assert_eq!(active.readiness(), Readiness::Loading);
        assert_eq!(active.retry_count(), 1);

        // Late events from the failed attempt are ignored
        let effects = c.on_media(MediaEvent::Ready { handle: b, duration: ms(40_000) }, t0 + ms(30_600));
        assert!(effects.is_empty());

        let effects = c.on_media(MediaEvent::Ready { handle: b2, duration: ms(40_000) }, t0 + ms(30_700));
        assert_eq!(plays(&effects), vec![b2]);
        c.on_media(MediaEvent::Started { handle: b2 }, t0 + ms(30_700));
        assert_eq!(c.state(), PlayerState::Playing);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut c = PlaybackController::new(test_config());
        let t0 = Instant::now();
        let a = start_playing(&mut c, "a", ms(30_000), t0);
        c.admit(loc("b"), t0);
        c.admit(loc("c"), t0);
        let effects = c.on_media(position(a, 20_000), t0 + ms(20_000));
        let b = only_load(&effects, "b");
        let error = MediaError::Fetch("connection reset".to_string());
        c.on_media(MediaEvent::Failed { handle: b, error }, t0 + ms(21_000));
        assert_eq!(c.session().failures(&loc("b")), 1);

        let effects = c.teardown();
        assert_eq!(releases(&effects), vec![a, b]);
        assert_eq!(c.session().failures(&loc("b")), 0);
        assert_eq!(c.state(), PlayerState::Idle);
        assert!(c.session().queue().is_empty());
        assert!(c.session().last_replenishment().is_none());
        assert_eq!(c.session().audible_count(), 0);
    }
}
