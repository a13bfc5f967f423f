//! Playback session: the single mutable aggregate of one listening session
//!
//! Only the controller mutates it. Everything else sees it through the
//! read accessors or a [`PlaybackStatus`] snapshot.

use super::governor::ReplenishmentGovernor;
use super::handle::{HandleSnapshot, MediaHandle};
use super::queue::SegmentQueue;
use super::retry::RetryLedger;
use super::types::{HandleId, SegmentLocator};
use chrono::{DateTime, Utc};
use segue_common::events::PlayerState;
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Which slot a handle occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Slot {
    Active,
    Preloading,
    Retiring,
}

/// State of one listening session
#[derive(Debug)]
pub struct PlaybackSession {
    id: Uuid,
    started_at: DateTime<Utc>,

    pub(super) state: PlayerState,

    /// Audible handle, or the one being loaded to become audible
    pub(super) active: Option<MediaHandle>,

    /// Next segment, loading in the background
    pub(super) preloading: Option<MediaHandle>,

    /// Superseded handle finishing inside the overlap window
    pub(super) retiring: Option<MediaHandle>,

    pub(super) queue: SegmentQueue,
    pub(super) retries: RetryLedger,
    pub(super) abandoned: HashSet<SegmentLocator>,

    /// Locators already acknowledged to the producer
    pub(super) acknowledged: HashSet<SegmentLocator>,

    pub(super) governor: ReplenishmentGovernor,
}

impl PlaybackSession {
    pub fn new(replenish_cooldown: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: segue_common::time::now(),
            state: PlayerState::Idle,
            active: None,
            preloading: None,
            retiring: None,
            queue: SegmentQueue::new(),
            retries: RetryLedger::new(),
            abandoned: HashSet::new(),
            acknowledged: HashSet::new(),
            governor: ReplenishmentGovernor::new(replenish_cooldown),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn active(&self) -> Option<&MediaHandle> {
        self.active.as_ref()
    }

    pub fn preloading(&self) -> Option<&MediaHandle> {
        self.preloading.as_ref()
    }

    pub fn retiring(&self) -> Option<&MediaHandle> {
        self.retiring.as_ref()
    }

    pub fn queue(&self) -> &SegmentQueue {
        &self.queue
    }

    /// Queued, preloading or active
    pub fn is_known(&self, locator: &SegmentLocator) -> bool {
        self.queue.contains(locator)
            || self.active.as_ref().is_some_and(|h| h.locator() == locator)
            || self.preloading.as_ref().is_some_and(|h| h.locator() == locator)
    }

    pub fn is_abandoned(&self, locator: &SegmentLocator) -> bool {
        self.abandoned.contains(locator)
    }

    /// Segments lined up after the active one (queue plus preloading)
    pub fn upcoming(&self) -> usize {
        self.queue.len() + usize::from(self.preloading.is_some())
    }

    /// Number of handles producing output right now
    pub fn audible_count(&self) -> usize {
        [&self.active, &self.retiring]
            .into_iter()
            .filter(|slot| slot.as_ref().is_some_and(MediaHandle::is_audible))
            .count()
    }

    /// Instant of the last replenishment signal
    pub fn last_replenishment(&self) -> Option<Instant> {
        self.governor.last_signal()
    }

    pub fn failures(&self, locator: &SegmentLocator) -> u32 {
        self.retries.failures(locator)
    }

    pub(super) fn slot_of(&self, handle: HandleId) -> Option<Slot> {
        let matches = |slot: &Option<MediaHandle>| slot.as_ref().is_some_and(|h| h.id() == handle);
        if matches(&self.active) {
            Some(Slot::Active)
        } else if matches(&self.preloading) {
            Some(Slot::Preloading)
        } else if matches(&self.retiring) {
            Some(Slot::Retiring)
        } else {
            None
        }
    }

    pub(super) fn slot_mut(&mut self, slot: Slot) -> Option<&mut MediaHandle> {
        match slot {
            Slot::Active => self.active.as_mut(),
            Slot::Preloading => self.preloading.as_mut(),
            Slot::Retiring => self.retiring.as_mut(),
        }
    }

    /// Serializable view for status queries
    pub fn snapshot(&self) -> PlaybackStatus {
        let mut abandoned: Vec<String> = self.abandoned.iter().map(ToString::to_string).collect();
        abandoned.sort();

        PlaybackStatus {
            session_id: self.id,
            started_at: self.started_at,
            state: self.state,
            active: self.active.as_ref().map(MediaHandle::snapshot),
            preloading: self.preloading.as_ref().map(MediaHandle::snapshot),
            retiring: self.retiring.as_ref().map(MediaHandle::snapshot),
            queue: self.queue.iter().map(ToString::to_string).collect(),
            abandoned,
        }
    }
}

/// Status snapshot returned to hosts
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackStatus {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub state: PlayerState,
    pub active: Option<HandleSnapshot>,
    pub preloading: Option<HandleSnapshot>,
    pub retiring: Option<HandleSnapshot>,
    pub queue: Vec<String>,
    pub abandoned: Vec<String>,
}
