//! Media handle: one load attempt of one segment

use super::types::{HandleId, SegmentLocator};
use serde::Serialize;
use std::time::Duration;

/// Lifecycle of a media handle
///
/// There is no unloaded state: a handle is created when its load is issued,
/// and an empty slot stands for "nothing loaded".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Backend is fetching/probing
    Loading,
    /// Enough is buffered to play through
    Ready,
    /// Audible
    Playing,
    /// Played to its natural end
    Ended,
    /// Load or playback failed; a retry reuses the slot
    Errored,
}

/// One playable resource instance bound to a locator
#[derive(Debug, Clone)]
pub struct MediaHandle {
    id: HandleId,
    locator: SegmentLocator,
    readiness: Readiness,
    duration: Option<Duration>,
    position: Duration,
    retry_count: u32,
}

impl MediaHandle {
    /// New handle in `Loading` state
    pub fn loading(id: HandleId, locator: SegmentLocator, retry_count: u32) -> Self {
        Self {
            id,
            locator,
            readiness: Readiness::Loading,
            duration: None,
            position: Duration::ZERO,
            retry_count,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn locator(&self) -> &SegmentLocator {
        &self.locator
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    /// Failures recorded for this locator before this attempt
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Play time left, if the duration is known
    pub fn remaining(&self) -> Option<Duration> {
        self.duration.map(|d| d.saturating_sub(self.position))
    }

    pub fn is_audible(&self) -> bool {
        self.readiness == Readiness::Playing
    }

    pub(super) fn mark_ready(&mut self, duration: Duration) {
        self.duration = Some(duration);
        self.readiness = Readiness::Ready;
    }

    pub(super) fn mark_playing(&mut self) {
        self.readiness = Readiness::Playing;
    }

    pub(super) fn mark_ended(&mut self) {
        if let Some(duration) = self.duration {
            self.position = duration;
        }
        self.readiness = Readiness::Ended;
    }

    pub(super) fn mark_errored(&mut self) {
        self.readiness = Readiness::Errored;
    }

    /// Replace with a fresh load attempt of the same locator
    pub(super) fn reload(&mut self, id: HandleId, retry_count: u32) {
        *self = Self::loading(id, self.locator.clone(), retry_count);
    }

    pub(super) fn set_position(&mut self, position: Duration) {
        self.position = match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
    }

    /// Status view
    pub fn snapshot(&self) -> HandleSnapshot {
        HandleSnapshot {
            handle_id: self.id.value(),
            locator: self.locator.to_string(),
            readiness: self.readiness,
            duration_ms: self.duration.map(|d| d.as_millis() as u64),
            position_ms: self.position.as_millis() as u64,
            retry_count: self.retry_count,
        }
    }
}

/// Serializable view of a handle
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HandleSnapshot {
    pub handle_id: u64,
    pub locator: String,
    pub readiness: Readiness,
    pub duration_ms: Option<u64>,
    pub position_ms: u64,
    pub retry_count: u32,
}
