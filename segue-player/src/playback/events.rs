//! Controller inputs and outputs
//!
//! The controller does no I/O. Media backends report [`MediaEvent`]s, the
//! engine delivers [`Timer`]s it was asked to arm, and every decision comes
//! back out as an [`Effect`] for the engine to carry out.

use super::types::{HandleId, SegmentLocator};
use crate::error::MediaError;
use segue_common::events::{OutboundMessage, PlayerEvent};
use std::time::Duration;

/// Notification from the media backend about one handle
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Enough is buffered to play through; duration is known
    Ready { handle: HandleId, duration: Duration },

    /// play() succeeded, output is audible
    Started { handle: HandleId },

    /// Periodic playback position
    Position { handle: HandleId, position: Duration },

    /// Playback reached the natural end
    Ended { handle: HandleId },

    /// Load or playback failed
    Failed { handle: HandleId, error: MediaError },

    /// The platform refused to start without a user gesture
    PlayBlocked { handle: HandleId },
}

impl MediaEvent {
    /// Handle the event refers to
    pub fn handle(&self) -> HandleId {
        match self {
            MediaEvent::Ready { handle, .. }
            | MediaEvent::Started { handle }
            | MediaEvent::Position { handle, .. }
            | MediaEvent::Ended { handle }
            | MediaEvent::Failed { handle, .. }
            | MediaEvent::PlayBlocked { handle } => *handle,
        }
    }
}

/// Deferred controller wake-ups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Backoff elapsed for the failed attempt `handle`
    Retry { handle: HandleId },

    /// Load deadline for `handle`
    LoadTimeout { handle: HandleId },
}

/// Work the engine must carry out on behalf of the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Begin fetching/decoding `locator` as `handle`
    Load { handle: HandleId, locator: SegmentLocator },

    /// Start audible output of a ready handle
    Play { handle: HandleId },

    /// Stop and discard a handle (cancels an in-flight load)
    Release { handle: HandleId },

    /// Deliver `timer` back to the controller after `after`
    Schedule { timer: Timer, after: Duration },

    /// Message for the producer
    Send(OutboundMessage),

    /// Event for hosts
    Report(PlayerEvent),
}

/// Result of offering a locator to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// Appended to the queue (or started immediately when idle)
    Queued,

    /// Already queued, preloading or active; nothing changed
    Duplicate,

    /// Previously abandoned in this session; refused
    Abandoned,
}
