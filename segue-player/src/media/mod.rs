//! Media layer: fetching, probing and (simulated) output of segments
//!
//! The controller never touches bytes. It talks to a [`MediaBackend`]
//! through handle ids, and the backend reports back through a
//! [`MediaEventSender`].

pub mod clocked;
pub mod fetch;
pub mod probe;

pub use clocked::ClockedBackend;
pub use fetch::{ByteRange, FetchedRange, HttpFetcher, MemoryFetcher, ResourceFetcher};

use crate::playback::{HandleId, MediaEvent, SegmentLocator};
use tokio::sync::mpsc;

/// Channel media backends report handle events on
pub type MediaEventSender = mpsc::UnboundedSender<MediaEvent>;

/// Playable-resource abstraction driven by the playback engine
///
/// Calls return immediately. Outcomes (ready, started, position, ended,
/// failed, blocked) arrive later as [`MediaEvent`]s for the same handle.
pub trait MediaBackend: Send + Sync + 'static {
    /// Start fetching and probing `locator`; report `Ready` or `Failed`
    fn load(&self, handle: HandleId, locator: SegmentLocator, events: MediaEventSender);

    /// Start audible output of a ready handle; report `Started` or `PlayBlocked`
    fn play(&self, handle: HandleId);

    /// Stop output and drop the handle, cancelling any in-flight load
    fn release(&self, handle: HandleId);

    /// A user gesture happened; later `play` calls may start output
    fn unlock(&self) {}
}
