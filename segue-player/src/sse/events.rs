//! Event types carried over SSE
//!
//! Both outbound streams (producer signals and host events) are plain
//! serde types from segue-common; this trait only names them on the wire.

use segue_common::events::{OutboundMessage, PlayerEvent};
use serde::Serialize;

/// A value that can be pushed to SSE clients
pub trait SseEvent: Serialize + Clone + Send + Sync + 'static {
    /// SSE `event:` field
    fn event_name(&self) -> &'static str;
}

impl SseEvent for OutboundMessage {
    fn event_name(&self) -> &'static str {
        self.kind()
    }
}

impl SseEvent for PlayerEvent {
    fn event_name(&self) -> &'static str {
        self.kind()
    }
}
