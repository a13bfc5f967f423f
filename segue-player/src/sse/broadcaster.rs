//! SSE broadcaster for real-time client updates

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use super::events::SseEvent;

/// Fan-out of one event type to any number of subscribers
///
/// In-process subscribers (`subscribe`) and HTTP clients
/// (`handle_sse_connection`) see the same sequence.
#[derive(Clone)]
pub struct SseBroadcaster<T: SseEvent> {
    name: &'static str,
    tx: broadcast::Sender<T>,
}

impl<T: SseEvent> SseBroadcaster<T> {
    /// Create a new SSE broadcaster
    ///
    /// # Arguments
    ///
    /// * `name` - Stream name used in log lines
    /// * `capacity` - Number of events to buffer (recommended: 100 for SSE)
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        info!("SSE broadcaster '{}' initialized with capacity {}", name, capacity);
        Self { name, tx }
    }

    /// Broadcast an event, ignoring if no clients are connected
    pub fn broadcast_lossy(&self, event: T) {
        match self.tx.send(event) {
            Ok(count) => debug!("Broadcast on '{}' to {} subscribers", self.name, count),
            Err(_) => debug!("No subscribers on '{}'", self.name),
        }
    }

    /// Get current number of connected clients
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Raw receiver for in-process consumers
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    /// Create an SSE stream for a new client connection
    pub fn subscribe_stream(&self) -> impl Stream<Item = Result<Event, Infallible>> {
        let stream = BroadcastStream::new(self.tx.subscribe());
        let name = self.name;

        stream.filter_map(move |result| async move {
            match result {
                Ok(event) => match Event::default().event(event.event_name()).json_data(&event) {
                    Ok(sse_event) => Some(Ok(sse_event)),
                    Err(e) => {
                        warn!("Failed to serialize '{}' event: {}", name, e);
                        None
                    }
                },
                Err(e) => {
                    // Lagged subscriber; keep the connection open
                    warn!("SSE client error on '{}': {:?}", name, e);
                    None
                }
            }
        })
    }

    /// Create an Axum SSE response for a new client
    pub fn handle_sse_connection(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        info!(
            "New SSE client on '{}', total clients: {}",
            self.name,
            self.client_count() + 1
        );

        Sse::new(self.subscribe_stream()).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
    }
}
