//! Event types exchanged with the segment producer and with hosts
//!
//! Two audiences:
//! - The **producer** (the renderer that makes segments) talks to the player
//!   with small JSON envelopes: `{"type": "...", "data": {...}}`.
//!   [`InboundMessage`] is what arrives, [`OutboundMessage`] is what leaves.
//! - The **host** (UI, monitoring) receives [`PlayerEvent`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Inbound message type: a new segment can be fetched
pub const SEGMENT_READY: &str = "segment_ready";

/// Inbound message type: producer echo that the listening session started
pub const PLAYBACK_STARTED: &str = "playback_started";

/// Inbound message types the producer broadcasts for display only
pub const INFORMATIONAL: &[&str] = &["now_playing", "decision_trace"];

/// Player controller state as seen by hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// No session activity yet, or the session was torn down
    Idle,
    /// Active segment is loading (or waiting for a retry)
    Loading,
    /// Exactly one segment is audible
    Playing,
    /// Handoff in progress: the previous segment is finishing under the new one
    Transitioning,
    /// Nothing left to play; waiting for the producer
    Starved,
    /// The platform refused to start playback without a user gesture
    AutoplayBlocked,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlayerState::Idle => "idle",
            PlayerState::Loading => "loading",
            PlayerState::Playing => "playing",
            PlayerState::Transitioning => "transitioning",
            PlayerState::Starved => "starved",
            PlayerState::AutoplayBlocked => "autoplay_blocked",
        };
        f.write_str(name)
    }
}

/// Raw inbound envelope before the payload is interpreted
#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Payload of a `segment_ready` message
///
/// The producer historically sends `segment_url`; `locator` is the canonical name.
#[derive(Debug, Deserialize)]
struct SegmentReadyData {
    #[serde(alias = "segment_url")]
    locator: String,
}

/// Messages received from the producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// A segment is ready at `locator`
    SegmentReady { locator: String },

    /// Coarse session-started echo
    PlaybackStarted,

    /// Display-only producer event (now_playing, decision_trace)
    Informational { kind: String },

    /// Any other message type
    Unrecognized { kind: String },
}

impl InboundMessage {
    /// Parse one raw inbound message
    ///
    /// Returns `Error::InvalidInput` when the text is not a JSON envelope or a
    /// `segment_ready` payload has no locator.
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: InboundEnvelope = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidInput(format!("not a message envelope: {}", e)))?;

        match envelope.kind.as_str() {
            SEGMENT_READY => {
                let data: SegmentReadyData = serde_json::from_value(envelope.data)
                    .map_err(|e| Error::InvalidInput(format!("bad segment_ready payload: {}", e)))?;
                Ok(InboundMessage::SegmentReady {
                    locator: data.locator,
                })
            }
            PLAYBACK_STARTED => Ok(InboundMessage::PlaybackStarted),
            kind if INFORMATIONAL.contains(&kind) => Ok(InboundMessage::Informational {
                kind: kind.to_string(),
            }),
            kind => Ok(InboundMessage::Unrecognized {
                kind: kind.to_string(),
            }),
        }
    }
}

/// Messages sent to the producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Listening session started; wakes the producer
    Play,

    /// Local queue is running low (rate limited by the player)
    RequestSegments,

    /// The segment at `locator` became audible for the first time
    SegmentConsumed { locator: String },
}

impl OutboundMessage {
    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Play => "play",
            OutboundMessage::RequestSegments => "request_segments",
            OutboundMessage::SegmentConsumed { .. } => "segment_consumed",
        }
    }
}

/// Host-facing player events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// A listening session was created
    SessionStarted {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The producer echoed that its session is running
    ProducerSessionEcho { timestamp: DateTime<Utc> },

    /// Controller state changed
    StateChanged {
        from: PlayerState,
        to: PlayerState,
        timestamp: DateTime<Utc>,
    },

    /// A segment was admitted to the queue
    SegmentQueued {
        locator: String,
        queue_len: usize,
        timestamp: DateTime<Utc>,
    },

    /// A segment became audible
    ///
    /// `gapless` is true when it was started inside the overlap window of its
    /// predecessor.
    SegmentStarted {
        locator: String,
        gapless: bool,
        timestamp: DateTime<Utc>,
    },

    /// A segment played to its natural end
    SegmentFinished {
        locator: String,
        timestamp: DateTime<Utc>,
    },

    /// A segment was skipped for good after repeated failures
    SegmentAbandoned {
        locator: String,
        failures: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A replenishment signal went to the producer
    ReplenishmentRequested {
        upcoming: usize,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// SSE event name
    pub fn kind(&self) -> &'static str {
        match self {
            PlayerEvent::SessionStarted { .. } => "SessionStarted",
            PlayerEvent::ProducerSessionEcho { .. } => "ProducerSessionEcho",
            PlayerEvent::StateChanged { .. } => "StateChanged",
            PlayerEvent::SegmentQueued { .. } => "SegmentQueued",
            PlayerEvent::SegmentStarted { .. } => "SegmentStarted",
            PlayerEvent::SegmentFinished { .. } => "SegmentFinished",
            PlayerEvent::SegmentAbandoned { .. } => "SegmentAbandoned",
            PlayerEvent::ReplenishmentRequested { .. } => "ReplenishmentRequested",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segment_ready_with_locator() {
        let raw = r#"{"type":"segment_ready","data":{"locator":"/audio/segments/a.mp3"}}"#;
        assert_eq!(
            InboundMessage::parse(raw).unwrap(),
            InboundMessage::SegmentReady {
                locator: "/audio/segments/a.mp3".to_string()
            }
        );
    }

    #[test]
    fn test_parse_segment_ready_with_producer_field_names() {
        let raw = json!({
            "type": "segment_ready",
            "data": {
                "segment_url": "/audio/segments/mix_01.mp3",
                "segment_path": "/srv/segments/mix_01.mp3",
                "song_uuid": "abc"
            }
        })
        .to_string();

        assert_eq!(
            InboundMessage::parse(&raw).unwrap(),
            InboundMessage::SegmentReady {
                locator: "/audio/segments/mix_01.mp3".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            InboundMessage::parse("Message text was: hello"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_rejects_segment_ready_without_locator() {
        let raw = r#"{"type":"segment_ready","data":{"song_uuid":"abc"}}"#;
        assert!(matches!(InboundMessage::parse(raw), Err(Error::InvalidInput(_))));

        let raw = r#"{"type":"segment_ready"}"#;
        assert!(matches!(InboundMessage::parse(raw), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_parse_session_and_informational_messages() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"playback_started","data":{}}"#).unwrap(),
            InboundMessage::PlaybackStarted
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"now_playing","data":{"status":"playing"}}"#).unwrap(),
            InboundMessage::Informational {
                kind: "now_playing".to_string()
            }
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"volume"}"#).unwrap(),
            InboundMessage::Unrecognized {
                kind: "volume".to_string()
            }
        );
    }

    #[test]
    fn test_outbound_wire_format() {
        assert_eq!(
            serde_json::to_value(OutboundMessage::RequestSegments).unwrap(),
            json!({"type": "request_segments"})
        );
        assert_eq!(
            serde_json::to_value(OutboundMessage::Play).unwrap(),
            json!({"type": "play"})
        );
        assert_eq!(
            serde_json::to_value(OutboundMessage::SegmentConsumed {
                locator: "/a.mp3".to_string()
            })
            .unwrap(),
            json!({"type": "segment_consumed", "data": {"locator": "/a.mp3"}})
        );
    }

    #[test]
    fn test_player_event_is_tagged() {
        let event = PlayerEvent::StateChanged {
            from: PlayerState::Starved,
            to: PlayerState::Loading,
            timestamp: crate::time::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "StateChanged");
        assert_eq!(value["from"], "starved");
        assert_eq!(value["to"], "loading");
        assert_eq!(event.kind(), "StateChanged");
    }
}
