//! segue-player: gapless playback of producer-rendered audio segments
//!
//! A producer renders a continuous mix as a stream of short segments and
//! announces each one as it becomes ready. This crate turns those
//! announcements into uninterrupted playback: it queues segments in arrival
//! order, prefetches the next one, starts it inside a short overlap window
//! before the current one ends, retries failed loads a bounded number of
//! times, and asks the producer for more segments without flooding it.

pub mod api;
pub mod config;
pub mod error;
pub mod ingress;
pub mod media;
pub mod playback;
pub mod sse;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use ingress::{EventIngress, IngressOutcome};
pub use playback::{EngineHandle, PlaybackController, PlaybackEngine};
