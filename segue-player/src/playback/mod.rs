//! Segment scheduling and the engine that drives it

pub mod controller;
pub mod engine;
pub mod events;
pub mod governor;
pub mod handle;
pub mod queue;
pub mod retry;
pub mod session;
pub mod types;

pub use controller::PlaybackController;
pub use engine::{EngineHandle, PlaybackEngine};
pub use events::{AdmitOutcome, Effect, MediaEvent, Timer};
pub use governor::ReplenishmentGovernor;
pub use handle::{HandleSnapshot, MediaHandle, Readiness};
pub use queue::SegmentQueue;
pub use retry::{RetryDecision, RetryLedger, RetryPolicy};
pub use session::{PlaybackSession, PlaybackStatus};
pub use types::{HandleId, PrefetchThreshold, SegmentLocator};
