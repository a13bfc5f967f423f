//! Identifiers shared by the playback components

use crate::error::IngressError;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;

/// Address of one segment
///
/// Opaque to the player apart from being fetchable. The trimmed text is the
/// identity, so it doubles as the dedup key. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentLocator(Arc<str>);

impl SegmentLocator {
    /// Validate and wrap a locator received from the producer
    pub fn parse(raw: &str) -> Result<Self, IngressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IngressError::MalformedEvent("empty locator".to_string()));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(IngressError::MalformedEvent(format!(
                "locator contains control characters: {:?}",
                trimmed
            )));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SegmentLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SegmentLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Identity of one load attempt
///
/// A retry of the same locator gets a fresh id, so events still in flight
/// from a released attempt never match a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// When to begin loading the next segment, measured as remaining play time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrefetchThreshold {
    /// Fixed remaining time
    Fixed(Duration),
    /// Fraction of the playing segment's duration
    Fraction(f64),
}

impl PrefetchThreshold {
    /// Remaining-time threshold for a segment of `duration`
    pub fn for_duration(&self, duration: Duration) -> Duration {
        match *self {
            PrefetchThreshold::Fixed(threshold) => threshold,
            PrefetchThreshold::Fraction(fraction) => duration.mul_f64(fraction),
        }
    }
}
