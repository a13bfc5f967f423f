//! Segment queue
//!
//! FIFO holding area for segments that are known but not yet loading.
//! Producer order is playback order: there is no reordering or priority.
//! Appending a locator that is already queued is refused, so the queue
//! never holds duplicates.

use super::types::SegmentLocator;
use std::collections::{HashSet, VecDeque};

/// Ordered, duplicate-free queue of segment locators
#[derive(Debug, Default, Clone)]
pub struct SegmentQueue {
    /// Play order
    order: VecDeque<SegmentLocator>,

    /// Membership index over `order`
    members: HashSet<SegmentLocator>,
}

impl SegmentQueue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail
    ///
    /// Returns false (and leaves the queue untouched) if already queued.
    pub fn push_back(&mut self, locator: SegmentLocator) -> bool {
        if !self.members.insert(locator.clone()) {
            return false;
        }
        self.order.push_back(locator);
        true
    }

    /// Next segment to play, without removing it
    pub fn peek(&self) -> Option<&SegmentLocator> {
        self.order.front()
    }

    /// Remove and return the next segment to play
    pub fn pop_front(&mut self) -> Option<SegmentLocator> {
        let locator = self.order.pop_front()?;
        self.members.remove(&locator);
        Some(locator)
    }

    pub fn contains(&self, locator: &SegmentLocator) -> bool {
        self.members.contains(locator)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate in play order
    pub fn iter(&self) -> impl Iterator<Item = &SegmentLocator> {
        self.order.iter()
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}
