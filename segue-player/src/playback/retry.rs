//! Bounded retry policy for segment load failures
//!
//! A failing segment is retried after a fixed backoff until its failure
//! count reaches `max_retries`; then it is abandoned for the rest of the
//! session so the controller can move on.

use super::types::SegmentLocator;
use std::collections::HashMap;
use std::time::Duration;

/// What to do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try the same locator again after `after`
    Retry { attempt: u32, after: Duration },
    /// Give up on the locator
    Abandon { failures: u32 },
}

/// `(max_retries, backoff)` parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Decision for a locator that has now failed `failures` times
    pub fn decide(&self, failures: u32) -> RetryDecision {
        if failures < self.max_retries {
            RetryDecision::Retry {
                attempt: failures,
                after: self.backoff,
            }
        } else {
            RetryDecision::Abandon { failures }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

/// Per-locator failure counters for one session
#[derive(Debug, Default, Clone)]
pub struct RetryLedger {
    failures: HashMap<SegmentLocator, u32>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a failure and return the decision for it
    ///
    /// The counter saturates at the policy maximum.
    pub fn record_failure(&mut self, locator: &SegmentLocator, policy: &RetryPolicy) -> RetryDecision {
        let count = self.failures.entry(locator.clone()).or_insert(0);
        *count = (*count + 1).min(policy.max_retries());
        policy.decide(*count)
    }

    /// Failures recorded for `locator`
    pub fn failures(&self, locator: &SegmentLocator) -> u32 {
        self.failures.get(locator).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.failures.clear();
    }
}
