//! Segment fetching with partial (range) reads
//!
//! Playback starts from a prefix of the resource, so every fetcher must
//! honor byte ranges. Servers that ignore `Range` and answer 200 are
//! accepted; the whole body is then treated as the resource.

use crate::error::{Error, MediaError, Result};
use crate::playback::SegmentLocator;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{StatusCode, Url};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Last byte, `None` for "to the end"
    pub end: Option<u64>,
}

impl ByteRange {
    /// First `len` bytes
    pub fn prefix(len: u64) -> Self {
        Self {
            start: 0,
            end: Some(len.saturating_sub(1)),
        }
    }

    /// The whole resource
    pub fn full() -> Self {
        Self { start: 0, end: None }
    }

    pub fn is_full(&self) -> bool {
        self.start == 0 && self.end.is_none()
    }

    /// `Range` header value; `None` when the whole resource is wanted
    pub fn header_value(&self) -> Option<String> {
        if self.is_full() {
            return None;
        }
        Some(match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        })
    }
}

/// Bytes returned for a range request
#[derive(Debug, Clone)]
pub struct FetchedRange {
    pub bytes: Vec<u8>,
    /// Size of the whole resource when the server reported it
    pub total_len: Option<u64>,
    /// True when the server honored the range (206)
    pub partial: bool,
}

impl FetchedRange {
    /// True when `bytes` is the entire resource
    pub fn is_complete(&self) -> bool {
        !self.partial || self.total_len == Some(self.bytes.len() as u64)
    }
}

/// Source of segment bytes
pub trait ResourceFetcher: Send + Sync + 'static {
    fn fetch_range(
        &self,
        locator: &SegmentLocator,
        range: ByteRange,
    ) -> impl Future<Output = std::result::Result<FetchedRange, MediaError>> + Send;
}

/// Total length from a `Content-Range: bytes 0-99/1234` header
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (unit, rest) = value.trim().split_once(' ')?;
    if unit != "bytes" {
        return None;
    }
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}

/// Fetches segments from the producer over HTTP
///
/// Relative locators (`/segments/abc.mp3`) are resolved against the
/// producer base URL; absolute URLs are used as they are.
pub struct HttpFetcher {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpFetcher {
    pub fn new(producer_url: &str) -> Result<Self> {
        let base_url = Url::parse(producer_url)
            .map_err(|e| Error::Config(format!("Invalid producer_url '{}': {}", producer_url, e)))?;

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("segue-player/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Absolute URL for a locator
    pub fn resolve(&self, locator: &SegmentLocator) -> std::result::Result<Url, MediaError> {
        self.base_url
            .join(locator.as_str())
            .map_err(|e| MediaError::Fetch(format!("Cannot resolve '{}': {}", locator, e)))
    }
}

impl ResourceFetcher for HttpFetcher {
    async fn fetch_range(
        &self,
        locator: &SegmentLocator,
        range: ByteRange,
    ) -> std::result::Result<FetchedRange, MediaError> {
        let url = self.resolve(locator)?;
        debug!(url = %url, range = ?range, "Fetching segment bytes");

        let mut request = self.http_client.get(url.clone());
        if let Some(value) = range.header_value() {
            request = request.header(RANGE, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MediaError::Fetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        let partial = match status {
            StatusCode::PARTIAL_CONTENT => true,
            StatusCode::OK => false,
            _ => return Err(MediaError::Fetch(format!("{} returned {}", url, status))),
        };

        let reported_total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::Fetch(format!("{}: {}", url, e)))?
            .to_vec();

        let total_len = if partial {
            reported_total
        } else {
            Some(bytes.len() as u64)
        };

        Ok(FetchedRange {
            bytes,
            total_len,
            partial,
        })
    }
}

/// Serves segments from memory
///
/// Honors ranges like a well-behaved server. Failures can be scripted per
/// locator for exercising the retry path without a network.
#[derive(Default)]
pub struct MemoryFetcher {
    inner: Mutex<MemoryStore>,
}

#[derive(Default)]
struct MemoryStore {
    resources: HashMap<String, Vec<u8>>,
    scripted_failures: HashMap<String, u32>,
    requests: HashMap<String, u32>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `bytes` available under `locator`
    pub fn insert(&self, locator: &str, bytes: Vec<u8>) {
        self.store().resources.insert(locator.to_string(), bytes);
    }

    /// Fail the next `count` requests for `locator`
    pub fn fail_next(&self, locator: &str, count: u32) {
        self.store().scripted_failures.insert(locator.to_string(), count);
    }

    /// Number of requests seen for `locator`
    pub fn requests(&self, locator: &str) -> u32 {
        self.store().requests.get(locator).copied().unwrap_or(0)
    }

    fn store(&self) -> MutexGuard<'_, MemoryStore> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn serve(&self, locator: &SegmentLocator, range: ByteRange) -> std::result::Result<FetchedRange, MediaError> {
        let mut store = self.store();
        let key = locator.as_str();
        *store.requests.entry(key.to_string()).or_insert(0) += 1;

        if let Some(remaining) = store.scripted_failures.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MediaError::Fetch(format!("{} unavailable (scripted)", key)));
            }
        }

        let resource = store
            .resources
            .get(key)
            .ok_or_else(|| MediaError::Fetch(format!("{} returned 404 Not Found", key)))?;
        let total = resource.len() as u64;

        if range.is_full() {
            return Ok(FetchedRange {
                bytes: resource.clone(),
                total_len: Some(total),
                partial: false,
            });
        }

        let start = range.start.min(total) as usize;
        let end = range.end.map_or(total, |end| (end + 1).min(total)) as usize;
        Ok(FetchedRange {
            bytes: resource[start..end.max(start)].to_vec(),
            total_len: Some(total),
            partial: true,
        })
    }
}

impl ResourceFetcher for MemoryFetcher {
    async fn fetch_range(
        &self,
        locator: &SegmentLocator,
        range: ByteRange,
    ) -> std::result::Result<FetchedRange, MediaError> {
        self.serve(locator, range)
    }
}
