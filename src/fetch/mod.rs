//! Non-blocking asset fetching.
//!
//! The engine polls for bytes instead of awaiting them: [`AssetFetcher::fetch`]
//! returns immediately with status 0 while a request is in flight, and the
//! caller simply asks again next frame. This polling discipline is what
//! keeps per-frame work bounded.

mod http;

pub use http::{FetchError, FetcherConfig, HttpFetcher};

use bytes::Bytes;

/// Sentinel status: the request is in flight; ask again later.
pub const STATUS_PENDING: u16 = 0;

/// Sentinel status: transient failure; the request may be retried.
pub const STATUS_RETRY_LATER: u16 = 598;

/// Behavior flags for a fetch request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchFlags {
    /// A 404 answer is expected and must not be logged.
    pub accept_404: bool,
    /// Low-priority request; may be queued behind normal traffic.
    pub delay: bool,
}

impl FetchFlags {
    pub fn accept_404() -> Self {
        Self {
            accept_404: true,
            delay: false,
        }
    }

    pub fn delayed(mut self) -> Self {
        self.delay = true;
        self
    }
}

/// Answer to a fetch request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP-like status. 0 means the request is still in flight; 598 is a
    /// transient failure worth retrying.
    pub status: u16,
    /// The fetched bytes, when the request succeeded.
    pub data: Option<Bytes>,
}

impl FetchResponse {
    pub fn pending() -> Self {
        Self {
            status: STATUS_PENDING,
            data: None,
        }
    }

    pub fn ok(data: Bytes) -> Self {
        Self {
            status: 200,
            data: Some(data),
        }
    }

    pub fn error(status: u16) -> Self {
        Self { status, data: None }
    }

    /// Whether the request is still in flight.
    pub fn is_pending(&self) -> bool {
        self.status == STATUS_PENDING
    }

    /// Whether the status is a definitive 4xx absence.
    pub fn is_not_found(&self) -> bool {
        self.status / 100 == 4
    }
}

/// Pull-based byte source for survey files.
///
/// Implementations must never block: when the bytes are not available yet
/// they answer [`FetchResponse::pending`] and the caller retries next
/// frame. `release` tells the fetcher the caller is done with a URL so any
/// retained bytes can be dropped.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str, flags: FetchFlags) -> FetchResponse;
    fn release(&self, url: &str);
}
