//! Poll-based HTTP fetcher built on reqwest.

use crate::fetch::{AssetFetcher, FetchFlags, FetchResponse, STATUS_RETRY_LATER};
use crate::jobs::JobPool;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// User-Agent sent with every request. Some survey mirrors reject
/// anonymous clients.
const USER_AGENT: &str = concat!("hipslayer/", env!("CARGO_PKG_VERSION"));

/// Error creating the HTTP fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to create HTTP client: {0}")]
    ClientInit(#[from] reqwest::Error),
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum concurrent low-priority (delayed) requests. Normal
    /// requests are not limited here.
    pub delayed_concurrency: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            delayed_concurrency: 8,
        }
    }
}

enum RequestState {
    InFlight(oneshot::Receiver<FetchResponse>),
    Complete(FetchResponse),
}

/// [`AssetFetcher`] that pulls survey files over HTTP.
///
/// `fetch` never blocks: the first call for a URL dispatches the request
/// onto the job pool's runtime and answers "pending"; later calls poll the
/// request and, once it completes, keep answering the final response until
/// the caller `release`s the URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    jobs: Arc<JobPool>,
    delayed: Arc<Semaphore>,
    requests: DashMap<String, RequestState>,
}

impl HttpFetcher {
    /// Create a fetcher with the default configuration.
    pub fn new(jobs: Arc<JobPool>) -> Result<Self, FetchError> {
        Self::with_config(jobs, FetcherConfig::default())
    }

    /// Create a fetcher with an explicit configuration.
    pub fn with_config(jobs: Arc<JobPool>, config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            jobs,
            delayed: Arc::new(Semaphore::new(config.delayed_concurrency)),
            requests: DashMap::new(),
        })
    }

    /// Number of URLs currently tracked (in flight or retained).
    pub fn tracked_requests(&self) -> usize {
        self.requests.len()
    }

    fn dispatch(&self, url: &str, flags: FetchFlags) -> oneshot::Receiver<FetchResponse> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let delayed = flags.delay.then(|| self.delayed.clone());
        let url = url.to_string();
        self.jobs.handle().spawn(async move {
            let _permit = match delayed {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            let response = match client.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if resp.status().is_success() {
                        match resp.bytes().await {
                            Ok(data) => FetchResponse::ok(data),
                            Err(err) => {
                                debug!(url = %url, error = %err, "failed to read response body");
                                FetchResponse::error(STATUS_RETRY_LATER)
                            }
                        }
                    } else {
                        FetchResponse::error(status)
                    }
                }
                Err(err) => {
                    debug!(url = %url, error = %err, "request failed");
                    FetchResponse::error(STATUS_RETRY_LATER)
                }
            };
            let _ = tx.send(response);
        });
        rx
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str, flags: FetchFlags) -> FetchResponse {
        match self.requests.entry(url.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let settled = match entry.get_mut() {
                    RequestState::Complete(response) => return response.clone(),
                    RequestState::InFlight(rx) => match rx.try_recv() {
                        Ok(response) => response,
                        Err(TryRecvError::Empty) => return FetchResponse::pending(),
                        Err(TryRecvError::Closed) => FetchResponse::error(STATUS_RETRY_LATER),
                    },
                };
                if settled.is_not_found() && !flags.accept_404 {
                    warn!(url = %url, status = settled.status, "asset not found");
                }
                entry.insert(RequestState::Complete(settled.clone()));
                settled
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let rx = self.dispatch(url, flags);
                entry.insert(RequestState::InFlight(rx));
                FetchResponse::pending()
            }
        }
    }

    fn release(&self, url: &str) {
        self.requests.remove(url);
    }
}
