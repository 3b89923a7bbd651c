//! Background sync: requests deferred while offline, replayed later.
//!
//! The host fires a sync event with a tag once connectivity returns. Only
//! the configured tag drains the queue; requests that fail again go back
//! to the end of it.

use std::collections::VecDeque;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::fetch::Fetcher;
use crate::http::Request;

/// Outcome of one sync event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Requests that reached the network (any HTTP status).
    pub replayed: usize,
    /// Requests still queued afterwards.
    pub pending: usize,
}

/// FIFO of deferred requests.
#[derive(Default)]
pub struct SyncQueue {
    pending: Mutex<VecDeque<Request>>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, request: Request) {
        self.pending.lock().await.push_back(request);
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Sends every queued request in order. The lock is not held while
    /// requests are in flight, so new requests can be queued meanwhile.
    pub async fn replay(&self, fetcher: &dyn Fetcher) -> SyncReport {
        let batch: Vec<Request> = self.pending.lock().await.drain(..).collect();
        let mut replayed = 0;
        let mut failed = Vec::new();

        for request in batch {
            match fetcher.fetch(request.clone()).await {
                Ok(response) => {
                    debug!(url = %request.url(), status = response.status().as_u16(), "replayed deferred request");
                    replayed += 1;
                }
                Err(e) => {
                    warn!(url = %request.url(), error = %e, "deferred request failed again");
                    failed.push(request);
                }
            }
        }

        let mut pending = self.pending.lock().await;
        pending.extend(failed);
        SyncReport {
            replayed,
            pending: pending.len(),
        }
    }
}
