//! The offline cache router.
//!
//! [`CacheRouter`] owns everything a worker instance needs (configuration,
//! storage, the network seam, lifecycle flags, the background-sync queue)
//! and exposes one method per host event:
//!
//! | Event                  | Method                                    |
//! |------------------------|-------------------------------------------|
//! | install                | [`CacheRouter::on_install`]               |
//! | activate               | [`CacheRouter::on_activate`]              |
//! | fetch                  | [`CacheRouter::on_fetch`]                 |
//! | message                | [`CacheRouter::on_message`]               |
//! | sync                   | [`CacheRouter::on_sync`]                  |
//! | push                   | [`CacheRouter::on_push`]                  |
//! | notification click     | [`CacheRouter::on_notification_click`]    |
//!
//! Fetch strategies by [`RequestClass`]:
//!
//! | Class          | Strategy                                                     |
//! |----------------|--------------------------------------------------------------|
//! | `Passthrough`  | network only, no cache interaction                           |
//! | `StaticAsset`  | cache-first, write-back of `200` `basic` responses           |
//! | `ApiCall`      | network-first, write-back of `200`, `503` JSON when offline  |
//! | `Other`        | network-first, cache fallback, no write-back                 |
//!
//! A failed navigation (a request accepting `text/html`) with no cached copy
//! is answered with the configured offline document when it is cached.

mod classify;

pub use classify::{RequestClass, classify};

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheEntry, CacheStorage, StorageError};
use crate::config::{InstallPolicy, RouterConfig};
use crate::fetch::{FetchError, Fetcher};
use crate::http::{Method, Request, Response, ResponseType, StatusCode};
use crate::lifecycle::{Lifecycle, WorkerState};
use crate::message::{ControlMessage, MessageReply, ReplyPort};
use crate::notify::{self, ClientCommand, Notification};
use crate::sync::{SyncQueue, SyncReport};

/// Body of the structured failure returned for API calls while offline.
pub const OFFLINE_ERROR: &str = "Offline - No cached data available";

/// Why one manifest asset could not be pre-cached.
#[derive(Debug, Error)]
pub enum PrecacheError {
    #[error("invalid manifest URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to open generation {generation}: {source}")]
    Open {
        generation: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to pre-cache {url}: {source}")]
    Manifest {
        url: String,
        #[source]
        source: PrecacheError,
    },
}

#[derive(Debug, Error)]
pub enum ActivateError {
    #[error("cannot activate a worker that is {0}, not installed")]
    NotInstalled(WorkerState),

    #[error("failed to enumerate cache generations: {0}")]
    Storage(#[from] StorageError),
}

/// Which manifest entries made it into the new generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Serialize)]
struct OfflineBody<'a> {
    error: &'a str,
}

/// Offline cache router. Share it between tasks behind an [`Arc`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use swcache::cache::MemoryStorage;
/// use swcache::config::RouterConfig;
/// use swcache::fetch::FetchError;
/// use swcache::http::{Request, Response, StatusCode};
/// use swcache::router::CacheRouter;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = RouterConfig::new("v1", vec!["/app.js".to_owned()]);
/// let router = CacheRouter::new(config, Arc::new(MemoryStorage::new()), |_req: Request| async {
///     Ok::<_, FetchError>(Response::new(StatusCode::OK).body("console.log(1)"))
/// });
///
/// let report = router.on_install().await.unwrap();
/// assert_eq!(report.cached, vec!["/app.js"]);
/// router.on_activate().await.unwrap();
/// # }
/// ```
pub struct CacheRouter {
    config: RouterConfig,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    lifecycle: Lifecycle,
    sync_queue: SyncQueue,
}

impl CacheRouter {
    pub fn new(
        config: RouterConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: impl Fetcher,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher: Arc::new(fetcher),
            lifecycle: Lifecycle::new(),
            sync_queue: SyncQueue::new(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// `true` once installed with skip-waiting set.
    pub fn should_activate(&self) -> bool {
        self.lifecycle.should_activate()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Creates the static generation for the current version and pre-caches
    /// the manifest into it.
    ///
    /// Under [`InstallPolicy::Lenient`] an asset that fails to fetch (or
    /// answers with anything but `200`) is logged and left out. Under
    /// [`InstallPolicy::Strict`] the first failure deletes the generation,
    /// marks the worker redundant and returns the error.
    ///
    /// On success the worker is installed with skip-waiting set.
    pub async fn on_install(&self) -> Result<InstallReport, InstallError> {
        self.lifecycle.transition(WorkerState::Installing);
        let generation = self.config.static_generation();
        info!(generation, assets = self.config.manifest.len(), "installing");

        if let Err(source) = self.storage.open(generation) {
            self.lifecycle.transition(WorkerState::Redundant);
            return Err(InstallError::Open {
                generation: generation.to_owned(),
                source,
            });
        }

        let mut report = InstallReport::default();
        for asset in &self.config.manifest {
            match self.precache(generation, asset).await {
                Ok(()) => report.cached.push(asset.clone()),
                Err(source) => match self.config.install_policy {
                    InstallPolicy::Lenient => {
                        warn!(url = %asset, error = %source, "skipping manifest asset");
                        report.failed.push(asset.clone());
                    }
                    InstallPolicy::Strict => {
                        error!(url = %asset, error = %source, "install aborted");
                        if let Err(e) = self.storage.delete(generation) {
                            warn!(generation, error = %e, "failed to discard partial generation");
                        }
                        self.lifecycle.transition(WorkerState::Redundant);
                        return Err(InstallError::Manifest {
                            url: asset.clone(),
                            source,
                        });
                    }
                },
            }
        }

        self.lifecycle.transition(WorkerState::Installed);
        self.lifecycle.skip_waiting();
        info!(
            generation,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "installed"
        );
        Ok(report)
    }

    async fn precache(&self, generation: &str, asset: &str) -> Result<(), PrecacheError> {
        let request = Request::new(Method::Get, self.config.resolve(asset)?);
        let key = request.cache_key();
        let response = self.fetcher.fetch(request).await?;
        if !response.is_ok() {
            return Err(PrecacheError::Status(response.status()));
        }
        self.storage.put(generation, CacheEntry::new(key, response))?;
        Ok(())
    }

    /// Deletes every generation that does not belong to the current version,
    /// then claims all clients.
    ///
    /// Returns the names of the deleted generations. A failure deleting one
    /// generation is logged and the others are still processed.
    ///
    /// Only an installed worker may activate. Anything else, including a
    /// worker made redundant by a failed strict install, is rejected with
    /// [`ActivateError::NotInstalled`] and every generation is left alone.
    pub async fn on_activate(&self) -> Result<Vec<String>, ActivateError> {
        let state = self.lifecycle.state();
        if state != WorkerState::Installed {
            warn!(%state, "activation refused");
            return Err(ActivateError::NotInstalled(state));
        }
        self.lifecycle.transition(WorkerState::Activating);
        info!(version = %self.config.version, "activating");

        let stale: Vec<String> = self
            .storage
            .generations()?
            .into_iter()
            .filter(|g| !self.config.is_current_generation(g))
            .collect();

        let mut deleted = Vec::with_capacity(stale.len());
        for generation in stale {
            match self.storage.delete(&generation) {
                Ok(_) => {
                    info!(generation = %generation, "deleted old cache");
                    deleted.push(generation);
                }
                Err(e) => warn!(generation = %generation, error = %e, "failed to delete old cache"),
            }
        }

        self.lifecycle.claim_clients();
        self.lifecycle.transition(WorkerState::Activated);
        info!(version = %self.config.version, "activated");
        Ok(deleted)
    }

    // ── Fetch ─────────────────────────────────────────────────────────────────

    /// Serves one intercepted request.
    ///
    /// Network failures come back as a fallback response where a fallback
    /// exists, otherwise as the [`FetchError`] itself. Cache failures never
    /// fail the request.
    pub async fn on_fetch(&self, request: Request) -> Result<Response, FetchError> {
        let class = classify(&request, &self.config);
        debug!(method = %request.method(), url = %request.url(), ?class, "fetch");

        match class {
            RequestClass::Passthrough => self.fetcher.fetch(request).await,
            RequestClass::StaticAsset => self.cache_first(request).await,
            RequestClass::ApiCall => Ok(self.network_first_api(request).await),
            RequestClass::Other => self.network_first(request).await,
        }
    }

    async fn cache_first(&self, request: Request) -> Result<Response, FetchError> {
        let generation = self.config.static_generation();
        let key = request.cache_key();

        if let Some(entry) = self.lookup(generation, &key) {
            let age = Utc::now() - entry.inserted_at();
            debug!(key = %key, age_secs = age.num_seconds(), "serving from cache");
            return Ok(entry.into_response());
        }

        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                if response.is_ok() && response.kind() == ResponseType::Basic {
                    self.write_back(generation, key, &response);
                }
                Ok(response)
            }
            Err(e) => {
                error!(url = %request.url(), error = %e, "fetch failed");
                if request.accepts_html() {
                    if let Some(page) = self.offline_document() {
                        return Ok(page);
                    }
                }
                Err(e)
            }
        }
    }

    async fn network_first_api(&self, request: Request) -> Response {
        let key = request.cache_key();

        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                if response.is_ok() {
                    self.write_back(&self.config.dynamic_generation(), key, &response);
                }
                response
            }
            Err(e) => {
                error!(url = %request.url(), error = %e, "API request failed");
                match self.lookup_any(&key) {
                    Some(entry) => entry.into_response(),
                    None => offline_response(),
                }
            }
        }
    }

    async fn network_first(&self, request: Request) -> Result<Response, FetchError> {
        let key = request.cache_key();

        let navigation = request.accepts_html();

        match self.fetcher.fetch(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if let Some(entry) = self.lookup_any(&key) {
                    debug!(key = %key, error = %e, "network failed, serving cached copy");
                    return Ok(entry.into_response());
                }
                if navigation {
                    if let Some(page) = self.offline_document() {
                        debug!(key = %key, error = %e, "network failed, serving offline document");
                        return Ok(page);
                    }
                }
                Err(e)
            }
        }
    }

    fn lookup(&self, generation: &str, key: &str) -> Option<CacheEntry> {
        self.storage.get(generation, key).unwrap_or_else(|e| {
            warn!(generation, key, error = %e, "cache read failed; treating as miss");
            None
        })
    }

    fn lookup_any(&self, key: &str) -> Option<CacheEntry> {
        self.storage.match_any(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "cache read failed; treating as miss");
            None
        })
    }

    fn write_back(&self, generation: &str, key: String, response: &Response) {
        if let Err(e) = self.storage.put(generation, CacheEntry::new(key, response.clone())) {
            warn!(generation, error = %e, "cache write failed");
        }
    }

    fn offline_document(&self) -> Option<Response> {
        let url = self.config.resolve(&self.config.offline_document).ok()?;
        let key = Request::new(Method::Get, url).cache_key();
        self.lookup_any(&key).map(CacheEntry::into_response)
    }

    // ── Messages, sync, push ──────────────────────────────────────────────────

    /// Handles a control message. When `reply` is present it always gets an
    /// answer, even for messages that only flip a flag.
    pub fn on_message(&self, message: ControlMessage, reply: Option<ReplyPort>) {
        debug!(?message, "message received");

        let answer = match message {
            ControlMessage::SkipWaiting => {
                self.lifecycle.skip_waiting();
                MessageReply::Ack { ok: true }
            }
            ControlMessage::GetVersion => MessageReply::Version {
                version: self.config.version.clone(),
            },
        };

        if let Some(port) = reply {
            if port.send(answer).is_err() {
                debug!("message reply dropped: receiver gone");
            }
        }
    }

    /// Queues a request for the next background sync.
    pub async fn enqueue_sync(&self, request: Request) {
        debug!(url = %request.url(), "deferring request for background sync");
        self.sync_queue.push(request).await;
    }

    /// Handles a sync event. Only the configured tag replays the queue.
    pub async fn on_sync(&self, tag: &str) -> SyncReport {
        if tag != self.config.sync_tag {
            debug!(tag, "ignoring unknown sync tag");
            return SyncReport {
                replayed: 0,
                pending: self.sync_queue.len().await,
            };
        }

        info!(tag, "background sync");
        self.sync_queue.replay(self.fetcher.as_ref()).await
    }

    /// Builds the notification to show for a push message.
    pub fn on_push(&self, payload: Option<&str>) -> Notification {
        debug!("push received");
        notify::build_notification(&self.config.notification, payload)
    }

    /// Resolves a notification click to the client command to run, if any.
    pub fn on_notification_click(&self, action: Option<&str>) -> Option<ClientCommand> {
        debug!(?action, "notification clicked");
        notify::resolve_click(action)
    }
}

/// `503` with a JSON body, returned for API calls with no network and no cached copy.
pub fn offline_response() -> Response {
    let body = OfflineBody {
        error: OFFLINE_ERROR,
    };
    Response::json(StatusCode::SERVICE_UNAVAILABLE, &body)
        .unwrap_or_else(|_| Response::new(StatusCode::SERVICE_UNAVAILABLE))
        .status_text("Service Unavailable")
}
