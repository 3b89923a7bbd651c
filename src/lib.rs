//! # swcache
//!
//! An offline cache router: versioned cache generations, pre-caching of a
//! static manifest at install, eviction of stale generations at activation,
//! and per-request routing between cache-first and network-first strategies.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swcache::cache::MemoryStorage;
//! use swcache::config::RouterConfig;
//! use swcache::fetch::HttpFetcher;
//! use swcache::router::CacheRouter;
//! use swcache::server::{Server, dispatch};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RouterConfig::default();
//!     let fetcher = HttpFetcher::new(config.origin.clone());
//!     let router = Arc::new(CacheRouter::new(config, Arc::new(MemoryStorage::new()), fetcher));
//!
//!     router.on_install().await?;
//!     router.on_activate().await?;
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(move |req| dispatch(Arc::clone(&router), req)).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod message;
pub mod notify;
pub mod router;
pub mod server;
pub mod sync;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::RouterConfig;
pub use fetch::{FetchError, Fetcher};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::CacheRouter;
pub use server::{Server, ServerError};
