//! The network seam: "perform this request and give me the response".
//!
//! The router never talks to sockets itself. It is handed a [`Fetcher`],
//! which in production is [`HttpFetcher`] and in tests is usually a closure:
//!
//! ```rust
//! use swcache::fetch::{FetchError, Fetcher};
//! use swcache::http::{Request, Response, StatusCode};
//!
//! let offline = |req: Request| async move {
//!     Err::<Response, _>(FetchError::transport(req.url(), "network unreachable"))
//! };
//! let _: &dyn Fetcher = &offline;
//! ```

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::http::{Headers, Request, Response, ResponseType, StatusCode};

/// Network failures. A fetch that produced *any* HTTP response, even a 500,
/// is not an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("unsupported URL scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Shorthand for a [`FetchError::Transport`].
    pub fn transport(url: &Url, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Response, FetchError>> + Send>>;

/// Performs network requests on behalf of the router.
///
/// Any `Fn(Request) -> impl Future<Output = Result<Response, FetchError>>`
/// that is `Send + Sync + 'static` implements this trait via the blanket impl.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, request: Request) -> FetchFuture;
}

impl<T, F> Fetcher for T
where
    T: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Response, FetchError>> + Send + 'static,
{
    fn fetch(&self, request: Request) -> FetchFuture {
        Box::pin((self)(request))
    }
}

/// [`Fetcher`] backed by a shared `reqwest` client.
///
/// Responses from the configured origin are typed [`ResponseType::Basic`];
/// everything else is [`ResponseType::Cors`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Url,
}

impl HttpFetcher {
    /// Builds a fetcher with a default client. Redirects are followed by
    /// `reqwest`; no timeout is imposed beyond the transport's own.
    pub fn new(origin: Url) -> Self {
        Self::with_client(reqwest::Client::new(), origin)
    }

    pub fn with_client(client: reqwest::Client, origin: Url) -> Self {
        Self { client, origin }
    }

    async fn send(client: reqwest::Client, origin: Url, request: Request) -> Result<Response, FetchError> {
        let url = request.url().clone();
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme {
                scheme: url.scheme().to_owned(),
            });
        }

        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

        let mut builder = client.request(method, url.clone());
        for (name, value) in request.headers().iter() {
            // The client writes its own framing and host headers.
            if is_connection_header(name) {
                continue;
            }
            builder = builder.header(name, value);
        }
        if !request.body_bytes().is_empty() {
            builder = builder.body(request.body_bytes().clone());
        }

        let upstream = builder
            .send()
            .await
            .map_err(|e| FetchError::transport(&url, e.to_string()))?;

        let status = StatusCode::from_u16(upstream.status().as_u16());
        let response_type = if upstream.url().origin() == origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };
        let headers: Headers = upstream
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();
        let body: Bytes = upstream
            .bytes()
            .await
            .map_err(|e| FetchError::transport(&url, e.to_string()))?;

        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "upstream response");

        Ok(Response::new(status)
            .headers_from(headers)
            .body_bytes(body)
            .response_type(response_type))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: Request) -> FetchFuture {
        Box::pin(Self::send(self.client.clone(), self.origin.clone(), request))
    }
}

fn is_connection_header(name: &str) -> bool {
    ["host", "connection", "proxy-connection", "keep-alive", "content-length", "transfer-encoding"]
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}
