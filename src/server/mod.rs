//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function. Supports persistent connections (keep-alive). [`dispatch`] is
//! the handler that puts a [`CacheRouter`](crate::router::CacheRouter) behind
//! the server as a caching forward proxy.

mod dispatch;

pub use dispatch::dispatch;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The proxy's listening socket.
///
/// # Examples
///
/// ```rust,no_run
/// use swcache::server::Server;
/// use swcache::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req: Request| async {
///         Response::new(StatusCode::OK).body("Hello!")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// Each connection runs on its own task. Connection errors and handler
    /// panics are logged and never take the listener down.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "swcache listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    // Pipelined requests may already be buffered, so parse before reading.
    loop {
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                if read_more(&mut stream, &mut buf, peer_addr).await? {
                    continue;
                }
                break;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                let response = Response::new(StatusCode::BAD_REQUEST)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            if read_more(&mut stream, &mut buf, peer_addr).await? {
                continue;
            }
            break;
        }

        let request = request.body(Bytes::copy_from_slice(&buf[body_offset..total_needed]));
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            url = %request.url(),
            "dispatching request"
        );

        // A panicking handler must not kill the connection task silently.
        let response = match tokio::spawn(handler(request)).await {
            Ok(response) => response,
            Err(e) => {
                error!(peer = %peer_addr, error = %e, "handler task failed");
                Response::new(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
        stream
            .write_all(&response.keep_alive(keep_alive).into_bytes())
            .await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}

/// Reads more bytes into `buf`.
///
/// Returns `false` when the connection should end: the peer closed it, or
/// the buffered request grew past [`MAX_REQUEST_SIZE`] and a 413 was sent.
async fn read_more(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    peer_addr: SocketAddr,
) -> Result<bool, std::io::Error> {
    let bytes_read = stream.read_buf(buf).await?;

    if bytes_read == 0 {
        debug!(peer = %peer_addr, "connection closed by peer");
        return Ok(false);
    }

    if buf.len() > MAX_REQUEST_SIZE {
        warn!(peer = %peer_addr, "request too large — sending 413");
        let response = Response::new(StatusCode::PAYLOAD_TOO_LARGE)
            .body("Request entity too large")
            .keep_alive(false);
        stream.write_all(&response.into_bytes()).await?;
        return Ok(false);
    }

    Ok(true)
}
