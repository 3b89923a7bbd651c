//! HTTP response type, cached verbatim by the router and serialized to the
//! HTTP/1.1 wire format by the proxy server.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::{Headers, ResponseType, StatusCode};

/// Headers that describe the upstream connection rather than the resource.
/// They are dropped on serialization and replaced by our own framing.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "transfer-encoding",
    "proxy-connection",
];

/// An HTTP response.
///
/// Cloning is cheap: the body is a reference-counted [`Bytes`], so the router
/// can hand one copy to the caller and write the other into a cache
/// generation.
///
/// # Examples
///
/// ```
/// use swcache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    status_text: Option<String>,
    headers: Headers,
    body: Bytes,
    response_type: ResponseType,
    keep_alive: bool,
}

impl Response {
    /// Creates a new `basic` response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_text: None,
            headers: Headers::new(),
            body: Bytes::new(),
            response_type: ResponseType::Basic,
            keep_alive: true,
        }
    }

    /// Builds a locally synthesised JSON response.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `value` cannot be serialized.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status)
            .header("Content-Type", "application/json")
            .body_bytes(body)
            .response_type(ResponseType::Synthetic))
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the whole header map.
    #[must_use]
    pub fn headers_from(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Overrides the reason phrase written on the status line.
    #[must_use]
    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    /// Sets the Fetch-standard response type.
    #[must_use]
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase: the explicit status text if one was set,
    /// otherwise the canonical phrase for the code.
    pub fn reason(&self) -> &str {
        self.status_text
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason())
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes.
    pub fn body_ref(&self) -> &Bytes {
        &self.body
    }

    /// Returns the Fetch-standard response type.
    pub fn kind(&self) -> ResponseType {
        self.response_type
    }

    /// `true` for a `200 OK`, the only status written to a cache generation.
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Upstream framing headers (`Content-Length`, `Transfer-Encoding`,
    /// `Connection`, …) are dropped and rewritten for the body we actually
    /// hold. A `Content-Type: text/plain; charset=utf-8` is added if the body
    /// is non-empty and no content type was set.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        for name in HOP_BY_HOP {
            self.headers.remove(name);
        }

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.insert("Connection", connection);

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), self.reason()).as_bytes());

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_ref());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
