//! Outbound requests as seen by the router, plus HTTP/1.1 parsing of the
//! requests the proxy server receives, using the [`httparse`] crate.

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use super::{Headers, Method};

/// Errors that can occur while building or parsing a request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// How the request target was written on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetForm {
    /// `GET /path HTTP/1.1` — addressed to the server itself.
    Origin,
    /// `GET http://host/path HTTP/1.1` — addressed through a proxy.
    Absolute,
}

/// An outbound request with a fully-qualified URL.
///
/// Requests are cheap to clone: the body is a reference-counted [`Bytes`].
///
/// # Examples
///
/// ```
/// use swcache::http::Request;
///
/// let request = Request::get("https://automarket.example/app.js").unwrap();
/// assert_eq!(request.cache_key(), "GET https://automarket.example/app.js");
/// assert!(!request.accepts_html());
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
    form: TargetForm,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
            form: TargetForm::Absolute,
        }
    }

    /// Creates a `GET` request for an absolute URL string.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidUrl`] if `url` is not an absolute URL.
    pub fn get(url: &str) -> Result<Self, RequestError> {
        Ok(Self::new(Method::Get, Url::parse(url)?))
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Absolute-form targets are used as-is. Origin-form targets are resolved
    /// against the `Host` header (or `localhost` when it is missing).
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf`. The body is filled in by the caller once it has fully arrived;
    /// see [`Request::body`].
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    /// - [`RequestError::InvalidUrl`] — the target cannot be turned into a URL.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let Ok(method) = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>();

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let (url, form) = if target.starts_with('/') {
            let host = header_map.get("host").unwrap_or("localhost");
            let base = Url::parse(&format!("http://{host}"))?;
            (base.join(target)?, TargetForm::Origin)
        } else {
            (Url::parse(target)?, TargetForm::Absolute)
        };

        Ok((
            Self {
                method,
                url,
                version,
                headers: header_map,
                body: Bytes::new(),
                form,
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the full request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns how the target was written on the request line.
    pub fn target_form(&self) -> TargetForm {
        self.form
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body bytes.
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// The key this request is stored under: method and full URL.
    ///
    /// Fragments are not sent over the wire, so they are dropped.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }

    /// Returns `true` when the `Accept` header asks for an HTML document.
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all("accept")
            .any(|value| value.contains("text/html"))
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}
