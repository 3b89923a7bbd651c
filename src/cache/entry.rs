use chrono::{DateTime, Utc};

use crate::http::Response;

/// One stored response.
///
/// Entries are immutable once written: a refresh replaces the whole entry
/// under the same key, it never merges headers or bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    key: String,
    response: Response,
    inserted_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Stamps `response` with the current time under `key`.
    pub fn new(key: impl Into<String>, response: Response) -> Self {
        Self {
            key: key.into(),
            response,
            inserted_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn inserted_at(&self) -> DateTime<Utc> {
        self.inserted_at
    }

    /// Consumes the entry, yielding the stored response exactly as written.
    pub fn into_response(self) -> Response {
        self.response
    }
}
