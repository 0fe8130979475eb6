use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::http::{Headers, ETAG, LAST_MODIFIED};
use crate::io::HttpResponse;
use crate::mediatype::MediaType;
use crate::Result;

/// Relation name to link (or link template). Cached independently from the
/// response and not subject to its expiration.
pub type Relations = HashMap<String, String>;

/// Response body as handed out by a cache backend.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Bytes(Vec<u8>),
    /// The metadata is there but the body is not. Reading it fails.
    Missing(PathBuf),
}

impl Default for Body {
    fn default() -> Self {
        Body::Bytes(Vec::new())
    }
}

impl Body {
    pub fn bytes(&self) -> Result<&[u8]> {
        match self {
            Body::Bytes(bytes) => Ok(bytes),
            Body::Missing(path) => Err(CacheError::IoFailure(format!(
                "cached body not available at {}",
                path.display()
            ))
            .into()),
        }
    }
}

/// One cached response: a mirror of the response line and headers, the body,
/// and the moment it stops being fresh.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct CacheRecord {
    /// e.g. `200 OK`
    #[builder(setter(into), default)]
    pub status: String,
    #[builder(default = "200")]
    pub status_code: u16,
    #[builder(setter(into), default = "String::from(\"HTTP/1.1\")")]
    pub protocol: String,
    #[builder(default)]
    pub headers: Headers,
    #[builder(setter(into, strip_option), default)]
    pub content_length: Option<u64>,
    #[builder(setter(into, strip_option), default)]
    pub media_type: Option<MediaType>,
    #[builder(default)]
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    #[builder(default)]
    pub body: Body,
}

impl CacheRecord {
    pub fn builder() -> CacheRecordBuilder {
        CacheRecordBuilder::default()
    }

    /// Snapshot of an origin response. The body is copied, so the response
    /// can still be handed back to the caller.
    pub fn from_response(response: &HttpResponse, expires_at: DateTime<Utc>) -> Self {
        let status = if response.status_text.is_empty() {
            response.status.to_string()
        } else {
            format!("{} {}", response.status, response.status_text)
        };
        CacheRecord {
            status,
            status_code: response.status,
            protocol: response.protocol.clone(),
            headers: response.headers.clone(),
            content_length: response.content_length(),
            media_type: response.media_type(),
            expires_at,
            body: Body::Bytes(response.body.clone()),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get(ETAG).map(|s| s.as_str())
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.headers.get(LAST_MODIFIED).map(|s| s.as_str())
    }

    pub fn body(&self) -> Result<&[u8]> {
        self.body.bytes()
    }
}
