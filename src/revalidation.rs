//! Conditional request state machine. Decides per request whether a stored
//! response can be served, must be revalidated with the origin or fetched
//! again, and keeps the backend up to date with the outcome.

use std::fmt::{self, Display, Formatter};

use serde::de::DeserializeOwned;

use crate::cache::{Cache, CacheKey, CacheRecord, CacheState, ExpirationPolicy, Relations};
use crate::error::{AddContext, CacheError};
use crate::http::{Method, Request, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use crate::io::HttpRunner;
use crate::time::{self, Clock};
use crate::{log_debug, log_error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nothing usable was stored, the response comes from the origin.
    Miss,
    /// Served from the backend without a network call.
    FreshHit,
    /// Transient: a stale record was found and a conditional request is on
    /// its way.
    StaleHit,
    /// Origin answered 304, the stored record is served with a new expiry.
    NotModified,
    /// Origin answered with a new representation which replaced the stored
    /// one.
    Changed,
    /// The response did not go through the cache: a method other than GET,
    /// or a 304 with nothing stored to revalidate.
    Uncacheable,
}

impl Display for CacheStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let status = match self {
            CacheStatus::Miss => "MISS",
            CacheStatus::FreshHit => "FRESH_HIT",
            CacheStatus::StaleHit => "STALE_HIT",
            CacheStatus::NotModified => "REVALIDATED_NOT_MODIFIED",
            CacheStatus::Changed => "REVALIDATED_CHANGED",
            CacheStatus::Uncacheable => "UNCACHEABLE",
        };
        write!(f, "{status}")
    }
}

/// What the engine hands back for a request: the record (stored or freshly
/// fetched) and how it was obtained.
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: CacheStatus,
    pub key: CacheKey,
    pub record: CacheRecord,
}

impl CachedResponse {
    fn new(status: CacheStatus, key: CacheKey, record: CacheRecord) -> Self {
        CachedResponse {
            status,
            key,
            record,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.record.status_code
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.record.headers.get(key).map(|s| s.as_str())
    }

    pub fn body(&self) -> Result<&[u8]> {
        self.record.body()
    }
}

/// Implemented by decoded resources that know their own hypermedia links.
pub trait HyperResource {
    /// Relations found in the resource, `None` when it carries none.
    fn relations(&self) -> Option<Relations>;
}

pub struct RevalidationEngine<R, C> {
    runner: R,
    cache: C,
    policy: ExpirationPolicy,
    refresh_cache: bool,
    now: Clock,
}

impl<R: HttpRunner, C: Cache> RevalidationEngine<R, C> {
    pub fn new(runner: R, cache: C, policy: ExpirationPolicy) -> Self {
        RevalidationEngine {
            runner,
            cache,
            policy,
            refresh_cache: false,
            now: time::now_utc,
        }
    }

    /// Skip lookups and always go to the origin, still storing what comes
    /// back.
    pub fn with_refresh_cache(self, refresh_cache: bool) -> Self {
        RevalidationEngine {
            refresh_cache,
            ..self
        }
    }

    pub fn with_clock(self, now: Clock) -> Self {
        RevalidationEngine { now, ..self }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Resolve `request` through the cache. Only transport errors are
    /// returned; backend failures are logged and the request degrades to an
    /// uncached one.
    pub fn run(&self, request: &Request) -> Result<CachedResponse> {
        let key = CacheKey::from_request(request);
        if request.method() != Method::GET {
            return self.bypass(key, request);
        }
        match self.lookup(&key) {
            CacheState::Fresh(record) => {
                log_debug!("{} {}: {}", request.method(), key, CacheStatus::FreshHit);
                Ok(CachedResponse::new(CacheStatus::FreshHit, key, record))
            }
            CacheState::Stale(record) => {
                log_debug!("{} {}: {}", request.method(), key, CacheStatus::StaleHit);
                let mut conditional = request.clone();
                if let Some(etag) = record.etag() {
                    conditional.set_header(IF_NONE_MATCH, etag);
                }
                if let Some(last_modified) = record.last_modified() {
                    conditional.set_header(IF_MODIFIED_SINCE, last_modified);
                }
                self.fetch(key, &conditional, Some(record))
            }
            CacheState::None => {
                log_debug!("{} {}: {}", request.method(), key, CacheStatus::Miss);
                self.fetch(key, request, None)
            }
        }
    }

    fn lookup(&self, key: &CacheKey) -> CacheState {
        if self.refresh_cache {
            return CacheState::None;
        }
        match self.cache.lookup(key, (self.now)()) {
            Ok(state) => state,
            Err(err) => {
                match err.downcast_ref::<CacheError>() {
                    Some(cache_err) if cache_err.is_miss() => {
                        log_debug!("Ignoring unusable cache entry for {}: {}", key, err)
                    }
                    _ => log_error!("Cache lookup for {} failed: {}", key, err),
                }
                CacheState::None
            }
        }
    }

    fn fetch(
        &self,
        key: CacheKey,
        request: &Request,
        stored: Option<CacheRecord>,
    ) -> Result<CachedResponse> {
        let response = self.runner.run(request)?;
        let now = (self.now)();
        let expires_at = self.policy.expires_at(&response.headers, now);
        if response.is_not_modified() {
            let Some(mut record) = stored else {
                log_debug!("{}: 304 with nothing stored", key);
                let record = CacheRecord::from_response(&response, expires_at);
                return Ok(CachedResponse::new(CacheStatus::Uncacheable, key, record));
            };
            if let Err(err) = self.cache.update_expiration(&key, expires_at) {
                log_error!("Could not refresh expiration of {}: {}", key, err);
            }
            record.expires_at = expires_at;
            log_debug!("{}: {}", key, CacheStatus::NotModified);
            return Ok(CachedResponse::new(CacheStatus::NotModified, key, record));
        }
        let record = CacheRecord::from_response(&response, expires_at);
        if let Err(err) = self.cache.set(&key, &record) {
            log_error!("Could not cache response for {}: {}", key, err);
        }
        let status = if stored.is_some() {
            CacheStatus::Changed
        } else {
            CacheStatus::Miss
        };
        log_debug!("{}: {} ({})", key, status, response.status);
        Ok(CachedResponse::new(status, key, record))
    }

    fn bypass(&self, key: CacheKey, request: &Request) -> Result<CachedResponse> {
        let response = self.runner.run(request)?;
        let now = (self.now)();
        if request.method().is_unsafe() {
            log_debug!("{} {}: resetting cached response", request.method(), key);
            if let Err(err) = self.cache.reset(&key) {
                log_error!("Could not reset cache for {}: {}", key, err);
            }
        }
        let record = CacheRecord::from_response(&response, now);
        Ok(CachedResponse::new(CacheStatus::Uncacheable, key, record))
    }

    /// Drop the stored response for `request`, keeping its relations.
    pub fn reset(&self, request: &Request) -> Result<()> {
        self.cache.reset(&CacheKey::from_request(request))
    }

    /// Relations stored for `request`, regardless of the freshness of its
    /// response.
    pub fn relations(&self, request: &Request) -> Option<Relations> {
        let key = CacheKey::from_request(request);
        match self.cache.get_relations(&key) {
            Ok(relations) => relations,
            Err(err) => {
                log_error!("Could not read relations for {}: {}", key, err);
                None
            }
        }
    }

    /// Decode the body with the decoder its media type selects and remember
    /// the relations the resource reports.
    pub fn decode<T>(&self, response: &CachedResponse) -> Result<T>
    where
        T: DeserializeOwned + HyperResource,
    {
        let format = response
            .record
            .media_type
            .as_ref()
            .map(|media_type| media_type.format.as_str())
            .ok_or_else(|| {
                CacheError::DecodeError(format!("No media type in response for {}", response.key))
            })?;
        let body = response
            .body()
            .err_context(format!("Reading cached body of {}", response.key))?;
        let resource: T = match format {
            "json" => serde_json::from_slice(body).map_err(|err| {
                CacheError::DecodeError(format!("Invalid json body for {}: {}", response.key, err))
            })?,
            other => {
                return Err(CacheError::DecodeError(format!(
                    "No decoder for format {other}"
                ))
                .into())
            }
        };
        if let Some(relations) = resource.relations() {
            if let Err(err) = self.cache.set_relations(&response.key, &relations) {
                log_error!("Could not cache relations for {}: {}", response.key, err);
            }
        }
        Ok(resource)
    }
}
