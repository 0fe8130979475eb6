use std::sync::Arc;

use chrono::{DateTime, Utc};

pub mod expiration;
pub mod filesystem;
pub mod inmemory;
pub mod key;
pub mod nocache;
pub mod record;

use crate::config::{CacheType, ConfigProperties};
use crate::Result;
pub use expiration::ExpirationPolicy;
pub use filesystem::FileCache;
pub use inmemory::InMemoryCache;
pub use key::CacheKey;
pub use nocache::NoCache;
pub use record::{Body, CacheRecord, Relations};

/// Storage contract shared by every backend. A missing entry is `Ok(None)`,
/// never an error. Relations live independently from responses.
pub trait Cache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>>;
    /// Store metadata and body, replacing whatever was there.
    fn set(&self, key: &CacheKey, record: &CacheRecord) -> Result<()>;
    /// Drop the response and body but keep the relations.
    fn reset(&self, key: &CacheKey) -> Result<()>;
    /// Rewrite the expiration of a stored response. `NotFound` if there is
    /// none.
    fn update_expiration(&self, key: &CacheKey, expires_at: DateTime<Utc>) -> Result<()>;
    /// An empty map removes the stored relations.
    fn set_relations(&self, key: &CacheKey, relations: &Relations) -> Result<()>;
    fn get_relations(&self, key: &CacheKey) -> Result<Option<Relations>>;

    fn lookup(&self, key: &CacheKey, now: DateTime<Utc>) -> Result<CacheState> {
        match self.get(key)? {
            Some(record) if record.is_fresh(now) => Ok(CacheState::Fresh(record)),
            Some(record) => Ok(CacheState::Stale(record)),
            None => Ok(CacheState::None),
        }
    }
}

pub enum CacheState {
    Stale(CacheRecord),
    Fresh(CacheRecord),
    None,
}

impl<C: Cache + ?Sized> Cache for &C {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        (**self).get(key)
    }
    fn set(&self, key: &CacheKey, record: &CacheRecord) -> Result<()> {
        (**self).set(key, record)
    }
    fn reset(&self, key: &CacheKey) -> Result<()> {
        (**self).reset(key)
    }
    fn update_expiration(&self, key: &CacheKey, expires_at: DateTime<Utc>) -> Result<()> {
        (**self).update_expiration(key, expires_at)
    }
    fn set_relations(&self, key: &CacheKey, relations: &Relations) -> Result<()> {
        (**self).set_relations(key, relations)
    }
    fn get_relations(&self, key: &CacheKey) -> Result<Option<Relations>> {
        (**self).get_relations(key)
    }
}

impl<C: Cache + ?Sized> Cache for Arc<C> {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        (**self).get(key)
    }
    fn set(&self, key: &CacheKey, record: &CacheRecord) -> Result<()> {
        (**self).set(key, record)
    }
    fn reset(&self, key: &CacheKey) -> Result<()> {
        (**self).reset(key)
    }
    fn update_expiration(&self, key: &CacheKey, expires_at: DateTime<Utc>) -> Result<()> {
        (**self).update_expiration(key, expires_at)
    }
    fn set_relations(&self, key: &CacheKey, relations: &Relations) -> Result<()> {
        (**self).set_relations(key, relations)
    }
    fn get_relations(&self, key: &CacheKey) -> Result<Option<Relations>> {
        (**self).get_relations(key)
    }
}

/// Build the backend selected in the configuration. The file backend checks
/// its location up front.
pub fn from_config(config: &impl ConfigProperties) -> Result<Arc<dyn Cache + Send + Sync>> {
    match config.cache_type() {
        CacheType::File => {
            let cache = FileCache::from_config(config)?;
            Ok(Arc::new(cache))
        }
        CacheType::Memory => Ok(Arc::new(InMemoryCache::default())),
        CacheType::None => Ok(Arc::new(NoCache)),
    }
}
