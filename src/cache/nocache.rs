use chrono::{DateTime, Utc};

use crate::cache::{Cache, CacheKey, CacheRecord, Relations};
use crate::error::CacheError;

use crate::Result;

/// Backend that stores nothing. Every lookup is a miss.
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &CacheKey) -> Result<Option<CacheRecord>> {
        Ok(None)
    }
    fn set(&self, _key: &CacheKey, _record: &CacheRecord) -> Result<()> {
        Ok(())
    }
    fn reset(&self, _key: &CacheKey) -> Result<()> {
        Ok(())
    }
    fn update_expiration(&self, key: &CacheKey, _expires_at: DateTime<Utc>) -> Result<()> {
        // nothing is ever stored, so there is nothing to update
        Err(CacheError::NotFound(key.to_string()).into())
    }
    fn set_relations(&self, _key: &CacheKey, _relations: &Relations) -> Result<()> {
        Ok(())
    }
    fn get_relations(&self, _key: &CacheKey) -> Result<Option<Relations>> {
        Ok(None)
    }
}
