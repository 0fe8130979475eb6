use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::{
    cache::{Cache, CacheKey, CacheRecord, Relations},
    error::CacheError,
};

use crate::Result;

#[derive(Default)]
struct Store {
    responses: HashMap<String, CacheRecord>,
    relations: HashMap<String, Relations>,
}

/// Process lifetime cache. Meant for short lived processes and tests, its
/// contents are gone on exit. A single lock guards responses and relations.
#[derive(Default)]
pub struct InMemoryCache {
    store: Mutex<Store>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        // Every mutation is a single insert or remove, a poisoned store is
        // still consistent.
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.store().responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        Ok(self.store().responses.get(key.as_str()).cloned())
    }

    fn set(&self, key: &CacheKey, record: &CacheRecord) -> Result<()> {
        self.store()
            .responses
            .insert(key.as_str().to_string(), record.clone());
        Ok(())
    }

    fn reset(&self, key: &CacheKey) -> Result<()> {
        self.store().responses.remove(key.as_str());
        Ok(())
    }

    fn update_expiration(&self, key: &CacheKey, expires_at: DateTime<Utc>) -> Result<()> {
        match self.store().responses.get_mut(key.as_str()) {
            Some(record) => {
                record.expires_at = expires_at;
                Ok(())
            }
            None => Err(CacheError::NotFound(key.to_string()).into()),
        }
    }

    fn set_relations(&self, key: &CacheKey, relations: &Relations) -> Result<()> {
        let mut store = self.store();
        if relations.is_empty() {
            store.relations.remove(key.as_str());
        } else {
            store
                .relations
                .insert(key.as_str().to_string(), relations.clone());
        }
        Ok(())
    }

    fn get_relations(&self, key: &CacheKey) -> Result<Option<Relations>> {
        Ok(self.store().relations.get(key.as_str()).cloned())
    }
}
