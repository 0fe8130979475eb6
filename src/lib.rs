pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod io;
pub mod logging;
pub mod mediatype;
pub mod revalidation;
pub mod time;
pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate derive_builder;

pub use cache::{Cache, CacheKey, CacheRecord, ExpirationPolicy, FileCache, InMemoryCache, NoCache};
pub use revalidation::{CacheStatus, CachedResponse, HyperResource, RevalidationEngine};
