use std::fmt::Display;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Cache I/O failure: {0}")]
    IoFailure(String),
    #[error("Corrupt cache record: {0}")]
    CorruptRecord(String),
    #[error("HTTP transport error: {0}")]
    HttpTransportError(String),
    #[error("Decode error: {0}")]
    DecodeError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Time conversion error: {0}")]
    TimeConversionError(String),
    #[error("Cache location does not exist: {0}")]
    CacheLocationDoesNotExist(String),
    #[error("Cache location is not a directory: {0}")]
    CacheLocationIsNotADirectory(String),
    #[error("Cache location is not writeable: {0}")]
    CacheLocationIsNotWriteable(String),
    #[error("Cache location write test failed: {0}")]
    CacheLocationWriteTestFailed(String),
}

impl CacheError {
    /// Errors that mean "treat this entry as not cached" rather than "the
    /// backend is broken".
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::NotFound(_) | CacheError::CorruptRecord(_))
    }
}

pub trait AddContext<T, E>: Context<T, E> {
    fn err_context<C: Display + Send + Sync + 'static>(self, msg: C) -> Result<T, anyhow::Error>
    where
        Self: Sized,
    {
        self.with_context(|| msg.to_string())
    }
}

impl<U, T, E> AddContext<T, E> for U where U: Context<T, E> {}

pub fn gen<T: AsRef<str>>(msg: T) -> anyhow::Error {
    anyhow!(msg.as_ref().to_string())
}

pub fn io_failure(path: &Path, err: io::Error) -> anyhow::Error {
    CacheError::IoFailure(format!("{}: {}", path.display(), err)).into()
}
