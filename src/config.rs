//! Config file parsing and validation.

use crate::error::CacheError;
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;

pub const DEFAULT_CACHE_EXPIRATION: &str = "1h";

/// Which storage backend holds cached responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheType {
    #[default]
    File,
    Memory,
    None,
}

impl FromStr for CacheType {
    type Err = CacheError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(CacheType::File),
            "memory" => Ok(CacheType::Memory),
            "none" => Ok(CacheType::None),
            other => Err(CacheError::ConfigurationError(format!(
                "Unknown cache_type {other} - valid types are file, memory, none"
            ))),
        }
    }
}

pub trait ConfigProperties {
    /// Root directory of the file backend.
    fn cache_location(&self) -> Option<&str>;
    fn cache_type(&self) -> CacheType {
        if self.cache_location().is_some() {
            CacheType::File
        } else {
            CacheType::Memory
        }
    }
    /// Lifetime of responses that carry no usable `max-age`, e.g. `1h`.
    fn cache_expiration(&self) -> &str {
        DEFAULT_CACHE_EXPIRATION
    }
}

impl<T: ConfigProperties + ?Sized> ConfigProperties for std::sync::Arc<T> {
    fn cache_location(&self) -> Option<&str> {
        (**self).cache_location()
    }
    fn cache_type(&self) -> CacheType {
        (**self).cache_type()
    }
    fn cache_expiration(&self) -> &str {
        (**self).cache_expiration()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Config {
    cache_location: Option<String>,
    cache_type: Option<CacheType>,
    cache_expiration: Option<String>,
}

impl Config {
    pub fn new<T: Read>(reader: T) -> Result<Self> {
        let config_data = Config::parse(reader)?;
        let cache_location = config_data
            .get("cache_location")
            .map(|location| location.trim_end_matches('/').to_string())
            .filter(|location| !location.is_empty());
        let cache_type = config_data
            .get("cache_type")
            .map(|cache_type| cache_type.parse::<CacheType>())
            .transpose()?;
        if cache_type == Some(CacheType::File) && cache_location.is_none() {
            return Err(CacheError::ConfigurationError(
                "cache_type is file but no cache_location has been provided".to_string(),
            )
            .into());
        }
        let cache_expiration = config_data.get("cache_expiration").cloned();
        Ok(Config {
            cache_location,
            cache_type,
            cache_expiration,
        })
    }

    fn parse<T: Read>(mut reader: T) -> Result<HashMap<String, String>> {
        lazy_static! {
            static ref RE_KEY_VALUE: Regex =
                Regex::new(r"^(?P<key>\w+)\s*=\s*(?P<value>.*)$").unwrap();
        }
        let mut config_data = String::new();
        reader.read_to_string(&mut config_data)?;
        let mut config = HashMap::new();
        for line in config_data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match RE_KEY_VALUE.captures(line) {
                Some(captured_names) => {
                    config.insert(
                        captured_names["key"].to_string(),
                        captured_names["value"].trim().to_string(),
                    );
                }
                None => {
                    return Err(CacheError::ConfigurationError(format!(
                        "Invalid configuration line: {line}"
                    ))
                    .into())
                }
            }
        }
        Ok(config)
    }
}

impl ConfigProperties for Config {
    fn cache_location(&self) -> Option<&str> {
        self.cache_location.as_deref()
    }

    fn cache_type(&self) -> CacheType {
        match self.cache_type {
            Some(cache_type) => cache_type,
            None if self.cache_location.is_some() => CacheType::File,
            None => CacheType::Memory,
        }
    }

    fn cache_expiration(&self) -> &str {
        self.cache_expiration
            .as_deref()
            .unwrap_or(DEFAULT_CACHE_EXPIRATION)
    }
}
