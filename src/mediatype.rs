//! Content-Type parsing. The cache stores the parsed value next to the
//! response so a decoder can be picked without re-reading headers.

use crate::error::CacheError;
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaType {
    /// e.g. `application`
    pub main_type: String,
    /// e.g. `vnd.api` for `application/vnd.api+json`
    pub sub_type: String,
    pub suffix: Option<String>,
    pub params: Vec<(String, String)>,
    /// Serialization format used to pick a decoder, e.g. `json`
    pub format: String,
}

impl MediaType {
    pub fn parse(value: &str) -> Result<Self> {
        lazy_static! {
            static ref RE_MEDIA_TYPE: Regex =
                Regex::new(r"^\s*([\w.+-]+)/([\w.-]+)(?:\+([\w.-]+))?\s*$").unwrap();
        }
        let mut pieces = value.split(';');
        let essence = pieces.next().unwrap_or_default();
        let caps = RE_MEDIA_TYPE.captures(essence).ok_or_else(|| {
            CacheError::DecodeError(format!("Invalid media type: {value}"))
        })?;
        let main_type = caps[1].to_lowercase();
        let sub_type = caps[2].to_lowercase();
        let suffix = caps.get(3).map(|m| m.as_str().to_lowercase());
        let params = pieces
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                Some((
                    key.trim().to_lowercase(),
                    value.trim().trim_matches('"').to_string(),
                ))
            })
            .collect();
        let format = suffix.clone().unwrap_or_else(|| sub_type.clone());
        Ok(MediaType {
            main_type,
            sub_type,
            suffix,
            params,
            format,
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        if let Some(suffix) = &self.suffix {
            write!(f, "+{suffix}")?;
        }
        for (key, value) in &self.params {
            write!(f, "; {key}={value}")?;
        }
        Ok(())
    }
}
