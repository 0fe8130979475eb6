use chrono::{DateTime, TimeDelta, Utc};

use crate::config::ConfigProperties;
use crate::error::CacheError;
use crate::http::{Headers, CACHE_CONTROL};
use crate::time::Seconds;
use crate::Result;

pub const DEFAULT_EXPIRATION: Seconds = Seconds::new(3600);

/// Computes when a response stops being fresh from its Cache-Control
/// `max-age`, falling back to a default lifetime.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExpirationPolicy {
    default_ttl: TimeDelta,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        ExpirationPolicy::new(DEFAULT_EXPIRATION)
    }
}

impl ExpirationPolicy {
    pub fn new(default_ttl: Seconds) -> Self {
        ExpirationPolicy {
            default_ttl: default_ttl.to_delta(),
        }
    }

    pub fn from_config(config: &impl ConfigProperties) -> Result<Self> {
        let expiration = config.cache_expiration();
        let default_ttl = Seconds::try_from(expiration).map_err(|err| {
            CacheError::ConfigurationError(format!(
                "Cannot parse cache expiration {expiration}. Check your configuration \
                 file and make sure the key cache_expiration has a valid time format: {err}"
            ))
        })?;
        Ok(ExpirationPolicy::new(default_ttl))
    }

    pub fn default_ttl(&self) -> TimeDelta {
        self.default_ttl
    }

    /// Never fails. A missing or unparseable `max-age` yields the default
    /// lifetime; an explicit negative one yields an already expired stamp.
    pub fn expires_at(&self, headers: &Headers, now: DateTime<Utc>) -> DateTime<Utc> {
        let ttl = headers
            .get(CACHE_CONTROL)
            .and_then(|cc| max_age(cc))
            .unwrap_or(self.default_ttl);
        now.checked_add_signed(ttl)
            .or_else(|| now.checked_add_signed(self.default_ttl))
            .unwrap_or(now)
    }
}

/// First parseable `max-age=<seconds>` among whitespace separated directives.
fn max_age(cache_control: &str) -> Option<TimeDelta> {
    cache_control.split_whitespace().find_map(|field| {
        let (name, value) = field.split_once('=')?;
        if name != "max-age" {
            return None;
        }
        let seconds = value.strip_suffix(',').unwrap_or(value).parse::<i64>().ok()?;
        TimeDelta::try_seconds(seconds)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn cache_control(value: &str) -> Headers {
        let mut headers = Headers::new();
        headers.set("Cache-Control", value);
        headers
    }

    #[test]
    fn test_max_age_parsing() {
        let test_table = vec![
            ("max-age=60", Some(60)),
            ("public max-age=60", Some(60)),
            ("private, max-age=120", Some(120)),
            ("max-age=300, private, must-revalidate", Some(300)),
            ("max-age=0", Some(0)),
            ("max-age=-1", Some(-1)),
            ("max-age=-300", Some(-300)),
            // first parseable match wins
            ("max-age=abc max-age=30", Some(30)),
            ("max-age=10 max-age=20", Some(10)),
            // directive names are case sensitive
            ("Max-Age=60", None),
            ("max-age", None),
            ("max-age=", None),
            ("max-age=1.5", None),
            ("no-cache", None),
            ("", None),
        ];
        for (header, expected) in test_table {
            assert_eq!(
                expected.map(TimeDelta::seconds),
                max_age(header),
                "header: {header}"
            );
        }
    }

    #[test]
    fn test_expires_at_with_max_age() {
        let policy = ExpirationPolicy::default();
        let expires = policy.expires_at(&cache_control("max-age=60"), t0());
        assert_eq!(t0() + TimeDelta::seconds(60), expires);
    }

    #[test]
    fn test_expires_at_defaults_to_one_hour() {
        let policy = ExpirationPolicy::default();
        assert_eq!(
            t0() + TimeDelta::hours(1),
            policy.expires_at(&Headers::new(), t0())
        );
        assert_eq!(
            t0() + TimeDelta::hours(1),
            policy.expires_at(&cache_control("max-age=soon"), t0())
        );
    }

    #[test]
    fn test_negative_max_age_is_immediately_stale() {
        let policy = ExpirationPolicy::default();
        let expires = policy.expires_at(&cache_control("max-age=-1"), t0());
        assert!(expires < t0());
    }

    #[test]
    fn test_fresh_one_second_before_max_age_stale_one_after() {
        let policy = ExpirationPolicy::default();
        for n in [1i64, 60, 3600, 86400] {
            let expires = policy.expires_at(&cache_control(&format!("max-age={n}")), t0());
            assert!(t0() + TimeDelta::seconds(n - 1) < expires);
            assert!(t0() + TimeDelta::seconds(n + 1) >= expires);
        }
    }

    #[test]
    fn test_configured_default_ttl() {
        let policy = ExpirationPolicy::new(Seconds::new(120));
        assert_eq!(
            t0() + TimeDelta::seconds(120),
            policy.expires_at(&Headers::new(), t0())
        );
    }

    #[test]
    fn test_huge_max_age_does_not_overflow() {
        let policy = ExpirationPolicy::default();
        let expires = policy.expires_at(&cache_control("max-age=9223372036854775807"), t0());
        assert_eq!(t0() + TimeDelta::hours(1), expires);
    }
}
