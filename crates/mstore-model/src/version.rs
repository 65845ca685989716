//! Timestamp-based version identifiers.
//!
//! A version names one append event in a manifest. Freshly generated values
//! use the canonical `YYYY-MM-DDTHH:mm:ss.sss±HH:MM` form; strings carrying a
//! trailing bracketed zone name (`...+01:00[Europe/Paris]`) are still accepted
//! on read so older manifests keep loading.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// strftime pattern for canonical version strings
pub const VERSION_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Errors from parsing version strings and offsets
#[derive(Debug, Error)]
pub enum VersionParseError {
    #[error("invalid version timestamp '{input}': {source}")]
    Timestamp {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("malformed zone name suffix in version '{0}'")]
    ZoneName(String),

    #[error("invalid UTC offset '{0}', expected ±HH:MM")]
    Offset(String),
}

/// A version identifier: the raw string plus the instant it denotes.
///
/// Identity (`==`, hashing) is the exact string, which is what manifest
/// lookups match on. Chronological order is by absolute instant and is
/// only available through [`Version::compare`], since two distinct strings
/// may denote the same instant under different offsets.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    instant: DateTime<FixedOffset>,
}

impl Version {
    /// Current instant in the given offset, truncated to milliseconds.
    pub fn now(offset: FixedOffset) -> Self {
        Self::at(Utc::now().with_timezone(&offset))
    }

    /// Version for an arbitrary instant, in canonical form.
    pub fn at(instant: DateTime<FixedOffset>) -> Self {
        let raw = instant.format(VERSION_FORMAT).to_string();
        // Re-parse so the stored instant carries the same millisecond truncation as the string.
        let instant = DateTime::parse_from_rfc3339(&raw).unwrap_or(instant);
        Self { raw, instant }
    }

    /// Parse a canonical or legacy bracketed version string.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let stamp = strip_zone_name(input)?;
        let instant =
            DateTime::parse_from_rfc3339(stamp).map_err(|source| VersionParseError::Timestamp {
                input: input.to_string(),
                source,
            })?;
        Ok(Self {
            raw: input.to_string(),
            instant,
        })
    }

    /// Whether `input` parses as an offset-qualified instant.
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// Signed comparison by absolute instant.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.instant.cmp(&other.instant)
    }

    /// Whether the raw string is in the canonical millisecond + offset form.
    pub fn is_canonical(&self) -> bool {
        self.raw == self.instant.format(VERSION_FORMAT).to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn instant(&self) -> DateTime<FixedOffset> {
        self.instant
    }
}

fn strip_zone_name(input: &str) -> Result<&str, VersionParseError> {
    let Some(body) = input.strip_suffix(']') else {
        return Ok(input);
    };
    match body.rfind('[') {
        Some(open) if open + 1 < body.len() => Ok(&body[..open]),
        _ => Err(VersionParseError::ZoneName(input.to_string())),
    }
}

/// Parse a `±HH:MM` offset (also `Z` and `UTC`).
pub fn parse_offset(input: &str) -> Result<FixedOffset, VersionParseError> {
    let err = || VersionParseError::Offset(input.to_string());
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(err);
    }

    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(err()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(err)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(err());
    }
    let hours: i32 = hours.parse().map_err(|_| err())?;
    let minutes: i32 = minutes.parse().map_err(|_| err())?;
    if hours > 23 || minutes > 59 {
        return Err(err());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(err)
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialEq<str> for Version {
    fn eq(&self, other: &str) -> bool {
        self.raw == other
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.raw == *other
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
