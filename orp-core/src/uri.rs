//! Scheme-qualified `orp://` addresses.
//!
//! The authority is an opaque node identifier, never a DNS name. Keys in the
//! resolution cache are the exact original strings, so a `ScopedUri` keeps the
//! raw input next to the parsed parts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::UriError;

/// Scheme prefix recognised by every interception site.
pub const SCHEME_PREFIX: &str = "orp://";

/// A parsed `orp://authority[/path]` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedUri {
    raw: String,
    authority: String,
    path: String,
}

impl ScopedUri {
    /// Parse `orp://<authority>[/<path>]`.
    ///
    /// The path defaults to `/`. An empty authority is rejected.
    pub fn parse(input: &str) -> Result<Self, UriError> {
        let rest = input
            .strip_prefix(SCHEME_PREFIX)
            .ok_or_else(|| UriError::MissingScheme {
                input: input.to_string(),
            })?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        if authority.is_empty() {
            return Err(UriError::MissingAuthority {
                input: input.to_string(),
            });
        }

        Ok(Self {
            raw: input.to_string(),
            authority: authority.to_string(),
            path: path.to_string(),
        })
    }

    /// Cheap prefix test; does not validate the authority.
    pub fn is_scoped(input: &str) -> bool {
        input.starts_with(SCHEME_PREFIX)
    }

    /// The exact string this URI was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Path component, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `http://<host>:<port><path>` for a local candidate port.
    pub fn local_http_url(&self, host: &str, port: u16) -> String {
        format!("http://{host}:{port}{}", self.path)
    }
}

impl fmt::Display for ScopedUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

impl FromStr for ScopedUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ScopedUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ScopedUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
