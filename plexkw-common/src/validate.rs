//! Identifier validation
//!
//! IMDb ids gate every path into the enrichment pipeline; Plex rating keys gate
//! every write against the media server.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Prefix every IMDb title id starts with
pub const IMDB_ID_PREFIX: &str = "tt";

/// Scheme Plex uses for IMDb entries in `Metadata.Guid[].id`
pub const IMDB_GUID_SCHEME: &str = "imdb://";

const IMDB_ID_MIN_LEN: usize = 7;

/// True iff `id` is `tt` followed only by decimal digits, at least 7 chars long.
pub fn is_valid_imdb_id(id: &str) -> bool {
    match id.strip_prefix(IMDB_ID_PREFIX) {
        Some(digits) => {
            id.len() >= IMDB_ID_MIN_LEN && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// True iff `key` is non-empty and made only of decimal digits.
pub fn is_valid_rating_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_digit())
}

/// A validated IMDb title id (e.g. `tt0111161`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImdbId(String);

impl ImdbId {
    pub fn parse(id: &str) -> Result<Self> {
        if is_valid_imdb_id(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(Error::InvalidInput(format!("Invalid IMDb ID: {}", id)))
        }
    }

    /// Extract the id from a Plex guid such as `imdb://tt0111161`.
    ///
    /// Returns `None` for other schemes and for malformed ids.
    pub fn from_guid(guid: &str) -> Option<Self> {
        guid.strip_prefix(IMDB_GUID_SCHEME)
            .and_then(|id| Self::parse(id).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ImdbId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ImdbId> for String {
    fn from(id: ImdbId) -> Self {
        id.0
    }
}

/// A validated Plex rating key (numeric item handle)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RatingKey(String);

impl RatingKey {
    pub fn parse(key: &str) -> Result<Self> {
        if is_valid_rating_key(key) {
            Ok(Self(key.to_string()))
        } else {
            Err(Error::InvalidInput(format!("Invalid rating key: {}", key)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RatingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RatingKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RatingKey> for String {
    fn from(key: RatingKey) -> Self {
        key.0
    }
}
