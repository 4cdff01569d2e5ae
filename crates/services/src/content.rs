//! Content pre-filter, applied before any transaction opens.
//!
//! Rejects empty bodies and bodies containing a blacklisted substring
//! (case-insensitive), and handles the anonymous-posting marker: a body
//! starting with the marker is attributed to a fixed placeholder identity and
//! stored without the marker, unless the body is the marker alone.

use domains::{DomainError, IdentityKey, Result};

pub const DEFAULT_ANONYMOUS_MARKER: &str = "££";
pub const DEFAULT_ANONYMOUS_IDENTITY: &str = "1.1.1.1";

pub struct ContentFilter {
    blacklist: Vec<String>,
    marker: String,
    anonymous_identity: IdentityKey,
}

/// Body and author attribution that passed the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenedPost {
    pub content: String,
    pub author: IdentityKey,
}

impl ContentFilter {
    pub fn new<I, S>(blacklist: I, marker: impl Into<String>, anonymous_identity: IdentityKey) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blacklist = blacklist
            .into_iter()
            .map(|word| word.as_ref().trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        Self {
            blacklist,
            marker: marker.into(),
            anonymous_identity,
        }
    }

    pub fn screen(&self, raw: &str, author: &IdentityKey) -> Result<ScreenedPost> {
        if raw.trim().is_empty() {
            return Err(DomainError::BadRequest("Empty post".into()));
        }
        let lowered = raw.to_lowercase();
        if self.blacklist.iter().any(|word| lowered.contains(word.as_str())) {
            return Err(DomainError::BadRequest("Post rejected".into()));
        }

        if self.marker.is_empty() {
            return Ok(ScreenedPost { content: raw.to_string(), author: author.clone() });
        }
        match raw.strip_prefix(self.marker.as_str()) {
            Some(rest) => Ok(ScreenedPost {
                content: if rest.is_empty() { raw.to_string() } else { rest.to_string() },
                author: self.anonymous_identity.clone(),
            }),
            None => Ok(ScreenedPost { content: raw.to_string(), author: author.clone() }),
        }
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(
            Vec::<String>::new(),
            DEFAULT_ANONYMOUS_MARKER,
            IdentityKey::new(DEFAULT_ANONYMOUS_IDENTITY),
        )
    }
}
