//! Search results and URL identity.

use serde::{Deserialize, Serialize};

/// One remote match, keyed by its normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    /// Normalized, without trailing slashes.
    pub url: String,
    pub title: String,
    pub number: u64,
}

impl SearchItem {
    /// Builds an item, normalizing the URL.
    pub fn new(url: &str, title: impl Into<String>, number: u64) -> Self {
        SearchItem {
            url: normalize_url(url).to_string(),
            title: title.into(),
            number,
        }
    }
}

/// Strips every trailing slash.
///
/// The result is the identity key used when matching results to tabs.
pub fn normalize_url(url: &str) -> &str {
    url.trim_end_matches('/')
}
