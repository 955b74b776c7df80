//! The search contract and result filtering.

use std::future::Future;

use serde::Deserialize;
use url::Url;

use super::error::QueryError;
use crate::types::SearchItem;

/// Results requested per query. Higher layers accept a partial result set.
pub const PAGE_SIZE: u32 = 50;

/// Executes searches against the remote API.
pub trait SearchClient: Send + Sync {
    /// Runs `query` and returns the filtered, normalized results.
    fn search(
        &self,
        token: &str,
        query: &str,
    ) -> impl Future<Output = Result<Vec<SearchItem>, QueryError>> + Send;

    /// Checks `token` and returns the login it belongs to.
    fn authenticate(&self, token: &str) -> impl Future<Output = Result<String, QueryError>> + Send;
}

/// Allow-pattern for result URLs.
///
/// Accepts `https://<host>/<owner>/<repo>/(pull|pulls|issue|issues)/<n>`
/// where owner and repo contain only `[A-Za-z0-9_.-]`. Credentials in the
/// URL and empty path segments are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFilter {
    web_host: String,
}

impl Default for ResultFilter {
    fn default() -> Self {
        ResultFilter::new("github.com")
    }
}

impl ResultFilter {
    pub fn new(web_host: impl Into<String>) -> Self {
        ResultFilter {
            web_host: web_host.into().to_ascii_lowercase(),
        }
    }

    pub fn web_host(&self) -> &str {
        &self.web_host
    }

    pub fn allows(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        if url.scheme() != "https" || url.host_str() != Some(self.web_host.as_str()) {
            return false;
        }
        if url.port().is_some() || url.query().is_some() || url.fragment().is_some() {
            return false;
        }
        if !url.username().is_empty() || url.password().is_some() {
            return false;
        }
        let Some(segments) = url.path_segments() else {
            return false;
        };
        let mut segments: Vec<&str> = segments.collect();
        // One trailing slash is tolerated; results are normalized without it.
        if segments.len() > 1 && segments.last() == Some(&"") {
            segments.pop();
        }
        match segments.as_slice() {
            [owner, repo, kind, number] => {
                is_name(owner)
                    && is_name(repo)
                    && matches!(*kind, "pull" | "pulls" | "issue" | "issues")
                    && !number.is_empty()
                    && number.bytes().all(|b| b.is_ascii_digit())
            }
            _ => false,
        }
    }
}

fn is_name(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    number: u64,
}

/// Parses a search response body, keeping only allowed URLs.
pub fn parse_search_response(body: &str, filter: &ResultFilter) -> Result<Vec<SearchItem>, QueryError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| QueryError::Decode(e.to_string()))?;

    let total = response.items.len();
    let items: Vec<SearchItem> = response
        .items
        .into_iter()
        .filter(|item| filter.allows(&item.html_url))
        .map(|item| SearchItem::new(&item.html_url, item.title, item.number))
        .collect();

    if items.len() < total {
        tracing::debug!(
            dropped = total - items.len(),
            "discarded search results outside the allowed URL shape"
        );
    }
    Ok(items)
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

/// Parses the body of `GET /user`.
pub fn parse_user_response(body: &str) -> Result<String, QueryError> {
    serde_json::from_str::<UserResponse>(body)
        .map(|user| user.login)
        .map_err(|e| QueryError::Decode(e.to_string()))
}
