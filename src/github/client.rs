//! Octocrab-backed search client.
//!
//! Requests go through `Octocrab::_get` so the raw status and headers are
//! available for rate-limit classification; octocrab's own error mapping
//! would discard `Retry-After`.

use std::sync::Mutex;

use chrono::Utc;
use octocrab::Octocrab;
use tracing::debug;

use super::error::{QueryError, RateLimitHeaders, classify_status};
use super::search::{PAGE_SIZE, ResultFilter, SearchClient, parse_search_response, parse_user_response};
use crate::types::SearchItem;

/// Default REST API base.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// A search client authenticated per call with the user's token.
///
/// The octocrab instance for the most recent token is cached, so a pass
/// over many groups builds one HTTP client.
pub struct OctocrabSearchClient {
    api_base: String,
    filter: ResultFilter,
    cached: Mutex<Option<(String, Octocrab)>>,
}

impl OctocrabSearchClient {
    pub fn new(api_base: impl Into<String>, filter: ResultFilter) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            filter,
            cached: Mutex::new(None),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn client_for(&self, token: &str) -> Result<Octocrab, QueryError> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_token, client)) = cached.as_ref()
            && cached_token == token
        {
            return Ok(client.clone());
        }

        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .base_uri(self.api_base.as_str())
            .map_err(|e| QueryError::Transport(e.to_string()))?
            .build()
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        *cached = Some((token.to_string(), client.clone()));
        Ok(client)
    }

    /// Issues a GET and returns the body of a successful response.
    ///
    /// `on_failure` classifies non-success statuses.
    async fn get_body(
        &self,
        token: &str,
        path: String,
        on_failure: impl FnOnce(u16, &RateLimitHeaders) -> QueryError,
    ) -> Result<String, QueryError> {
        let client = self.client_for(token)?;
        let response = client
            ._get(path)
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let header = |name: &str| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            };
            let headers = RateLimitHeaders {
                retry_after: header("retry-after"),
                reset: header("x-ratelimit-reset"),
            };
            return Err(on_failure(status, &headers));
        }

        client
            .body_to_string(response)
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))
    }
}

impl std::fmt::Debug for OctocrabSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabSearchClient")
            .field("api_base", &self.api_base)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Builds `/search/issues?q=<query>&per_page=50`.
fn search_path(query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("/search/issues?q={encoded}&per_page={PAGE_SIZE}")
}

impl SearchClient for OctocrabSearchClient {
    async fn search(&self, token: &str, query: &str) -> Result<Vec<SearchItem>, QueryError> {
        let now = Utc::now();
        let body = self
            .get_body(token, search_path(query), |status, headers| {
                classify_status(status, headers, now).unwrap_or(QueryError::Remote { status })
            })
            .await?;
        let items = parse_search_response(&body, &self.filter)?;
        debug!(query, results = items.len(), "search completed");
        Ok(items)
    }

    async fn authenticate(&self, token: &str) -> Result<String, QueryError> {
        let body = self
            .get_body(token, "/user".to_string(), |status, _| match status {
                401 | 403 => QueryError::Auth,
                status => QueryError::Remote { status },
            })
            .await?;
        parse_user_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_path_encodes_query() {
        assert_eq!(
            search_path("is:pr is:open review-requested:@me"),
            "/search/issues?q=is%3Apr+is%3Aopen+review-requested%3A%40me&per_page=50"
        );
    }

    #[test]
    fn search_path_escapes_separators() {
        let path = search_path("a&b=c#d");
        assert!(path.starts_with("/search/issues?q=a%26b%3Dc%23d&"));
    }

    #[test]
    fn api_base_trailing_slash_is_dropped() {
        let client = OctocrabSearchClient::new("https://ghe.example.com/api/v3/", ResultFilter::default());
        assert_eq!(client.api_base(), "https://ghe.example.com/api/v3");
    }
}
