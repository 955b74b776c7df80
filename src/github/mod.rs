//! GitHub search client.
//!
//! One GET per group per pass against the issue search endpoint, with
//! failures classified for the orchestrator:
//!
//! - 401 ends the group's poll with an auth error
//! - 403/429 carry a resume time and stop the rest of the pass
//! - results outside the pull-request/issue URL shape are discarded

mod client;
mod error;
mod search;

pub use client::{DEFAULT_API_BASE, OctocrabSearchClient};
pub use error::{DEFAULT_RATE_LIMIT_BACKOFF_SECS, QueryError, RateLimitHeaders, classify_status};
pub use search::{PAGE_SIZE, ResultFilter, SearchClient, parse_search_response, parse_user_response};
