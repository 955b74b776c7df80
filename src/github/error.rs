//! Remote query error types.
//!
//! Failures are classified by what the orchestrator has to do about them:
//!
//! - **Auth**: the token is bad. Surfaced to the user, never retried.
//! - **RateLimited**: carries the time after which polling may resume. The
//!   whole pass stops issuing queries until then.
//! - **Remote**: any other non-success status. Recorded on the group and
//!   retried on the next scheduled pass.
//! - **Transport** / **Decode**: the request never produced a usable
//!   response. Treated like `Remote` by the orchestrator.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Fallback backoff when a rate-limit response carries no usable header.
pub const DEFAULT_RATE_LIMIT_BACKOFF_SECS: i64 = 60;

/// Longest `Retry-After` honoured, in seconds.
const MAX_RETRY_AFTER_SECS: i64 = 24 * 60 * 60;

/// Error from a search or authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Authentication failed. Check your PAT.")]
    Auth,

    #[error("Rate limited. Will retry after backoff.")]
    RateLimited { resume_at: DateTime<Utc> },

    #[error("GitHub API error: {status}")]
    Remote { status: u16 },

    #[error("GitHub request failed: {0}")]
    Transport(String),

    #[error("unexpected GitHub response: {0}")]
    Decode(String),
}

impl QueryError {
    /// The time polling may resume, for rate-limit errors.
    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        match self {
            QueryError::RateLimited { resume_at } => Some(*resume_at),
            _ => None,
        }
    }
}

/// The response headers that influence classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// `Retry-After`: seconds from now.
    pub retry_after: Option<String>,
    /// `X-RateLimit-Reset`: absolute epoch seconds.
    pub reset: Option<String>,
}

impl RateLimitHeaders {
    /// When polling may resume. `Retry-After` wins over the reset header;
    /// with neither (or neither parseable) the fixed fallback applies.
    pub fn resume_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(secs) = self
            .retry_after
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
        {
            return now + Duration::seconds(secs.clamp(0, MAX_RETRY_AFTER_SECS));
        }
        if let Some(reset) = self
            .reset
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
        {
            return reset;
        }
        now + Duration::seconds(DEFAULT_RATE_LIMIT_BACKOFF_SECS)
    }
}

/// Classifies an HTTP status. Returns `None` for success.
pub fn classify_status(
    status: u16,
    headers: &RateLimitHeaders,
    now: DateTime<Utc>,
) -> Option<QueryError> {
    match status {
        200..=299 => None,
        401 => Some(QueryError::Auth),
        403 | 429 => Some(QueryError::RateLimited {
            resume_at: headers.resume_at(now),
        }),
        status => Some(QueryError::Remote { status }),
    }
}
