use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use thiserror::Error;

/// Context kept around for failed responses since reqwest throws the
/// body away when it encounters errors
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub body: String,
    pub code: StatusCode,
}

/// Every failure a caller can observe from this crate. Raw upstream
/// bodies only ever appear inside these variants, never as return values
#[derive(Error, Debug)]
pub enum ClientError {
    /// 401/403, a missing credential field or a failed login step.
    /// Never retried
    #[error("authentication failed: {0}")]
    Auth(String),
    /// 404 or an absent/suspended/tombstoned entity. Never retried
    #[error("not found: {0}")]
    NotFound(String),
    /// 429 or guest token capacity exhaustion
    #[error("rate limited, resets at {reset_at:?}")]
    RateLimit { reset_at: Option<DateTime<Utc>> },
    /// Any other non-2xx response
    #[error("api error {}: {}", .0.code, .0.body)]
    Api(ResponseContext),
    /// The response parsed as a status we accept but its payload wasn't
    /// shaped like anything we recognize
    #[error("unexpected response shape: {0}")]
    Protocol(String),
    /// Transport level failure
    #[error("network error: {0}")]
    Network(String),
}

impl ClientError {
    /// Whether the request engine is allowed to try again. Auth and
    /// NotFound short-circuit retries entirely, rate limits are routed
    /// through the strategy instead of the generic retry loop
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Api(_) | ClientError::Protocol(_) | ClientError::Network(_) => true,
            _ => false,
        }
    }

    pub(crate) fn protocol(context: &str) -> Self {
        ClientError::Protocol(context.to_owned())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
