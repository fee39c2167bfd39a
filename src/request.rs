use std::env;
use std::iter::FromIterator;

use log::error;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode};
use serde_json::Value;

use crate::error::{ClientError, ResponseContext, Result};
use crate::rate_limit::RateLimitWindow;

/// The static web-app bearer token the upstream ships to every browser.
/// I have no idea where this token is coming from...
pub const FALLBACK_BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub fn user_agent() -> String {
    env::var("MAGPIE_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_owned())
}

pub fn bearer_token() -> String {
    env::var("MAGPIE_BEARER_TOKEN").unwrap_or_else(|_| FALLBACK_BEARER_TOKEN.to_owned())
}

pub fn default_headers() -> HeaderMap {
    HeaderMap::from_iter([(
        HeaderName::from_static("user-agent"),
        HeaderValue::from_str(&user_agent()).expect("user agent is not a valid header value"),
    )])
}

/// A fully-read response. reqwest drops the body once an error is hit so
/// everything is captured eagerly before classification
#[derive(Debug, Clone)]
pub struct Captured {
    pub code: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Captured {
    pub fn rate_limit_window(&self) -> Option<RateLimitWindow> {
        RateLimitWindow::from_source(&self.headers)
    }

    pub fn json(&self) -> Result<Value> {
        serde_json::from_str::<Value>(&self.body).map_err(|_| {
            error!("failed to parse a response body of {} bytes", self.body.len());
            ClientError::Protocol(format!(
                "response body was not valid json (status {})",
                self.code
            ))
        })
    }
}

pub async fn capture(response: Response) -> Result<Captured> {
    let code = response.status();
    let headers = response.headers().clone();
    let body = response.text().await?;
    Ok(Captured {
        code,
        headers,
        body,
    })
}

/// Map a non-2xx status onto the taxonomy. Success statuses return None
pub fn classify(captured: &Captured) -> Option<ClientError> {
    let code = captured.code;
    if code.is_success() {
        return None;
    }
    Some(match code {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth(format!(
            "{} from upstream: {}",
            code.as_u16(),
            captured.body
        )),
        StatusCode::NOT_FOUND => ClientError::NotFound("resource does not exist".to_owned()),
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimit {
            reset_at: captured.rate_limit_window().map(|w| w.reset_at),
        },
        _ => ClientError::Api(ResponseContext {
            body: captured.body.clone(),
            code,
        }),
    })
}
