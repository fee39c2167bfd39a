use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::endpoints::{rest_url, Operation};
use crate::error::{ClientError, Result};
use crate::guest::GuestTokenManager;
use crate::rate_limit::{
    backoff_delay, default_jitter, politeness_limiter, RateLimitStrategy, UnscopedLimiter,
    WaitStrategy,
};
use crate::request;
use crate::session::{Session, SessionKey};

pub use paginate::{Page, Paginator, Progress};
pub use transport::{HttpTransport, RequestBody, Transport, WireRequest};

pub mod paginate;
pub mod transport;

/// Per-call knobs for [`Client::request`]
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<RequestBody>,
    /// Authenticated or guest headers; defaults to authenticated when
    /// credentials exist
    pub authenticated: Option<bool>,
    /// Endpoint name for advisory guest rate-limit bookkeeping
    pub endpoint: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            authenticated: None,
            endpoint: None,
        }
    }
}

/// Parsed GraphQL payload plus whatever bottom cursor was found in it
#[derive(Debug)]
pub struct GraphqlResponse {
    pub data: Value,
    pub cursor: Option<String>,
}

pub struct ClientBuilder {
    bearer: Option<String>,
    max_retries: u32,
    strategy: Box<dyn RateLimitStrategy>,
    key: Option<SessionKey>,
    transport: Option<Box<dyn Transport>>,
    request_period: Duration,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            bearer: None,
            max_retries: 3,
            strategy: Box::new(WaitStrategy::default()),
            key: None,
            transport: None,
            request_period: Duration::from_millis(1200),
        }
    }
}

impl ClientBuilder {
    pub fn bearer_token(mut self, bearer: &str) -> Self {
        self.bearer = Some(bearer.to_owned());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn rate_limit_strategy(mut self, strategy: Box<dyn RateLimitStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn session_key(mut self, key: SessionKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Minimum spacing between wire calls
    pub fn request_period(mut self, period: Duration) -> Self {
        self.request_period = period.max(Duration::from_millis(1));
        self
    }

    pub fn build(self) -> Client {
        let http = Arc::new(reqwest::Client::new());
        let bearer = self.bearer.unwrap_or_else(request::bearer_token);
        let guest = Arc::new(GuestTokenManager::new(Arc::clone(&http), bearer.clone()));
        let mut session = Session::new(Arc::clone(&http), bearer, Arc::clone(&guest));
        if let Some(key) = self.key {
            session = session.with_key(key);
        }
        Client {
            transport: self
                .transport
                .unwrap_or_else(|| Box::new(HttpTransport::new(http))),
            session: Arc::new(session),
            guest,
            strategy: self.strategy,
            limiter: Arc::new(politeness_limiter_with(self.request_period)),
            max_retries: self.max_retries,
        }
    }
}

fn politeness_limiter_with(period: Duration) -> UnscopedLimiter {
    use governor::{Quota, RateLimiter};
    match Quota::with_period(period) {
        Some(quota) => RateLimiter::direct(quota),
        None => politeness_limiter(),
    }
}

/// The single chokepoint for all wire traffic: header selection, status
/// classification, retry with backoff and the pagination primitive all
/// live here
pub struct Client {
    transport: Box<dyn Transport>,
    session: Arc<Session>,
    guest: Arc<GuestTokenManager>,
    strategy: Box<dyn RateLimitStrategy>,
    limiter: Arc<UnscopedLimiter>,
    max_retries: u32,
}

impl Clone for Client {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            session: Arc::clone(&self.session),
            guest: Arc::clone(&self.guest),
            strategy: self.strategy.clone(),
            limiter: Arc::clone(&self.limiter),
            max_retries: self.max_retries,
        }
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn guest(&self) -> &Arc<GuestTokenManager> {
        &self.guest
    }

    /// Issue one logical request, transparently retrying transient
    /// failures. Auth and NotFound short-circuit regardless of the retry
    /// budget; 429 goes through the configured strategy
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<Value> {
        let authenticated = options
            .authenticated
            .unwrap_or_else(|| self.session.is_authenticated());
        let mut attempts: u32 = 0;
        let mut waited_for_reset = false;
        loop {
            self.limiter.until_ready_with_jitter(default_jitter()).await;
            let headers = self.session.headers(authenticated).await?;
            let guest_token = headers
                .get("x-guest-token")
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_owned());
            let wire = WireRequest {
                method: options.method.clone(),
                url: url.to_owned(),
                headers,
                body: options.body.clone(),
            };
            let captured = match self.transport.execute(wire).await {
                Ok(captured) => captured,
                Err(error) => {
                    if error.is_retryable() && attempts < self.max_retries {
                        attempts += 1;
                        warn!(
                            "transport failure on {} (attempt {}/{}): {}",
                            url, attempts, self.max_retries, error
                        );
                        tokio::time::sleep(backoff_delay(attempts - 1)).await;
                        continue;
                    }
                    return Err(error);
                }
            };
            if let (Some(token), Some(endpoint)) = (&guest_token, &options.endpoint) {
                self.guest.record_rate_limit(token, endpoint, &captured.headers);
            }
            match request::classify(&captured) {
                // some REST endpoints acknowledge with an empty body
                None if captured.body.trim().is_empty() => return Ok(Value::Null),
                None => match captured.json() {
                    Ok(value) => return Ok(value),
                    Err(_) if attempts < self.max_retries => {
                        attempts += 1;
                        tokio::time::sleep(backoff_delay(attempts - 1)).await;
                    }
                    Err(error) => return Err(error),
                },
                Some(ClientError::RateLimit { .. }) => {
                    debug!("rate limited on {}", url);
                    self.strategy
                        .on_rate_limit(captured.rate_limit_window(), waited_for_reset)
                        .await?;
                    waited_for_reset = true;
                }
                Some(error) if error.is_retryable() && attempts < self.max_retries => {
                    attempts += 1;
                    warn!(
                        "retrying {} after {} (attempt {}/{})",
                        url, captured.code, attempts, self.max_retries
                    );
                    tokio::time::sleep(backoff_delay(attempts - 1)).await;
                }
                Some(error) => return Err(error),
            }
        }
    }

    /// Issue a GraphQL operation: GET with url-encoded variables and
    /// features for queries, POST with a JSON body for mutations. The
    /// payload comes back with whatever bottom cursor it carried
    pub async fn graphql(
        &self,
        operation: Operation,
        variables: Value,
        authenticated: Option<bool>,
    ) -> Result<GraphqlResponse> {
        let options = if operation.is_mutation() {
            RequestOptions {
                method: Method::POST,
                body: Some(RequestBody::Json(serde_json::json!({
                    "variables": variables,
                    "features": operation.features(),
                    "queryId": operation.query_id(),
                }))),
                authenticated,
                endpoint: Some(operation.to_string()),
            }
        } else {
            RequestOptions {
                method: Method::GET,
                body: None,
                authenticated,
                endpoint: Some(operation.to_string()),
            }
        };
        let url = if operation.is_mutation() {
            operation.url()
        } else {
            Url::parse_with_params(
                &operation.url(),
                &[
                    ("variables", variables.to_string()),
                    ("features", operation.features().to_string()),
                ],
            )
            .map_err(|_| ClientError::protocol("could not format the operation url"))?
            .as_str()
            .to_owned()
        };
        let mut payload = self.request(&url, options).await?;
        let data = payload
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        if data.is_null() {
            if let Some(message) = payload["errors"][0]["message"].as_str() {
                return Err(ClientError::Protocol(format!(
                    "{} returned no data: {}",
                    operation, message
                )));
            }
        }
        let cursor = crate::timeline::cursor::extract_bottom_cursor(&data);
        Ok(GraphqlResponse { data, cursor })
    }

    /// Form-encoded REST call through the same header and error pipeline
    pub async fn rest(
        &self,
        path: &str,
        body: Option<Vec<(String, String)>>,
        authenticated: Option<bool>,
    ) -> Result<Value> {
        let options = RequestOptions {
            method: if body.is_some() {
                Method::POST
            } else {
                Method::GET
            },
            body: body.map(RequestBody::Form),
            authenticated,
            endpoint: Some(path.to_owned()),
        };
        self.request(&rest_url(path), options).await
    }

    /// Absolute-URL variant of [`Client::rest`] for hosts outside the
    /// main REST base
    pub async fn rest_absolute(
        &self,
        url: &str,
        body: Option<Vec<(String, String)>>,
        authenticated: Option<bool>,
    ) -> Result<Value> {
        let options = RequestOptions {
            method: if body.is_some() {
                Method::POST
            } else {
                Method::GET
            },
            body: body.map(RequestBody::Form),
            authenticated,
            endpoint: None,
        };
        self.request(url, options).await
    }

    /// Lazy cursor-walking sequence of pages for a GraphQL timeline
    /// operation. Each call to [`Paginator::next_page`] issues exactly
    /// one request
    pub fn paginate<T>(
        &self,
        operation: Operation,
        variables: Value,
        extract: Box<dyn Fn(&Value) -> Vec<T> + Send + Sync>,
    ) -> Paginator<'_, T> {
        Paginator::new(self, operation, variables, extract)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;

    use crate::error::{ClientError, Result};
    use crate::guest::{GuestToken, TokenSource};
    use crate::request::Captured;
    use crate::session::Session;

    use super::transport::{Transport, WireRequest};
    use super::*;

    /// Canned transport: pops one scripted outcome per call and counts
    /// how many wire calls were made
    #[derive(Clone)]
    pub struct ScriptedTransport {
        inner: Arc<ScriptedInner>,
    }

    struct ScriptedInner {
        responses: Mutex<VecDeque<std::result::Result<Captured, String>>>,
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(ScriptedInner {
                    responses: Mutex::new(VecDeque::new()),
                    calls: AtomicUsize::new(0),
                    urls: Mutex::new(Vec::new()),
                }),
            }
        }

        pub fn push_status(&self, code: StatusCode, body: &str) -> &Self {
            self.inner.responses.lock().push_back(Ok(Captured {
                code,
                headers: HeaderMap::new(),
                body: body.to_owned(),
            }));
            self
        }

        pub fn push_response(&self, captured: Captured) -> &Self {
            self.inner.responses.lock().push_back(Ok(captured));
            self
        }

        pub fn push_network_failure(&self, message: &str) -> &Self {
            self.inner
                .responses
                .lock()
                .push_back(Err(message.to_owned()));
            self
        }

        pub fn calls(&self) -> usize {
            self.inner.calls.load(Ordering::SeqCst)
        }

        pub fn urls(&self) -> Vec<String> {
            self.inner.urls.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: WireRequest) -> Result<Captured> {
            self.inner.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.urls.lock().push(request.url);
            match self.inner.responses.lock().pop_front() {
                Some(Ok(captured)) => Ok(captured),
                Some(Err(message)) => Err(ClientError::Network(message)),
                None => panic!("scripted transport ran out of responses"),
            }
        }
    }

    struct StaticSource;

    #[async_trait]
    impl TokenSource for StaticSource {
        async fn issue(&self) -> Result<GuestToken> {
            Ok(GuestToken::new("guest-token".to_owned()))
        }
    }

    /// A client wired to a scripted transport, a static guest token and
    /// no politeness delay
    pub fn scripted_client(
        transport: ScriptedTransport,
        strategy: Box<dyn RateLimitStrategy>,
        max_retries: u32,
    ) -> Client {
        let http = Arc::new(reqwest::Client::new());
        let guest = Arc::new(GuestTokenManager::with_source(
            Box::new(StaticSource),
            "bearer".to_owned(),
        ));
        let session = Session::new(Arc::clone(&http), "bearer".to_owned(), Arc::clone(&guest));
        Client {
            transport: Box::new(transport),
            session: Arc::new(session),
            guest,
            strategy,
            limiter: Arc::new(politeness_limiter_with(Duration::from_millis(1))),
            max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use crate::rate_limit::ErrorStrategy;

    use super::testing::{scripted_client, ScriptedTransport};
    use super::*;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[tokio::test]
    async fn auth_failures_never_retry() {
        init_logging();
        let transport = ScriptedTransport::new();
        transport.push_status(StatusCode::UNAUTHORIZED, "bad token");
        let client = scripted_client(transport.clone(), Box::new(ErrorStrategy), 3);
        let error = client
            .request("https://example.invalid/x", RequestOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(error, ClientError::Auth(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn not_found_never_retries() {
        let transport = ScriptedTransport::new();
        transport.push_status(StatusCode::NOT_FOUND, "");
        let client = scripted_client(transport.clone(), Box::new(ErrorStrategy), 5);
        let error = client
            .request("https://example.invalid/x", RequestOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(error, ClientError::NotFound(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn network_failures_retry_exactly_max_retries_times() {
        init_logging();
        let transport = ScriptedTransport::new();
        for _ in 0..3 {
            transport.push_network_failure("connection reset");
        }
        let client = scripted_client(transport.clone(), Box::new(ErrorStrategy), 2);
        let error = client
            .request("https://example.invalid/x", RequestOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(error, ClientError::Network(_)));
        // one initial call plus exactly max_retries more
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn transient_api_errors_recover() {
        let transport = ScriptedTransport::new();
        transport.push_status(StatusCode::BAD_GATEWAY, "upstream hiccup");
        transport.push_status(StatusCode::OK, r#"{"ok":true}"#);
        let client = scripted_client(transport.clone(), Box::new(ErrorStrategy), 2);
        let value = client
            .request("https://example.invalid/x", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn rate_limit_with_error_strategy_surfaces_immediately() {
        let transport = ScriptedTransport::new();
        transport.push_status(StatusCode::TOO_MANY_REQUESTS, "");
        let client = scripted_client(transport.clone(), Box::new(ErrorStrategy), 3);
        let error = client
            .request("https://example.invalid/x", RequestOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(error, ClientError::RateLimit { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_with_wait_strategy_retries_once() {
        use std::iter::FromIterator;

        use chrono::Utc;
        use reqwest::header::{HeaderName, HeaderValue};

        use crate::request::Captured;

        let transport = ScriptedTransport::new();
        // reset time already passed, so the wait clamps to the minimum
        let reset = (Utc::now().timestamp() - 5).to_string();
        transport.push_response(Captured {
            code: StatusCode::TOO_MANY_REQUESTS,
            headers: reqwest::header::HeaderMap::from_iter([
                (
                    HeaderName::from_static("x-rate-limit-remaining"),
                    HeaderValue::from_static("0"),
                ),
                (
                    HeaderName::from_static("x-rate-limit-reset"),
                    HeaderValue::from_str(&reset).unwrap(),
                ),
            ]),
            body: String::new(),
        });
        transport.push_status(StatusCode::OK, r#"{"ok":true}"#);
        let client = scripted_client(transport.clone(), Box::new(WaitStrategy::default()), 0);
        let value = client
            .request("https://example.invalid/x", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn graphql_mutations_post_a_json_body() {
        let transport = ScriptedTransport::new();
        transport.push_status(StatusCode::OK, r#"{"data":{"favorite_tweet":"Done"}}"#);
        let client = scripted_client(transport.clone(), Box::new(ErrorStrategy), 0);
        let response = client
            .graphql(
                Operation::FavoriteTweet,
                json!({"tweet_id": "1"}),
                Some(false),
            )
            .await
            .unwrap();
        assert_eq!(response.data["favorite_tweet"], "Done");
        assert!(response.cursor.is_none());
    }

    #[tokio::test]
    async fn graphql_surfaces_upstream_error_messages() {
        let transport = ScriptedTransport::new();
        transport.push_status(
            StatusCode::OK,
            r#"{"errors":[{"message":"Timeout scanning shards"}]}"#,
        );
        let client = scripted_client(transport.clone(), Box::new(ErrorStrategy), 0);
        let error = client
            .graphql(Operation::UserTweets, json!({}), Some(false))
            .await
            .err()
            .unwrap();
        match error {
            ClientError::Protocol(message) => assert!(message.contains("Timeout")),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }
}
