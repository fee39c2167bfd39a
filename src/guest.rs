use std::collections::HashMap;
use std::iter::FromIterator;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use parking_lot::RwLock;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::Deserialize;

use crate::endpoints::{rest_url, GUEST_ACTIVATE_PATH, HOME_URL};
use crate::error::{ClientError, Result};
use crate::rate_limit::{RateLimitSource, RateLimitWindow};
use crate::request::{capture, default_headers};

/// Issued tokens stop working after roughly this long regardless of use
const GUEST_TOKEN_TTL_HOURS: i64 = 3;

/// An anonymous capability token plus the advisory capacity windows
/// observed for it, keyed by endpoint name
#[derive(Debug, Clone)]
pub struct GuestToken {
    pub value: String,
    pub created_at: DateTime<Utc>,
    capacity: HashMap<String, RateLimitWindow>,
}

impl GuestToken {
    pub fn new(value: String) -> Self {
        Self {
            value,
            created_at: Utc::now(),
            capacity: HashMap::new(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() - self.created_at > Duration::hours(GUEST_TOKEN_TTL_HOURS)
    }

    /// Unknown endpoints are assumed to have capacity; the bookkeeping is
    /// advisory and fails open
    pub fn has_capacity(&self, endpoint: &str) -> bool {
        self.capacity
            .get(endpoint)
            .map_or(true, |window| window.has_capacity(Utc::now()))
    }

    pub fn window(&self, endpoint: &str) -> Option<RateLimitWindow> {
        self.capacity.get(endpoint).copied()
    }

    fn record(&mut self, endpoint: &str, window: RateLimitWindow) {
        self.capacity.insert(endpoint.to_owned(), window);
    }
}

/// Seam between the manager and the upstream issuance call so the
/// single-flight machinery can be exercised without a network
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn issue(&self) -> Result<GuestToken>;
}

#[derive(Deserialize)]
struct GuestTokenFetchResponse {
    guest_token: String,
}

/// Production issuance: the activation endpoint first, falling back to
/// scraping the token out of the homepage HTML when activation is denied
pub struct ActivateEndpoint {
    client: Arc<Client>,
    bearer: String,
}

impl ActivateEndpoint {
    pub fn new(client: Arc<Client>, bearer: String) -> Self {
        Self { client, bearer }
    }

    async fn activate_call(&self) -> Result<GuestToken> {
        let mut headers = default_headers();
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {}", self.bearer))
                .map_err(|_| ClientError::Auth("bearer token is not a valid header".to_owned()))?,
        );
        let response = self
            .client
            .post(&rest_url(GUEST_ACTIVATE_PATH))
            .headers(headers)
            .send()
            .await?;
        let captured = capture(response).await?;
        if !captured.code.is_success() {
            return Err(ClientError::Auth(format!(
                "guest activation refused with {}: {}",
                captured.code, captured.body
            )));
        }
        let parsed = serde_json::from_str::<GuestTokenFetchResponse>(&captured.body)
            .map_err(|_| ClientError::protocol("activation response had no guest_token field"))?;
        Ok(GuestToken::new(parsed.guest_token))
    }

    async fn scrape_homepage(&self) -> Result<GuestToken> {
        lazy_static! {
            static ref GUEST_TOKEN_PATTERN: Regex = Regex::new(r#"gt=(.*?);"#).unwrap();
        }
        let html = self
            .client
            .get(HOME_URL)
            .headers(default_headers())
            .send()
            .await?
            .text()
            .await?;
        let captures = GUEST_TOKEN_PATTERN
            .captures(&html)
            .and_then(|captures| captures.get(1))
            .ok_or_else(|| ClientError::protocol("no guest token cookie in the homepage"))?;
        Ok(GuestToken::new(captures.as_str().to_owned()))
    }
}

#[async_trait]
impl TokenSource for ActivateEndpoint {
    async fn issue(&self) -> Result<GuestToken> {
        match self.activate_call().await {
            Ok(token) => Ok(token),
            Err(activation_error) => {
                info!("guest activation failed, attempting to scrape the homepage instead");
                match self.scrape_homepage().await {
                    Ok(token) => Ok(token),
                    Err(scrape_error) => {
                        debug!("homepage scrape also failed: {}", scrape_error);
                        Err(activation_error)
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct TokenPool {
    tokens: Vec<GuestToken>,
    cursor: usize,
}

/// Owns anonymous capability tokens: a single cached "current" token for
/// simple calls plus an independent round-robin pool for callers juggling
/// several identities
pub struct GuestTokenManager {
    source: Box<dyn TokenSource>,
    bearer: String,
    current: RwLock<Option<GuestToken>>,
    /// Serializes activation so concurrent callers share one upstream call
    activation: tokio::sync::Mutex<()>,
    pool: RwLock<TokenPool>,
}

impl GuestTokenManager {
    pub fn new(client: Arc<Client>, bearer: String) -> Self {
        let source = ActivateEndpoint::new(client, bearer.clone());
        Self::with_source(Box::new(source), bearer)
    }

    pub fn with_source(source: Box<dyn TokenSource>, bearer: String) -> Self {
        Self {
            source,
            bearer,
            current: RwLock::new(None),
            activation: tokio::sync::Mutex::new(()),
            pool: RwLock::new(TokenPool::default()),
        }
    }

    /// Force a fresh activation, replacing the cached token
    pub async fn activate(&self) -> Result<String> {
        let token = self.source.issue().await?;
        let value = token.value.clone();
        *self.current.write() = Some(token);
        Ok(value)
    }

    /// The single-token convenience path. Returns the cached token unless
    /// it is absent or expired; concurrent callers during activation all
    /// resolve to the same token off one upstream call
    pub async fn token(&self) -> Result<String> {
        if let Some(value) = self.cached() {
            return Ok(value);
        }
        let _in_flight = self.activation.lock().await;
        // a concurrent caller may have settled the activation while this
        // one was parked on the lock
        if let Some(value) = self.cached() {
            return Ok(value);
        }
        self.activate().await
    }

    pub fn cached(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .filter(|token| !token.is_expired())
            .map(|token| token.value.clone())
    }

    /// Guest-style headers: bearer plus the cached token when present
    pub async fn headers(&self) -> Result<HeaderMap> {
        let token = self.token().await?;
        let mut headers = HeaderMap::from_iter([(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {}", self.bearer))
                .map_err(|_| ClientError::Auth("bearer token is not a valid header".to_owned()))?,
        )]);
        headers.insert(
            HeaderName::from_static("x-guest-token"),
            HeaderValue::from_str(&token)
                .map_err(|_| ClientError::Auth("guest token is not a valid header".to_owned()))?,
        );
        Ok(headers)
    }

    pub fn add_token(&self, value: String) {
        self.pool.write().tokens.push(GuestToken::new(value));
    }

    pub fn pool_size(&self) -> usize {
        self.pool.read().tokens.len()
    }

    /// Round-robin over the pool, skipping expired tokens and, when an
    /// endpoint is named, tokens whose recorded window for it is
    /// exhausted. Returns None instead of blocking when nothing qualifies
    pub fn next_token(&self, endpoint: Option<&str>) -> Option<String> {
        let mut pool = self.pool.write();
        let len = pool.tokens.len();
        for offset in 0..len {
            let index = (pool.cursor + offset) % len;
            {
                let token = &pool.tokens[index];
                if token.is_expired() {
                    continue;
                }
                if let Some(endpoint) = endpoint {
                    if !token.has_capacity(endpoint) {
                        continue;
                    }
                }
            }
            let value = pool.tokens[index].value.clone();
            pool.cursor = (index + 1) % len;
            return Some(value);
        }
        None
    }

    /// Purge stale pool entries, returning how many were dropped
    pub fn remove_expired(&self) -> usize {
        let mut pool = self.pool.write();
        let before = pool.tokens.len();
        pool.tokens.retain(|token| !token.is_expired());
        pool.cursor = 0;
        before - pool.tokens.len()
    }

    /// Activate tokens until the pool holds `size` of them
    pub async fn fill_pool(&self, size: usize) -> Result<usize> {
        let mut added = 0;
        while self.pool_size() < size {
            let token = self.source.issue().await?;
            self.pool.write().tokens.push(token);
            added += 1;
        }
        if added > 0 {
            info!("guest token pool filled with {} new tokens", added);
        }
        Ok(added)
    }

    /// Record a capacity window from a header-shaped source for whichever
    /// tokens carry this value
    pub fn record_rate_limit<S: RateLimitSource + ?Sized>(
        &self,
        token_value: &str,
        endpoint: &str,
        source: &S,
    ) {
        match RateLimitWindow::from_source(source) {
            Some(window) => self.record_window(token_value, endpoint, window),
            None => debug!("response for {} carried no usable rate limit headers", endpoint),
        }
    }

    /// Record a capacity window from a raw numeric pair. Both fields land
    /// under one lock write so readers never observe a half-updated window
    pub fn record_window(&self, token_value: &str, endpoint: &str, window: RateLimitWindow) {
        {
            let mut current = self.current.write();
            if let Some(token) = current.as_mut().filter(|token| token.value == token_value) {
                token.record(endpoint, window);
            }
        }
        let mut pool = self.pool.write();
        for token in pool.tokens.iter_mut().filter(|t| t.value == token_value) {
            token.record(endpoint, window);
        }
        if window.remaining <= 0 {
            warn!(
                "guest token exhausted for {} until {}",
                endpoint, window.reset_at
            );
        }
    }

    pub fn window(&self, token_value: &str, endpoint: &str) -> Option<RateLimitWindow> {
        if let Some(token) = self
            .current
            .read()
            .as_ref()
            .filter(|token| token.value == token_value)
        {
            if let Some(window) = token.window(endpoint) {
                return Some(window);
            }
        }
        self.pool
            .read()
            .tokens
            .iter()
            .find(|token| token.value == token_value)
            .and_then(|token| token.window(endpoint))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use futures::future::join_all;

    use super::*;

    struct CountingSource {
        issued: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn issue(&self) -> Result<GuestToken> {
            self.issued.fetch_add(1, Ordering::SeqCst);
            // long enough for every concurrent caller to pile up on the
            // activation lock
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            Ok(GuestToken::new(format!(
                "token-{}",
                self.issued.load(Ordering::SeqCst)
            )))
        }
    }

    fn manager_with_counter() -> (Arc<GuestTokenManager>, Arc<CountingSource>) {
        // the Arc dance is only to keep a handle on the counter
        let counter = Arc::new(CountingSource {
            issued: AtomicUsize::new(0),
        });
        struct Shared(Arc<CountingSource>);
        #[async_trait]
        impl TokenSource for Shared {
            async fn issue(&self) -> Result<GuestToken> {
                self.0.issue().await
            }
        }
        let manager = Arc::new(GuestTokenManager::with_source(
            Box::new(Shared(Arc::clone(&counter))),
            "bearer".to_owned(),
        ));
        (manager, counter)
    }

    #[tokio::test]
    async fn concurrent_token_calls_share_one_activation() {
        let (manager, counter) = manager_with_counter();
        let calls = (0..5).map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.token().await.unwrap() })
        });
        let tokens: Vec<String> = join_all(calls)
            .await
            .into_iter()
            .map(|handle| handle.unwrap())
            .collect();
        assert_eq!(counter.issued.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|token| token == &tokens[0]));
    }

    #[tokio::test]
    async fn cached_token_short_circuits_activation() {
        let (manager, counter) = manager_with_counter();
        manager.token().await.unwrap();
        manager.token().await.unwrap();
        assert_eq!(counter.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn activate_always_refreshes() {
        let (manager, counter) = manager_with_counter();
        let first = manager.activate().await.unwrap();
        let second = manager.activate().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(counter.issued.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn round_robin_skips_exhausted_tokens() {
        let (manager, _) = manager_with_counter();
        manager.add_token("a".to_owned());
        manager.add_token("b".to_owned());
        manager.add_token("c".to_owned());
        // b is out of capacity for this endpoint until far in the future
        manager.record_window(
            "b",
            "UserTweets",
            RateLimitWindow::new(0, Utc::now().timestamp() + 900),
        );
        assert_eq!(manager.next_token(Some("UserTweets")), Some("a".to_owned()));
        assert_eq!(manager.next_token(Some("UserTweets")), Some("c".to_owned()));
        assert_eq!(manager.next_token(Some("UserTweets")), Some("a".to_owned()));
        // without an endpoint the exhausted token still rotates in
        assert_eq!(manager.next_token(None), Some("b".to_owned()));
    }

    #[test]
    fn empty_capacity_returns_none_instead_of_blocking() {
        let (manager, _) = manager_with_counter();
        manager.add_token("a".to_owned());
        manager.record_window(
            "a",
            "UserTweets",
            RateLimitWindow::new(0, Utc::now().timestamp() + 900),
        );
        assert_eq!(manager.next_token(Some("UserTweets")), None);
    }

    #[test]
    fn expired_tokens_are_purged_and_counted() {
        let (manager, _) = manager_with_counter();
        manager.add_token("fresh".to_owned());
        {
            let mut pool = manager.pool.write();
            let mut stale = GuestToken::new("stale".to_owned());
            stale.created_at = Utc::now() - Duration::hours(GUEST_TOKEN_TTL_HOURS + 1);
            pool.tokens.push(stale);
        }
        assert_eq!(manager.next_token(None), Some("fresh".to_owned()));
        assert_eq!(manager.remove_expired(), 1);
        assert_eq!(manager.pool_size(), 1);
    }

    #[tokio::test]
    async fn fill_pool_tops_up_to_size() {
        let (manager, counter) = manager_with_counter();
        manager.add_token("existing".to_owned());
        let added = manager.fill_pool(3).await.unwrap();
        assert_eq!(added, 2);
        assert_eq!(manager.pool_size(), 3);
        assert_eq!(counter.issued.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn raw_pair_and_header_source_record_identically() {
        let (manager, _) = manager_with_counter();
        manager.add_token("a".to_owned());
        manager.add_token("b".to_owned());
        let reset = Utc::now().timestamp() + 60;
        manager.record_window("a", "Followers", RateLimitWindow::new(3, reset));
        let mut headers = std::collections::HashMap::new();
        headers.insert("x-rate-limit-remaining".to_owned(), "3".to_owned());
        headers.insert("x-rate-limit-reset".to_owned(), reset.to_string());
        manager.record_rate_limit("b", "Followers", &headers);
        assert_eq!(
            manager.window("a", "Followers"),
            manager.window("b", "Followers")
        );
    }
}
