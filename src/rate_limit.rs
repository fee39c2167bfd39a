use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dyn_clone::DynClone;
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Jitter, Quota, RateLimiter,
};
use log::{debug, warn};
use nonzero_ext::nonzero;
use rand::Rng;
use reqwest::header::HeaderMap;

use crate::error::{ClientError, Result};

/// Politeness limiter sitting in front of every wire call, scoped to the
/// whole client rather than individual endpoints
pub type UnscopedLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

pub fn politeness_limiter() -> UnscopedLimiter {
    RateLimiter::direct(Quota::per_minute(nonzero!(50u32)).allow_burst(nonzero!(5u32)))
}

pub fn default_jitter() -> Jitter {
    Jitter::up_to(Duration::from_millis(500))
}

/// Advisory capacity window for a single (token, endpoint) pair, fed by
/// response headers. It informs token selection and wait times but never
/// gates request issuance on its own
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitWindow {
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitWindow {
    pub fn new(remaining: i64, reset_epoch: i64) -> Self {
        Self {
            remaining,
            reset_at: Utc.timestamp(reset_epoch, 0),
        }
    }

    /// A window has capacity once requests remain or the reset time has
    /// already passed
    pub fn has_capacity(&self, now: DateTime<Utc>) -> bool {
        self.remaining > 0 || now >= self.reset_at
    }

    /// Read `x-rate-limit-remaining` / `x-rate-limit-reset` out of any
    /// header-shaped source. Junk values are skipped, never an error
    pub fn from_source<S: RateLimitSource + ?Sized>(source: &S) -> Option<Self> {
        let remaining = source
            .field("x-rate-limit-remaining")
            .and_then(|raw| raw.trim().parse::<i64>().ok())?;
        let reset = source
            .field("x-rate-limit-reset")
            .and_then(|raw| raw.trim().parse::<i64>().ok())?;
        Some(Self::new(remaining, reset))
    }
}

/// The upstream advertises limits both through real response headers and,
/// in a few code paths, bags of already-stringified pairs. Both forms
/// normalize through this trait
pub trait RateLimitSource {
    fn field(&self, name: &str) -> Option<String>;
}

impl RateLimitSource for HeaderMap {
    fn field(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_owned())
    }
}

impl RateLimitSource for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Exponential backoff for transient failures, 500ms base doubling up to
/// a minute with up to a quarter second of jitter
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = 500u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let base = Duration::from_millis(exp.min(60_000));
    let jitter = rand::thread_rng().gen_range(0..250);
    base + Duration::from_millis(jitter)
}

/// Don't bother sleeping for less than this; a reset time in the
/// immediate past would otherwise busy-loop
const MIN_WAIT: Duration = Duration::from_secs(1);
/// One full upstream window. Anything longer gets surfaced instead
const MAX_WAIT: Duration = Duration::from_secs(15 * 60);

/// What the request engine does when the upstream answers 429. Injected at
/// construction so callers pick the policy without the engine branching on
/// config flags
#[async_trait]
pub trait RateLimitStrategy: Send + Sync + DynClone {
    /// Either absorb the rate limit (the engine retries once after this
    /// returns) or surface it as an error
    async fn on_rate_limit(&self, window: Option<RateLimitWindow>, retried: bool) -> Result<()>;
}

dyn_clone::clone_trait_object!(RateLimitStrategy);

/// Sleeps until the advertised reset time and lets the engine retry once
#[derive(Debug, Clone, Default)]
pub struct WaitStrategy;

#[async_trait]
impl RateLimitStrategy for WaitStrategy {
    async fn on_rate_limit(&self, window: Option<RateLimitWindow>, retried: bool) -> Result<()> {
        let reset_at = window.map(|w| w.reset_at);
        if retried {
            // waiting didn't clear the limit, don't loop on it
            return Err(ClientError::RateLimit { reset_at });
        }
        let window = match window {
            Some(window) => window,
            None => return Err(ClientError::RateLimit { reset_at: None }),
        };
        let until_reset = (window.reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(0));
        if until_reset > MAX_WAIT {
            warn!(
                "rate limit reset is {}s away, surfacing instead of sleeping",
                until_reset.as_secs()
            );
            return Err(ClientError::RateLimit { reset_at });
        }
        let wait = until_reset.max(MIN_WAIT);
        debug!("rate limited, sleeping {}s until reset", wait.as_secs());
        tokio::time::sleep(wait).await;
        Ok(())
    }
}

/// Surfaces the rate limit immediately with the reset hint attached
#[derive(Debug, Clone, Default)]
pub struct ErrorStrategy;

#[async_trait]
impl RateLimitStrategy for ErrorStrategy {
    async fn on_rate_limit(&self, window: Option<RateLimitWindow>, _retried: bool) -> Result<()> {
        Err(ClientError::RateLimit {
            reset_at: window.map(|w| w.reset_at),
        })
    }
}
