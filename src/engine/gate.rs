//! Rate-limiting gate awaited before every page fetch.

use async_trait::async_trait;
use governor::clock::{Clock, MonotonicClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;

/// Default request rate when none is configured.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 20;

/// Blocks until it is safe to issue another request.
#[async_trait]
pub trait RateGate: Send + Sync {
    async fn ready(&self);
}

/// Gate that never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ungated;

#[async_trait]
impl RateGate for Ungated {
    async fn ready(&self) {}
}

/// Connection-wide token bucket shared by every listing on a connection.
pub struct RequestLimiter {
    limiter: RateLimiter<
        NotKeyed,
        InMemoryState,
        MonotonicClock,
        NoOpMiddleware<<MonotonicClock as Clock>::Instant>,
    >,
    per_second: NonZeroU32,
}

impl RequestLimiter {
    pub fn per_second(requests: NonZeroU32) -> Self {
        tracing::debug!(requests_per_second = requests.get(), "Rate limiter initialized");
        Self {
            limiter: RateLimiter::new(
                Quota::per_second(requests),
                InMemoryState::default(),
                MonotonicClock,
            ),
            per_second: requests,
        }
    }

    /// Build from a configured rate, falling back to the default for zero.
    pub fn from_config(requests: Option<u32>) -> Self {
        let requests = requests
            .and_then(NonZeroU32::new)
            .unwrap_or(NonZeroU32::MIN.saturating_add(DEFAULT_REQUESTS_PER_SECOND - 1));
        Self::per_second(requests)
    }

    pub fn rate(&self) -> NonZeroU32 {
        self.per_second
    }
}

#[async_trait]
impl RateGate for RequestLimiter {
    async fn ready(&self) {
        self.limiter.until_ready().await;
    }
}
