//! Rate limiting for upstream API requests

use governor::{DefaultDirectRateLimiter, Quota};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Token bucket limiter for one upstream endpoint.
///
/// Pollers and explorer clients must go through this before every
/// request; push streams only use it for resubscribe storms.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DefaultDirectRateLimiter>,
    rps: u32,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` sustained requests.
    pub fn per_second(requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        Self {
            limiter: Arc::new(DefaultDirectRateLimiter::direct(Quota::per_second(rate))),
            rps: requests_per_second.max(1),
        }
    }

    /// Non-blocking permission check.
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Wait until a request is allowed.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    pub fn requests_per_second(&self) -> u32 {
        self.rps
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_second(config::service::ingest::POLLER_RATE_LIMIT_RPS)
    }
}
