use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota};
use nonzero_ext::nonzero;

/// Process-wide request throttle shared by every clone.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    pub fn direct(quota: Quota) -> Self {
        Self {
            inner: Arc::new(DefaultDirectRateLimiter::direct(quota)),
        }
    }

    /// Allows `requests` per second; zero is treated as one.
    pub fn per_second(requests: u32) -> Self {
        let rate = NonZeroU32::new(requests).unwrap_or(nonzero!(1u32));
        Self::direct(Quota::per_second(rate))
    }

    pub async fn until_ready(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}
