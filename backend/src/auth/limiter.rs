use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

/// Per-email throttle on sign-in attempts.
pub struct LoginLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl LoginLimiter {
    /// `attempts_per_minute` of zero is treated as one.
    pub fn new(attempts_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(attempts_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
        }
    }

    /// Consume one attempt for `email`. Returns `false` when over quota.
    pub fn check(&self, email: &str) -> bool {
        self.limiter.check_key(&email.to_string()).is_ok()
    }

    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}
