use std::time::Duration;

/// Capped exponential backoff between resubscribe attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_retries: Option<u32>,
    attempt: u32,
}

impl Backoff {
    pub const BASE: Duration = Duration::from_secs(1);
    pub const CAP: Duration = Duration::from_secs(30);

    pub fn new(max_retries: Option<u32>) -> Self {
        Self::with_bounds(Self::BASE, Self::CAP, max_retries)
    }

    pub fn with_bounds(base: Duration, cap: Duration, max_retries: Option<u32>) -> Self {
        Self {
            base,
            cap,
            max_retries,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_retries
            && self.attempt >= max
        {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempt);
        self.attempt += 1;
        Some(self.base.saturating_mul(factor).min(self.cap))
    }

    /// Consecutive failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Called once a subscription is established.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
