//! Delivery retry policy and HTTP outcome classification.
//!
//! Failed deliveries are retried with exponential backoff: the delay before
//! retry `n` is `base * 2^(n-1)`, capped at `cap`. Once `max_attempts`
//! sends have been made the attempt is terminal.

use std::time::Duration;

/// How a callback response (or its absence) is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Any 2xx response.
    Success,
    /// Timeouts, connection errors, 5xx and 429.
    Retryable,
    /// 4xx other than 429, and anything else that is not 2xx.
    Terminal,
}

/// Classify an HTTP status code returned by a subscriber callback.
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        429 => ResponseClass::Retryable,
        500..=599 => ResponseClass::Retryable,
        _ => ResponseClass::Terminal,
    }
}

/// What to do after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay.
    RetryAfter(Duration),
    /// The attempt cap has been reached.
    GiveUp,
}

/// Exponential backoff with a cap and a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Delay to wait after the `attempt`-th send (1-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Decide whether to retry after `attempts_made` sends have failed.
    pub fn decide(&self, attempts_made: u32) -> RetryDecision {
        if attempts_made >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.delay_for(attempts_made))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(500), Duration::from_secs(5), 4)
    }

    #[test]
    fn classification() {
        assert_eq!(classify_status(200), ResponseClass::Success);
        assert_eq!(classify_status(204), ResponseClass::Success);
        assert_eq!(classify_status(500), ResponseClass::Retryable);
        assert_eq!(classify_status(503), ResponseClass::Retryable);
        assert_eq!(classify_status(429), ResponseClass::Retryable);
        assert_eq!(classify_status(400), ResponseClass::Terminal);
        assert_eq!(classify_status(404), ResponseClass::Terminal);
        assert_eq!(classify_status(410), ResponseClass::Terminal);
        assert_eq!(classify_status(301), ResponseClass::Terminal);
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2000));
        assert_eq!(p.delay_for(4), Duration::from_millis(4000));
    }

    #[test]
    fn delay_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(5), Duration::from_secs(5));
        assert_eq!(p.delay_for(40), Duration::from_secs(5));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn gives_up_at_cap() {
        let p = policy();
        assert_eq!(p.decide(1), RetryDecision::RetryAfter(Duration::from_millis(500)));
        assert_eq!(p.decide(3), RetryDecision::RetryAfter(Duration::from_millis(2000)));
        assert_eq!(p.decide(4), RetryDecision::GiveUp);
        assert_eq!(p.decide(9), RetryDecision::GiveUp);
    }
}
