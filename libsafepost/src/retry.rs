//! Retry and backoff for remote calls
//!
//! Rate-limit signals are retried indefinitely with exponential backoff.
//! Anything else gets a small number of extra attempts with linear backoff
//! before the error is surfaced.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::error::{PlatformError, Result, SafepostError};

/// Backoff policy applied uniformly to every remote call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// First rate-limit delay, doubled on each consecutive rate-limit failure
    pub rate_limit_base: Duration,
    /// Upper bound for a single rate-limit delay
    pub rate_limit_cap: Duration,
    /// Extra attempts allowed for non rate-limit errors
    pub transient_retries: u32,
    /// Linear step for non rate-limit errors (`step * attempt`)
    pub transient_step: Duration,
    /// No sleep may end after this instant
    pub deadline: Option<Instant>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_base: Duration::from_secs(5),
            rate_limit_cap: Duration::from_secs(60),
            transient_retries: 2,
            transient_step: Duration::from_secs(2),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Delay after the `n`th consecutive rate-limit failure (1-based)
    pub fn rate_limit_delay(&self, n: u32) -> Duration {
        let exponent = n.saturating_sub(1).min(31);
        self.rate_limit_base
            .saturating_mul(1u32 << exponent)
            .min(self.rate_limit_cap)
    }

    /// Delay after the `n`th non rate-limit failure (1-based)
    pub fn transient_delay(&self, n: u32) -> Duration {
        self.transient_step.saturating_mul(n)
    }

    /// Run `call` until it succeeds or the policy gives up
    ///
    /// `operation` names the call in log lines and deadline errors.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, PlatformError>>,
    {
        let mut rate_limited: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            let error = match call().await {
                Ok(value) => {
                    if rate_limited + failures > 0 {
                        info!(
                            "{} succeeded after {} retries",
                            operation,
                            rate_limited + failures
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let delay = if error.is_rate_limit() {
                rate_limited += 1;
                let delay = self.rate_limit_delay(rate_limited);
                warn!(
                    "{} rate limited ({} in a row): {}. Retrying in {:?}",
                    operation, rate_limited, error, delay
                );
                delay
            } else {
                rate_limited = 0;
                failures += 1;
                if failures > self.transient_retries {
                    warn!(
                        "{} failed after {} attempts: {}",
                        operation, failures, error
                    );
                    return Err(error.into());
                }
                let delay = self.transient_delay(failures);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    operation,
                    failures,
                    self.transient_retries + 1,
                    error,
                    delay
                );
                delay
            };

            if let Some(deadline) = self.deadline {
                if Instant::now() + delay > deadline {
                    warn!("{} would retry past its deadline, giving up", operation);
                    return Err(SafepostError::DeadlineExceeded(format!(
                        "{}: {}",
                        operation, error
                    )));
                }
            }

            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    /// Scripted call that records when each attempt happened
    struct Script {
        errors: Mutex<Vec<PlatformError>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl Script {
        fn new(mut errors: Vec<PlatformError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn call(&self) -> impl Future<Output = std::result::Result<u32, PlatformError>> {
            self.attempts.lock().unwrap().push(Instant::now());
            let next = self.errors.lock().unwrap().pop();
            async move {
                match next {
                    Some(e) => Err(e),
                    None => Ok(42),
                }
            }
        }

        fn gaps(&self) -> Vec<Duration> {
            let attempts = self.attempts.lock().unwrap();
            attempts.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    fn rate_limit() -> PlatformError {
        PlatformError::RateLimit("429 Too Many Requests".to_string())
    }

    fn network() -> PlatformError {
        PlatformError::Network("connection reset".to_string())
    }

    #[test]
    fn test_rate_limit_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_delay(1), secs(5));
        assert_eq!(policy.rate_limit_delay(2), secs(10));
        assert_eq!(policy.rate_limit_delay(3), secs(20));
        assert_eq!(policy.rate_limit_delay(4), secs(40));
        assert_eq!(policy.rate_limit_delay(5), secs(60));
        assert_eq!(policy.rate_limit_delay(500), secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt_does_not_sleep() {
        let script = Script::new(vec![]);
        let start = Instant::now();
        let value = RetryPolicy::default()
            .run("post_status", || script.call())
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(Instant::now() - start, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_three_times_then_success() {
        let script = Script::new(vec![rate_limit(), rate_limit(), rate_limit()]);
        let value = RetryPolicy::default()
            .run("post_status", || script.call())
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(script.gaps(), vec![secs(5), secs(10), secs(20)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_not_count_limited() {
        let script = Script::new(vec![rate_limit(); 8]);
        let result = RetryPolicy::default()
            .run("favourite", || script.call())
            .await;

        assert!(result.is_ok());
        assert_eq!(script.attempts.lock().unwrap().len(), 9);
        assert_eq!(script.gaps().last(), Some(&secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_twice_linearly() {
        let script = Script::new(vec![network(), network()]);
        let result = RetryPolicy::default()
            .run("home_timeline", || script.call())
            .await;

        assert!(result.is_ok());
        assert_eq!(script.gaps(), vec![secs(2), secs(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_exhausts_retries() {
        let script = Script::new(vec![network(), network(), network(), network()]);
        let result = RetryPolicy::default()
            .run("reply", || script.call())
            .await;

        match result {
            Err(SafepostError::Platform(PlatformError::Network(_))) => {}
            other => panic!("Expected network error, got {:?}", other),
        }
        assert_eq!(script.attempts.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_error_also_gets_bounded_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .run("who_am_i", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PlatformError::Authentication("401".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_streak_resets_after_other_error() {
        let script = Script::new(vec![rate_limit(), rate_limit(), network(), rate_limit()]);
        let result = RetryPolicy::default()
            .run("upload_media", || script.call())
            .await;

        assert!(result.is_ok());
        assert_eq!(script.gaps(), vec![secs(5), secs(10), secs(2), secs(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_unbounded_rate_limit_retries() {
        let script = Script::new(vec![rate_limit(); 100]);
        let policy = RetryPolicy::default().with_deadline(Instant::now() + secs(30));
        let result = policy.run("post_status", || script.call()).await;

        match result {
            Err(SafepostError::DeadlineExceeded(msg)) => assert!(msg.contains("post_status")),
            other => panic!("Expected deadline error, got {:?}", other),
        }
        // Slept 5s and 10s; the 20s sleep would end past the deadline
        assert_eq!(script.gaps(), vec![secs(5), secs(10)]);
    }
}
