use std::convert::TryFrom;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time;
use tracing::debug;

use super::classifier::{DefaultClassifier, RetryClassifier};
use super::config::RetryConfig;
use super::error::ConfigError;

/// Upper bound of the random widening applied to a delay, as a fraction of it.
const JITTER_FACTOR: f64 = 0.3;

/// Retries a failing call with exponential backoff.
///
/// The policy holds no state between calls and may be shared by concurrent callers.
///
/// Wrapping a circuit breaker's `fire` in a retry policy is a deliberate choice: with the
/// default classifier a circuit open rejection is retried, which keeps knocking on a breaker
/// that is shedding load until the attempts run out.
#[derive(Debug, Clone)]
pub struct RetryPolicy<C = DefaultClassifier> {
    config: RetryConfig,
    classifier: C,
}

impl RetryPolicy {
    /// Creates a new policy using `DefaultClassifier`.
    pub fn new(config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(RetryPolicy {
            config,
            classifier: DefaultClassifier,
        })
    }
}

impl<C> RetryPolicy<C> {
    /// Replaces the classifier deciding which errors are retried.
    pub fn with_classifier<T>(self, classifier: T) -> RetryPolicy<T> {
        RetryPolicy {
            config: self.config,
            classifier,
        }
    }

    /// Returns the policy's configuration.
    #[inline]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns the delay before retry number `attempt + 1`.
    ///
    /// The delay is `min(initial_delay * multiplier^attempt, max_delay)`, widened by up to 30%
    /// when jitter is enabled.
    pub fn delay_for<R>(&self, attempt: u32, rng: &mut R) -> Duration
    where
        R: Rng + ?Sized,
    {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);
        // A zero initial delay times an infinite growth factor.
        let delay = if delay.is_nan() {
            0.0
        } else {
            delay.min(self.config.max_delay.as_secs_f64())
        };

        let delay = if self.config.jitter {
            delay * (1.0 + rng.gen_range(0.0..JITTER_FACTOR))
        } else {
            delay
        };

        Duration::try_from_secs_f64(delay).unwrap_or(Duration::MAX)
    }

    /// Executes a given future, creating a new one for every attempt.
    ///
    /// At most `max_retries + 1` attempts are made. Errors the classifier deems permanent are
    /// returned at once. Once the attempts are exhausted the last error is returned unchanged.
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: RetryClassifier<E>,
    {
        let mut attempt = 0;
        loop {
            let err = match f().await {
                Ok(ok) => return Ok(ok),
                Err(err) => err,
            };

            if !self.classifier.is_retryable(&err) {
                debug!(attempt = attempt + 1, "error is not retryable");
                return Err(err);
            }
            if attempt >= self.config.max_retries {
                debug!(attempt = attempt + 1, "retries exhausted");
                return Err(err);
            }

            let delay = self.delay_for(attempt, &mut rand::thread_rng());
            debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "scheduling retry"
            );
            time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;
    use tokio::time::Instant;

    use super::super::classifier::{Always, Never};
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn call_success() {
        let retry = new_retry();
        let res = retry.execute(|| async { Ok::<_, ()>(0) }).await;
        assert_eq!(Ok(0), res);
    }

    #[tokio::test(start_paused = true)]
    async fn call_retry() {
        let retry = new_retry();
        let counter = AtomicU32::new(0);

        let res = retry
            .execute(|| async {
                if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                    return Ok(2);
                }
                Err(())
            })
            .await;
        assert_eq!(Ok(2), res);
        assert_eq!(3, counter.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn call_retry_exceeds_max() {
        let retry = new_retry();
        let counter = AtomicU32::new(0);
        let started = Instant::now();

        let res = retry
            .execute(|| async {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(n)
            })
            .await;

        // The last error comes back as is.
        assert_eq!(Err(3), res);
        assert_eq!(4, counter.load(Ordering::SeqCst));
        // 100ms + 200ms + 400ms
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(700), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(710), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let retry = new_retry().with_classifier(Never);
        let counter = AtomicU32::new(0);

        let res = retry
            .execute(|| async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("permanent")
            })
            .await;
        assert_eq!(Err("permanent"), res);
        assert_eq!(1, counter.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn classifier_sees_every_error() {
        let retry = new_retry().with_classifier(|err: &u32| *err < 1);
        let counter = AtomicU32::new(0);

        let res = retry
            .execute(|| async { Err::<(), _>(counter.fetch_add(1, Ordering::SeqCst)) })
            .await;
        assert_eq!(Err(1), res);
        assert_eq!(2, counter.load(Ordering::SeqCst));
    }

    #[test]
    fn delays_grow_until_capped() {
        let retry = RetryPolicy::new(RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: false,
            ..Default::default()
        })
        .unwrap();
        let mut rng = XorShiftRng::seed_from_u64(7);

        let delays: Vec<_> = (0..6)
            .map(|attempt| retry.delay_for(attempt, &mut rng).as_millis())
            .collect();
        assert_eq!(vec![100, 200, 400, 500, 500, 500], delays);
        assert_eq!(
            Duration::from_millis(500),
            retry.delay_for(u32::MAX, &mut rng)
        );
    }

    #[test]
    fn jitter_widens_by_at_most_thirty_percent() {
        let retry = RetryPolicy::new(RetryConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            jitter: true,
            ..Default::default()
        })
        .unwrap()
        .with_classifier(Always);
        let mut rng = XorShiftRng::seed_from_u64(42);

        for _ in 0..100 {
            let delay = retry.delay_for(0, &mut rng);
            assert!(delay >= Duration::from_millis(1000), "{:?}", delay);
            assert!(delay < Duration::from_millis(1300), "{:?}", delay);
        }
    }

    #[test]
    fn zero_initial_delay_stays_zero() {
        let retry = RetryPolicy::new(RetryConfig {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
            ..Default::default()
        })
        .unwrap();
        let mut rng = XorShiftRng::seed_from_u64(1);

        assert_eq!(Duration::ZERO, retry.delay_for(1, &mut rng));
        assert_eq!(Duration::ZERO, retry.delay_for(u32::MAX, &mut rng));
    }

    #[test]
    fn huge_delays_saturate() {
        let retry = RetryPolicy::new(RetryConfig {
            initial_delay: Duration::from_secs(u64::MAX / 2),
            max_delay: Duration::from_secs(u64::MAX),
            multiplier: 2.0,
            jitter: true,
            ..Default::default()
        })
        .unwrap();
        let mut rng = XorShiftRng::seed_from_u64(1);

        assert_eq!(Duration::MAX, retry.delay_for(3, &mut rng));
        assert_eq!(Duration::MAX, retry.delay_for(u32::MAX, &mut rng));
    }

    fn new_retry() -> RetryPolicy<Always> {
        RetryPolicy::new(RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        })
        .unwrap()
        .with_classifier(Always)
    }
}
