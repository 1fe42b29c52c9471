//! Bounded DOM polling
//!
//! Chat sites render replies asynchronously and reshuffle their markup, so
//! every DOM read and write is wrapped in a fixed number of attempts with a
//! constant wait plus random jitter between them.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Result of a single polling attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// Stop polling with this value
    Done(T),
    /// Try again; a partial value is kept as the fallback if attempts run out
    Retry(Option<T>),
}

/// Result of a whole polling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Done(T),
    /// Every attempt asked for a retry. Holds the last partial value seen.
    Exhausted(Option<T>),
}

/// Constant backoff with jitter
///
/// `retries` counts the extra attempts after the first, so an operation runs
/// at most `retries + 1` times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    retries: u32,
    wait: Duration,
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5), Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, wait: Duration, jitter: Duration) -> Self {
        Self {
            retries,
            wait,
            jitter,
        }
    }

    /// Policy that never sleeps
    pub fn immediate(retries: u32) -> Self {
        Self::new(retries, Duration::ZERO, Duration::ZERO)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Next delay: the fixed wait plus uniform jitter in `[0, jitter]`
    pub fn delay(&self) -> Duration {
        jittered(self.wait, self.jitter)
    }

    /// Run `attempt` until it reports `Done` or the retry budget is spent.
    ///
    /// `label` prefixes the retry log lines, e.g.
    /// `latest_message() for Replika agent Sam`.
    pub async fn poll<T, F, Fut>(&self, label: &str, mut attempt: F) -> PollOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut fallback = None;

        for i in 0..=self.retries {
            if i > 0 {
                let delay = self.delay();
                debug!(
                    "{}: Retry {}. Waiting {:.2} seconds.",
                    label,
                    i,
                    delay.as_secs_f64()
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            match attempt(i).await {
                Attempt::Done(value) => return PollOutcome::Done(value),
                Attempt::Retry(Some(partial)) => fallback = Some(partial),
                Attempt::Retry(None) => {}
            }
        }

        PollOutcome::Exhausted(fallback)
    }
}

/// `base + uniform(0, jitter)`
pub(crate) fn jittered(base: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return base;
    }
    let extra = rand::rng().random_range(0.0..=jitter.as_secs_f64());
    base.saturating_add(Duration::try_from_secs_f64(extra).unwrap_or(Duration::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn runs_retries_plus_one_attempts_before_giving_up() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let outcome: PollOutcome<()> = policy
            .poll("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Retry(None) }
            })
            .await;

        assert_eq!(outcome, PollOutcome::Exhausted(None));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn stops_at_first_done() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let outcome = policy
            .poll("test", |i| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if i == 2 {
                        Attempt::Done("found")
                    } else {
                        Attempt::Retry(None)
                    }
                }
            })
            .await;

        assert_eq!(outcome, PollOutcome::Done("found"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_keeps_last_partial_value() {
        let policy = RetryPolicy::immediate(3);

        let outcome = policy
            .poll("test", |i| async move {
                match i {
                    1 => Attempt::Retry(Some("first")),
                    2 => Attempt::Retry(Some("second")),
                    _ => Attempt::Retry(None),
                }
            })
            .await;

        assert_eq!(outcome, PollOutcome::Exhausted(Some("second")));
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let outcome: PollOutcome<u8> = RetryPolicy::immediate(0)
            .poll("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Retry(None) }
            })
            .await;
        assert_eq!(outcome, PollOutcome::Exhausted(None));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_stays_within_jitter_window() {
        let policy = RetryPolicy::new(1, Duration::from_millis(100), Duration::from_millis(50));
        for _ in 0..100 {
            let delay = policy.delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn huge_base_and_jitter_saturate() {
        assert_eq!(jittered(Duration::MAX, Duration::from_secs(5)), Duration::MAX);
        assert_eq!(jittered(Duration::from_secs(1), Duration::ZERO), Duration::from_secs(1));
    }
}
