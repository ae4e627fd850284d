use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::time::Duration;

pub const FIRESTORE_LISTENER_DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const FIRESTORE_LISTENER_DEFAULT_RETRY_MULTIPLIER: f64 = 1.3;
pub const FIRESTORE_LISTENER_DEFAULT_MAX_RETRIES: usize = 5;

/// Delays between reconnects of a listen stream after transient errors.
///
/// The delays grow geometrically and are not randomised. After `max_retries`
/// consecutive delays the policy is exhausted and [`next_delay`](Self::next_delay)
/// returns `None` until it is [`reset`](Self::reset).
pub struct FirestoreListenerRetryPolicy {
    backoff: ExponentialBackoff,
    max_retries: usize,
    attempts: usize,
}

impl FirestoreListenerRetryPolicy {
    pub fn new(initial_delay: Duration, multiplier: f64, max_retries: usize) -> Self {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(initial_delay)
            .with_multiplier(multiplier)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(3600))
            .with_max_elapsed_time(None)
            .build();

        Self {
            backoff,
            max_retries,
            attempts: 0,
        }
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_retries {
            return None;
        }
        self.attempts += 1;
        self.backoff.next_backoff()
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }
}

impl Default for FirestoreListenerRetryPolicy {
    fn default() -> Self {
        Self::new(
            FIRESTORE_LISTENER_DEFAULT_RETRY_INITIAL_DELAY,
            FIRESTORE_LISTENER_DEFAULT_RETRY_MULTIPLIER,
            FIRESTORE_LISTENER_DEFAULT_MAX_RETRIES,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_delay_sequence() {
        let mut policy = FirestoreListenerRetryPolicy::default();
        let delays: Vec<f64> = std::iter::from_fn(|| policy.next_delay())
            .map(|delay| delay.as_secs_f64())
            .collect();

        assert_eq!(delays.len(), 5);
        for (delay, expected) in delays.iter().zip([1.0, 1.3, 1.69, 2.197, 2.8561]) {
            assert_relative_eq!(*delay, expected, epsilon = 1e-6);
        }
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempts(), 5);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut policy = FirestoreListenerRetryPolicy::default();
        policy.next_delay();
        policy.next_delay();
        policy.reset();

        assert_eq!(policy.attempts(), 0);
        let first = policy.next_delay().map(|delay| delay.as_secs_f64());
        assert_relative_eq!(first.unwrap_or_default(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_custom_policy() {
        let mut policy = FirestoreListenerRetryPolicy::new(Duration::from_millis(10), 2.0, 2);
        assert_relative_eq!(
            policy.next_delay().unwrap().as_secs_f64(),
            0.01,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            policy.next_delay().unwrap().as_secs_f64(),
            0.02,
            epsilon = 1e-6
        );
        assert!(policy.next_delay().is_none());
    }

    #[test]
    fn test_no_retries() {
        let mut policy = FirestoreListenerRetryPolicy::new(Duration::from_secs(1), 1.3, 0);
        assert!(policy.next_delay().is_none());
    }
}
