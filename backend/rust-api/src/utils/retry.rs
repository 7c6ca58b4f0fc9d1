use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter for transient store failures.
#[derive(Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
            jitter: Duration::from_millis(50),
        }
    }
}

impl RetryConfig {
    /// Profile for writes that must not be dropped: mastery upserts and
    /// the session completion transition.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(1000),
            jitter: Duration::from_millis(100),
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            exp
        } else {
            exp + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        }
    }
}

pub async fn retry_async_with_config<F, Fut, T, E>(config: RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let last_attempt = config.max_attempts.saturating_sub(1);

    for attempt in 0.. {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= last_attempt => return Err(err),
            Err(_) => tokio::time::sleep(config.delay_for(attempt)).await,
        }
    }

    unreachable!("retry loop exits via return")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn recovers_once_the_operation_succeeds() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, &str> = retry_async_with_config(fast(4), || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                n if n < 2 => Err("transient"),
                n => Ok(n),
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_configured_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry_async_with_config(fast(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("still broken")
        })
        .await;

        assert_eq!(result, Err("still broken"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delay_is_capped_at_max() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            jitter: Duration::ZERO,
        };

        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(5), Duration::from_millis(300));
    }
}
