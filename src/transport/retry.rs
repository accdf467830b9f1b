//! `ConnectWithRetry` — exponential backoff with a per-attempt timeout (§4.1).

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub per_attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            per_attempt_timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32 - 1);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Runs `attempt_connect` up to `policy.max_attempts` times, honoring per-attempt timeout and
/// immediate cancellation via `cancel` (§4.1, §5).
pub async fn connect_with_retry<F, Fut>(
    server_name: &str,
    policy: &RetryPolicy,
    cancel: CancellationToken,
    mut attempt_connect: F,
) -> Result<(), TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), TransportError>>,
{
    let mut last_err: Option<TransportError> = None;

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(TransportError::Canceled {
                server: server_name.to_string(),
            });
        }

        let attempt_future = attempt_connect();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TransportError::Canceled { server: server_name.to_string() });
            }
            result = tokio::time::timeout(policy.per_attempt_timeout, attempt_future) => result,
        };

        match outcome {
            Ok(Ok(())) => {
                log::info!("connected to '{}' on attempt {}/{}", server_name, attempt, policy.max_attempts);
                return Ok(());
            }
            Ok(Err(err)) => {
                log::warn!("connect attempt {}/{} to '{}' failed: {}", attempt, policy.max_attempts, server_name, err);
                last_err = Some(err);
            }
            Err(_elapsed) => {
                log::warn!("connect attempt {}/{} to '{}' timed out", attempt, policy.max_attempts, server_name);
                last_err = Some(TransportError::Timeout {
                    server: server_name.to_string(),
                })
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
        }
    }

    log::error!("exhausted {} connect attempts to '{}'", policy.max_attempts, server_name);
    Err(last_err.unwrap_or(TransportError::Connect {
        server: server_name.to_string(),
        cause: "no attempts were made".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_on_final_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            per_attempt_timeout: Duration::from_secs(5),
            ..RetryPolicy::default()
        };

        let result = connect_with_retry("srv", &policy, CancellationToken::new(), || {
            let attempts = attempts.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TransportError::Connect {
                        server: "srv".into(),
                        cause: "not yet".into(),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::default();

        let result = connect_with_retry("srv", &policy, cancel, || async { Ok(()) }).await;
        assert!(matches!(result, Err(TransportError::Canceled { .. })));
    }

    #[tokio::test]
    async fn exhausting_attempts_surfaces_last_error() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            per_attempt_timeout: Duration::from_secs(5),
            ..RetryPolicy::default()
        };

        let result = connect_with_retry("srv", &policy, CancellationToken::new(), || async {
            Err(TransportError::Connect {
                server: "srv".into(),
                cause: "boom".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
