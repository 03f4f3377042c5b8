// Retry/budget controller for outbound calls
// Author: kelexine (https://github.com/kelexine)

use crate::config::RetryConfig;
use crate::error::ProxyError;
use crate::metrics;
use backoff::{backoff::Backoff, ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// Upstream answered with a non-2xx status.
    Status { status: u16, body: String },
    /// The attempt ran past its own timeout.
    Timeout,
    /// Connection reset, refused, DNS failure.
    Network(String),
    /// Upstream answered but the payload could not be used.
    Malformed(String),
}

impl AttemptError {
    /// Classify a reqwest transport error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            AttemptError::Timeout
        } else if err.is_decode() {
            AttemptError::Malformed(err.to_string())
        } else {
            AttemptError::Network(err.to_string())
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Status { status, .. } => is_retryable(*status),
            AttemptError::Timeout | AttemptError::Network(_) => true,
            AttemptError::Malformed(_) => false,
        }
    }

    /// Metric label for a retry caused by this error.
    pub fn reason(&self) -> &'static str {
        match self {
            AttemptError::Status { status: 429, .. } => "rate_limited",
            AttemptError::Status { .. } => "server_error",
            AttemptError::Timeout => "timeout",
            AttemptError::Network(_) => "network",
            AttemptError::Malformed(_) => "malformed",
        }
    }

    fn into_proxy_error(self, attempt_timeout: Duration) -> ProxyError {
        match self {
            AttemptError::Status { status, body } => ProxyError::upstream_http(status, &body),
            AttemptError::Timeout => ProxyError::UpstreamTimeout {
                elapsed: attempt_timeout,
            },
            AttemptError::Network(msg) => ProxyError::Network(msg),
            AttemptError::Malformed(msg) => ProxyError::MalformedResponse(msg),
        }
    }
}

/// Determine if an HTTP status code is retryable
pub fn is_retryable(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Limits for one logical outbound call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Endpoint kind label used for metrics.
    pub endpoint_kind: String,
    pub budget: Duration,
    pub attempt_timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig, endpoint_kind: &str, attempt_timeout: Duration) -> Self {
        Self {
            endpoint_kind: endpoint_kind.to_string(),
            budget: Duration::from_secs(config.budget_seconds),
            attempt_timeout,
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Create exponential backoff configuration for retries.
    /// No jitter, doubling, capped per step; the deadline is enforced by
    /// the caller rather than by `max_elapsed_time`.
    pub fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Per-call bookkeeping.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    pub started: Instant,
    pub deadline: Instant,
    pub attempts: u32,
    pub last_backoff: Option<Duration>,
    /// Every interval actually slept, in order.
    pub backoff_history: Vec<Duration>,
}

impl RetryBudget {
    pub fn start(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + budget,
            attempts: 0,
            last_backoff: None,
            backoff_history: Vec::new(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Execute `operation` under `policy`, discarding the bookkeeping.
pub async fn with_retry<F, Fut, T>(operation_name: &str, policy: &RetryPolicy, operation: F) -> crate::error::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    with_retry_budget(operation_name, policy, operation).await.0
}

/// Execute `operation` with timeout, backoff and an overall deadline.
/// - Each attempt gets `min(attempt_timeout, remaining budget)`
/// - 429/5xx, timeouts and network errors are retried
/// - A backoff that would end past the deadline is never slept
pub async fn with_retry_budget<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> (crate::error::Result<T>, RetryBudget)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut budget = RetryBudget::start(policy.budget);
    let mut backoff = policy.create_backoff();

    loop {
        let remaining = budget.remaining();
        if remaining.is_zero() {
            return exhausted(operation_name, policy, budget);
        }

        budget.attempts += 1;
        let attempt_timeout = policy.attempt_timeout.min(remaining);

        let outcome = match tokio::time::timeout(attempt_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Timeout),
        };

        let err = match outcome {
            Ok(value) => {
                if budget.attempts > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, budget.attempts);
                }
                return (Ok(value), budget);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            warn!("{} failed with non-retryable error: {:?}", operation_name, err);
            return (Err(err.into_proxy_error(attempt_timeout)), budget);
        }

        // The attempt was cut short by the deadline, not by its own timeout
        if err == AttemptError::Timeout && attempt_timeout < policy.attempt_timeout {
            return exhausted(operation_name, policy, budget);
        }

        if budget.attempts >= policy.max_attempts {
            warn!(
                "{} giving up after {} attempts: {:?}",
                operation_name, budget.attempts, err
            );
            return (Err(err.into_proxy_error(attempt_timeout)), budget);
        }

        let delay = backoff.next_backoff().unwrap_or(policy.max_interval);
        if delay >= budget.remaining() {
            return exhausted(operation_name, policy, budget);
        }

        debug!(
            "{} failed with {:?} (attempt {}), retrying after {}ms",
            operation_name,
            err,
            budget.attempts,
            delay.as_millis()
        );
        metrics::record_retry(&policy.endpoint_kind, err.reason());

        budget.last_backoff = Some(delay);
        budget.backoff_history.push(delay);
        tokio::time::sleep(delay).await;
    }
}

fn exhausted<T>(
    operation_name: &str,
    policy: &RetryPolicy,
    budget: RetryBudget,
) -> (crate::error::Result<T>, RetryBudget) {
    warn!(
        "{} exhausted its {:?} budget after {} attempt(s)",
        operation_name, policy.budget, budget.attempts
    );
    metrics::record_budget_exhausted(&policy.endpoint_kind);
    let err = ProxyError::UpstreamBudgetExceeded {
        budget: policy.budget,
        attempts: budget.attempts,
    };
    (Err(err), budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(budget_secs: u64, attempt_secs: u64, max_interval_ms: u64) -> RetryPolicy {
        RetryPolicy {
            endpoint_kind: "openai-compatible".to_string(),
            budget: Duration::from_secs(budget_secs),
            attempt_timeout: Duration::from_secs(attempt_secs),
            initial_interval: Duration::from_millis(1000),
            max_interval: Duration::from_millis(max_interval_ms),
            max_attempts: 5,
        }
    }

    fn rate_limited() -> AttemptError {
        AttemptError::Status {
            status: 429,
            body: "slow down".to_string(),
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(429));
        assert!(is_retryable(500));
        assert!(is_retryable(502));
        assert!(is_retryable(503));
        assert!(is_retryable(529));
        assert!(!is_retryable(400));
        assert!(!is_retryable(404));
    }

    #[test]
    fn test_attempt_error_classification() {
        assert!(rate_limited().is_retryable());
        assert!(AttemptError::Timeout.is_retryable());
        assert!(AttemptError::Network("reset".into()).is_retryable());
        assert!(!AttemptError::Malformed("bad json".into()).is_retryable());
        assert!(!AttemptError::Status { status: 401, body: String::new() }.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_rate_limits_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, budget) = with_retry_budget("test", &policy(120, 60, 30_000), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 3 {
                    Err(rate_limited())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(budget.attempts, 4);
        assert_eq!(budget.backoff_history.len(), 3);
        for pair in budget.backoff_history.windows(2) {
            assert!(pair[1] >= pair[0] * 2);
        }
        assert!(budget.backoff_history.iter().all(|d| *d <= Duration::from_secs(30)));
        assert_eq!(budget.last_backoff, Some(Duration::from_secs(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let mut p = policy(600, 60, 3000);
        p.max_attempts = 6;

        let (result, budget) = with_retry_budget("test", &p, || async { Err::<(), _>(rate_limited()) }).await;

        assert!(matches!(result, Err(ProxyError::UpstreamHttp { status: 429, .. })));
        assert_eq!(budget.attempts, 6);
        assert_eq!(
            budget.backoff_history,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_transport_exceeds_budget() {
        let p = policy(10, 4, 30_000);
        let start = Instant::now();

        let (result, budget) = with_retry_budget("test", &p, || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), AttemptError>(())
        })
        .await;

        assert!(matches!(result, Err(ProxyError::UpstreamBudgetExceeded { .. })));
        let scheduled = budget.last_backoff.unwrap_or(p.initial_interval);
        assert!(start.elapsed() <= p.budget + scheduled);
        assert!(budget.attempts >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_is_immediate() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: crate::error::Result<()> = with_retry("test", &policy(120, 60, 30_000), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AttemptError::Status {
                    status: 400,
                    body: "bad".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ProxyError::UpstreamHttp { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: crate::error::Result<()> = with_retry("test", &policy(120, 60, 30_000), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Malformed("not json".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ProxyError::MalformedResponse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_timeout_within_budget_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry("test", &policy(120, 5, 30_000), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok::<_, AttemptError>("ok")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
