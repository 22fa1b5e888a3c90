// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry executor for Tidemark backend operations.
//
// Each call walks a small state machine:
//
// ```text
// Attempting(1) --ok--> Succeeded
//      |
//     err, retryable, n < max --sleep(delay * n)--> Attempting(n + 1)
//      |
//     err, n == max or not retryable --> Failed (last error returned)
// ```
//
// Recorded calls append exactly one history record when they reach a
// terminal state. The executor never switches backends; that choice is made
// once by the selector.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::StorageResult;
use crate::history::{OperationHistory, OperationKind, OperationRecord};

/// Attempt budget and backoff unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first. Zero is treated as one.
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `retry_delay * n` before retrying.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Attempt count after normalisation.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Identifies a call for logging and history.
#[derive(Debug, Clone, Copy)]
pub struct OperationMeta<'a> {
    pub operation: OperationKind,
    pub key: &'a str,
    /// Whether a history record is written when the call terminates.
    pub record: bool,
}

impl<'a> OperationMeta<'a> {
    /// A call that appears in the operation history.
    pub fn recorded(operation: OperationKind, key: &'a str) -> Self {
        Self {
            operation,
            key,
            record: true,
        }
    }

    /// An internal call (sidecars, markers, scans) kept out of the history.
    pub fn silent(operation: OperationKind, key: &'a str) -> Self {
        Self {
            operation,
            key,
            record: false,
        }
    }
}

/// Runs backend operations under a [`RetryPolicy`].
pub struct RetryExecutor {
    policy: RetryPolicy,
    history: Arc<OperationHistory>,
    clock: Arc<dyn Clock>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, history: Arc<OperationHistory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            history,
            clock,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or exhausts the attempt budget.
    pub async fn execute<T, F, Fut>(&self, meta: OperationMeta<'_>, mut operation: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let attempts = self.policy.attempts();
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = %meta.operation, key = meta.key, attempt, "succeeded after retry");
                    }
                    self.finish(&meta, None);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        operation = %meta.operation,
                        key = meta.key,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "storage operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.finish(&meta, Some(err.to_string()));
                    return Err(err);
                }
            }
        }
    }

    /// Append a terminal record for `meta` directly, for failures that never
    /// reach the backend (validation, codec).
    pub fn record(&self, meta: &OperationMeta<'_>, error: Option<String>) {
        self.finish(meta, error);
    }

    fn finish(&self, meta: &OperationMeta<'_>, error: Option<String>) {
        if !meta.record {
            return;
        }
        self.history.push(OperationRecord {
            key: meta.key.to_string(),
            operation: meta.operation,
            timestamp_millis: self.clock.now_millis(),
            success: error.is_none(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StorageError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(max_retries: u32) -> (RetryExecutor, Arc<OperationHistory>) {
        let history = Arc::new(OperationHistory::default());
        let policy = RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(100),
        };
        let executor = RetryExecutor::new(policy, history.clone(), Arc::new(ManualClock::new(42)));
        (executor, history)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_attempt() {
        let (executor, history) = executor(3);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let started = tokio::time::Instant::now();
        let result = executor
            .execute(OperationMeta::recorded(OperationKind::Set, "k"), move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(StorageError::Backend("flaky".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Linear backoff: 100ms after attempt 1, 200ms after attempt 2.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300) && waited < Duration::from_millis(400));

        let records = history.snapshot();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].timestamp_millis, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let (executor, history) = executor(2);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: StorageResult<()> = executor
            .execute(OperationMeta::recorded(OperationKind::Get, "k"), move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(StorageError::Backend(format!("failure {n}")))
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "backend error: failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let records = history.snapshot();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].error.as_deref(), Some("backend error: failure 2"));
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let (executor, _history) = executor(5);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: StorageResult<()> = executor
            .execute(OperationMeta::silent(OperationKind::Set, "k"), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::BackendUnavailable("gone".into()))
            })
            .await;

        assert!(matches!(result, Err(StorageError::BackendUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_silent_calls_are_not_recorded() {
        let (executor, history) = executor(3);
        executor
            .execute(OperationMeta::silent(OperationKind::Set, "k_ttl"), || async { Ok(()) })
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_zero_retries_means_one_attempt() {
        let policy = RetryPolicy {
            max_retries: 0,
            retry_delay: Duration::ZERO,
        };
        assert_eq!(policy.attempts(), 1);
        assert_eq!(RetryPolicy::default().delay_after(3), Duration::from_millis(300));
    }
}
