//! Unit tests for the shared retry helper.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use alertpipe::channels::SendError;
use alertpipe::retry::{with_backoff, RetryPolicy};

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(4))
}

#[tokio::test]
async fn transient_failures_then_success_within_budget() {
    // Two transient failures, success on the third attempt.
    let attempts = AtomicU32::new(0);
    let result = with_backoff(
        &policy(3),
        "email send",
        || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SendError::Transient("connection reset".to_string()))
                } else {
                    Ok(())
                }
            }
        },
        SendError::is_transient,
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn permanent_failure_short_circuits() {
    let attempts = AtomicU32::new(0);
    let result: Result<(), SendError> = with_backoff(
        &policy(5),
        "email send",
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(SendError::Permanent("unverified recipient".to_string())) }
        },
        SendError::is_transient,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn budget_bounds_total_attempts() {
    let attempts = AtomicU32::new(0);
    let result: Result<(), SendError> = with_backoff(
        &policy(2),
        "webhook send",
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(SendError::Transient("503".to_string())) }
        },
        SendError::is_transient,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn jittered_backoff_stays_within_the_cap() {
    let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_secs(5));
    for attempt in 0..10 {
        // Cap is 5s, jitter adds at most 25%.
        assert!(policy.delay_for(attempt) <= Duration::from_millis(6250));
    }
}
