//! Retry executor behaviour under paused tokio time

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use candle_cache::{with_retry, RetryPolicy};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_always_failing_operation_backs_off_then_reraises() {
    let policy: RetryPolicy<String> = RetryPolicy::default();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let result: Result<(), String> = with_retry(&policy, || {
        let calls = calls.clone();
        async move {
            let mut calls = calls.lock().unwrap();
            calls.push(Instant::now());
            Err(format!("failure {}", calls.len()))
        }
    })
    .await;

    assert_eq!(result, Err("failure 3".to_string()));
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1] - calls[0], Duration::from_millis(1_000));
    assert_eq!(calls[2] - calls[1], Duration::from_millis(2_000));
}

#[tokio::test(start_paused = true)]
async fn test_success_returns_immediately() {
    let policy: RetryPolicy<String> = RetryPolicy::default();
    let attempts = AtomicU32::new(0);
    let started = Instant::now();

    let result = with_retry(&policy, || async {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt < 2 {
            Err("transient".to_string())
        } else {
            Ok(attempt)
        }
    })
    .await;

    assert_eq!(result, Ok(2));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(started.elapsed(), Duration::from_millis(1_000));
}

#[tokio::test(start_paused = true)]
async fn test_should_retry_false_stops_before_max_attempts() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_predicate = seen.clone();
    let policy = RetryPolicy::<String>::new()
        .with_max_attempts(5)
        .with_should_retry(move |error: &String, attempt| {
            seen_in_predicate.lock().unwrap().push(attempt);
            error != "fatal"
        });
    let attempts = AtomicU32::new(0);
    let started = Instant::now();

    let result: Result<(), String> = with_retry(&policy, || async {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Err(if attempt == 2 { "fatal" } else { "retry me" }.to_string())
    })
    .await;

    assert_eq!(result, Err("fatal".to_string()));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    assert_eq!(started.elapsed(), Duration::from_millis(1_000));
}

#[tokio::test(start_paused = true)]
async fn test_delay_capped_at_max() {
    let policy = RetryPolicy::<String>::new()
        .with_max_attempts(4)
        .with_max_delay(Duration::from_millis(1_500));
    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorded = delays.clone();
    let policy = policy.with_on_retry(move |_error, attempt, delay| {
        recorded.lock().unwrap().push((attempt, delay));
    });

    let started = Instant::now();
    let result: Result<(), String> = with_retry(&policy, || async { Err("down".to_string()) }).await;

    assert!(result.is_err());
    assert_eq!(
        *delays.lock().unwrap(),
        vec![
            (1, Duration::from_millis(1_000)),
            (2, Duration::from_millis(1_500)),
            (3, Duration::from_millis(1_500)),
        ]
    );
    assert_eq!(started.elapsed(), Duration::from_millis(4_000));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_on_retry_does_not_abort_loop() {
    let policy = RetryPolicy::<String>::new().with_on_retry(|_error, _attempt, _delay| {
        panic!("observer blew up");
    });
    let attempts = AtomicU32::new(0);

    let result: Result<(), String> = with_retry(&policy, || async {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err("down".to_string())
    })
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_policy_never_sleeps() {
    let policy = RetryPolicy::<String>::new().with_max_attempts(1);
    let started = Instant::now();

    let result: Result<(), String> = with_retry(&policy, || async { Err("down".to_string()) }).await;

    assert!(result.is_err());
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_future_stops_further_attempts() {
    let policy = RetryPolicy::<String>::new().with_max_attempts(10);
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();

    let run = with_retry(&policy, move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("down".to_string())
        }
    });
    // Attempts at 0s and 1s; abandoned during the 2s backoff
    let outcome = tokio::time::timeout(Duration::from_millis(1_500), run).await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_are_independent() {
    let policy: RetryPolicy<String> = RetryPolicy::default();
    let slow_attempts = AtomicU32::new(0);
    let fast_attempts = AtomicU32::new(0);

    let slow = with_retry(&policy, || async {
        slow_attempts.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>("down".to_string())
    });
    let fast = with_retry(&policy, || async {
        fast_attempts.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>("up")
    });

    let (slow, fast) = tokio::join!(slow, fast);
    assert!(slow.is_err());
    assert_eq!(fast, Ok("up"));
    assert_eq!(slow_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(fast_attempts.load(Ordering::SeqCst), 1);
}
