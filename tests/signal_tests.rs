//! Integration tests for Signal.

#![cfg(feature = "sync")]

use fibrous::fiber::{Fiber, FiberError};
use fibrous::sync::Signal;
use rstest::rstest;
use std::collections::HashSet;
use std::time::Duration;

#[rstest]
#[tokio::test]
async fn test_signal_resolve_reports_first_transition() {
    let signal = Signal::make().await;
    assert!(!signal.is_resolved());
    assert!(signal.resolve().await);
    assert!(!signal.resolve().await);
    assert!(signal.is_resolved());
}

#[rstest]
#[tokio::test]
async fn test_signal_resolve_is_lazy() {
    let signal = Signal::new();
    let effect = signal.resolve();
    assert!(!signal.is_resolved());
    assert!(effect.await);
}

#[rstest]
#[case(1)]
#[case(8)]
#[tokio::test(start_paused = true)]
async fn test_signal_releases_every_waiter(#[case] waiters: usize) {
    let signal = Signal::new();
    let mut fibers = Vec::with_capacity(waiters);
    for _ in 0..waiters {
        fibers.push(Fiber::fork(signal.wait()).await);
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(fibers.iter().all(|fiber| !fiber.is_finished()));

    signal.resolve().await;
    for fiber in fibers {
        assert_eq!(fiber.join().await, Ok(()));
    }
}

#[rstest]
#[tokio::test]
async fn test_signal_wait_after_resolution_returns_immediately() {
    let signal = Signal::new();
    signal.resolve().await;
    assert_eq!(signal.wait().await, Ok(()));
    assert_eq!(signal.wait().await, Ok(()));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_signal_wait_is_interruptible() {
    let signal = Signal::new();
    let waiter = Fiber::fork(signal.wait()).await;
    tokio::task::yield_now().await;

    let id = waiter.id();
    assert_eq!(waiter.interrupt().await, Err(FiberError::Interrupted(id)));

    // The signal itself is unaffected.
    assert!(!signal.is_resolved());
    assert!(signal.resolve().await);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_signal_resolution_racing_with_waiters_is_never_missed() {
    for _ in 0..50 {
        let signal = Signal::new();
        let waiter = Fiber::fork(signal.wait()).await;
        let resolver = Fiber::fork(signal.resolve().fmap(Ok)).await;
        assert_eq!(resolver.join().await, Ok(true));
        assert_eq!(waiter.join().await, Ok(()));
    }
}

#[rstest]
fn test_signal_identity() {
    let first = Signal::new();
    let second = Signal::new();
    let set: HashSet<Signal> = [first.clone(), first.clone(), second.clone()].into_iter().collect();

    assert_eq!(set.len(), 2);
    assert_eq!(first, first.clone());
    assert_ne!(first.id(), second.id());
}

#[rstest]
#[tokio::test]
async fn test_signal_make_returns_fresh_signals() {
    let first = Signal::make().await;
    let second = Signal::make().await;
    assert_ne!(first, second);
}
