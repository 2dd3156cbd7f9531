//! Integration tests for Semaphore.

#![cfg(feature = "sync")]

use fibrous::effect::AsyncIO;
use fibrous::fiber::{Fiber, Interrupted};
use fibrous::sync::{Semaphore, SemaphoreError};
use parking_lot::Mutex as RecordLock;
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

async fn wait_for_waiters(semaphore: &Semaphore, expected: usize) {
    for _ in 0..1_000 {
        if semaphore.waiting().await == expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("semaphore never reached {expected} waiters");
}

#[rstest]
#[tokio::test]
async fn test_make_rejects_zero_permits() {
    assert_eq!(
        Semaphore::make(0).await.err(),
        Some(SemaphoreError::NoPermits)
    );
    assert_eq!(
        SemaphoreError::NoPermits.to_string(),
        "a semaphore needs at least one permit"
    );
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
#[tokio::test(start_paused = true)]
async fn test_at_most_permits_holders_at_once(#[case] permits: usize) {
    let semaphore = Semaphore::new(permits);
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let mut fibers = Vec::new();
    for _ in 0..10 {
        let inside = Arc::clone(&inside);
        let max_inside = Arc::clone(&max_inside);
        let body = AsyncIO::new(move || async move {
            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
            max_inside.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
        fibers.push(Fiber::fork(semaphore.with_permit(body)).await);
    }
    for fiber in fibers {
        assert_eq!(fiber.join().await, Ok(()));
    }

    assert_eq!(max_inside.load(Ordering::SeqCst), permits);
    assert_eq!(semaphore.available().await, permits);
}

#[rstest]
#[tokio::test]
async fn test_permits_go_to_waiters_in_arrival_order() {
    let semaphore = Semaphore::new(2);
    semaphore.acquire().await.unwrap();
    semaphore.acquire().await.unwrap();

    let order = Arc::new(RecordLock::new(Vec::new()));
    let mut fibers = Vec::new();
    for index in 0..4 {
        let worker = semaphore.clone();
        let order = Arc::clone(&order);
        let body = AsyncIO::new(move || async move {
            worker.acquire().await?;
            order.lock().push(index);
            Ok::<_, Interrupted>(())
        });
        fibers.push(Fiber::fork(body).await);
        wait_for_waiters(&semaphore, index + 1).await;
    }

    for _ in 0..4 {
        semaphore.release().await;
    }
    for fiber in fibers {
        fiber.join().await.unwrap();
    }

    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    assert_eq!(semaphore.available().await, 0);
}

#[rstest]
#[tokio::test]
async fn test_interrupted_waiter_does_not_consume_a_permit() {
    let semaphore = Semaphore::new(1);
    semaphore.acquire().await.unwrap();

    let waiter = Fiber::fork(semaphore.acquire()).await;
    wait_for_waiters(&semaphore, 1).await;
    assert!(waiter.interrupt().await.is_err());

    assert_eq!(semaphore.waiting().await, 0);
    semaphore.release().await;
    assert_eq!(semaphore.available().await, 1);
}

#[rstest]
#[tokio::test]
async fn test_promoted_then_interrupted_waiter_returns_its_permit() {
    let semaphore = Semaphore::new(1);
    semaphore.acquire().await.unwrap();

    let waiter = Fiber::fork(semaphore.acquire()).await;
    wait_for_waiters(&semaphore, 1).await;

    semaphore.release().await;
    waiter.request_interrupt();

    assert!(waiter.join().await.unwrap_err().is_interrupted());
    assert_eq!(semaphore.available().await, 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_with_permit_dropped_mid_body_returns_the_permit() {
    let semaphore = Semaphore::new(1);
    let scoped = semaphore.with_permit(
        AsyncIO::delay_async(Duration::from_secs(60)).fmap(|()| Ok::<_, Interrupted>(())),
    );
    assert_eq!(scoped.timeout(Duration::from_millis(10)).await, None);

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(semaphore.available().await, 1);
}
