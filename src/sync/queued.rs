//! Acquire and cleanup protocol shared by the queued locks.
//!
//! [`Mutex`](super::Mutex) and [`Semaphore`](super::Semaphore) keep their
//! state in a [`SynchronizedRef`](super::SynchronizedRef): a count of what is
//! free plus a FIFO [`WaitQueue`](super::wait_queue::WaitQueue) of signals.
//! Each lock supplies three serialized transitions and this module builds
//! acquisition and scoped use on top of them.
//!
//! 1. `admit` takes the lock if it is free, or enqueues a fresh signal.
//! 2. A queued caller waits on its signal. That wait is the only
//!    interruptible step; everything else runs masked.
//! 3. `release` either hands ownership to the oldest waiter (by resolving its
//!    signal, without ever marking the lock free) or frees the lock.
//!
//! A waiter interrupted in step 2 calls `withdraw`. If its signal is still
//! queued it simply leaves. If the signal is gone, a `release` already handed
//! it ownership; the waiter owns the lock without knowing it and releases it
//! again, which promotes the next waiter in line.
//!
//! The same cleanup runs on the runtime when an acquisition future is dropped
//! mid-wait or mid-cleanup, or when a scoped future is dropped while its body
//! runs or while it releases. Guards are disarmed only after the inline
//! cleanup completes. Each state transition commits without suspending, so a
//! step cut short by a drop has not taken effect and is safe to rerun.

use std::convert::identity;

use super::signal::{Signal, SignalId};
use crate::effect::AsyncIO;
use crate::effect::async_io::runtime;
use crate::fiber::{Interrupted, uninterruptible_mask};

/// Outcome of an `admit` transition.
#[derive(Debug)]
pub(crate) enum Admission {
    /// The caller owns the lock (or a permit) now.
    Granted,
    /// The caller must wait for this signal.
    Queued(Signal),
}

/// A lock whose waiters queue on signals.
pub(crate) trait QueuedLock: Clone + Send + Sync + 'static {
    /// Name used in log events.
    const KIND: &'static str;

    /// Takes the lock if free, otherwise enqueues a fresh signal.
    fn admit(&self) -> AsyncIO<Admission>;

    /// Removes `signal` from the queue. `false` means it was already promoted.
    fn withdraw(&self, signal: SignalId) -> AsyncIO<bool>;

    /// Hands the lock to the oldest waiter, or frees it.
    fn release(&self) -> AsyncIO<()>;
}

/// Acquires `lock`, waiting in line if necessary.
///
/// Only the wait itself observes interruption, with the caller's status.
/// On `Err(Interrupted)` the caller does not own the lock and the queue
/// holds no trace of it.
pub(crate) fn acquire<L: QueuedLock>(lock: &L) -> AsyncIO<Result<(), Interrupted>> {
    let lock = lock.clone();
    uninterruptible_mask(move |restore| {
        AsyncIO::new(move || async move {
            let signal = match lock.admit().await {
                Admission::Granted => {
                    tracing::trace!(kind = L::KIND, "acquired without waiting");
                    return Ok(());
                }
                Admission::Queued(signal) => signal,
            };
            tracing::trace!(kind = L::KIND, signal = %signal.id(), "queued");

            // Stays armed until the cleanup below has finished.
            let mut pending = OnDrop::abandon(lock.clone(), signal.id());
            let outcome = restore.apply(signal.wait()).await;
            match outcome {
                Ok(()) => {
                    pending.disarm();
                    tracing::trace!(kind = L::KIND, signal = %signal.id(), "acquired after waiting");
                    Ok(())
                }
                Err(interrupted) => {
                    abandon(&lock, signal.id()).await;
                    pending.disarm();
                    Err(interrupted)
                }
            }
        })
    })
}

/// Cleans up after a waiter that stopped waiting on `signal`.
fn abandon<L: QueuedLock>(lock: &L, signal: SignalId) -> AsyncIO<()> {
    let lock = lock.clone();
    lock.withdraw(signal).flat_map(move |removed| {
        if removed {
            tracing::debug!(kind = L::KIND, %signal, "waiter left the queue");
            AsyncIO::pure(())
        } else {
            tracing::debug!(kind = L::KIND, %signal, "promoted waiter left; releasing");
            lock.release()
        }
    })
}

/// Runs `io` while holding `lock`, releasing it afterwards.
///
/// `io` runs with the caller's interrupt status. The release also happens
/// when `io` panics; the panic is resumed afterwards.
pub(crate) fn with_held<L, A>(
    lock: &L,
    io: AsyncIO<Result<A, Interrupted>>,
) -> AsyncIO<Result<A, Interrupted>>
where
    L: QueuedLock,
    A: Send + 'static,
{
    let lock = lock.clone();
    uninterruptible_mask(move |restore| {
        AsyncIO::new(move || async move {
            restore.apply(acquire(&lock)).await?;

            let mut held = OnDrop::release(lock.clone());
            let outcome = restore.apply(io).catch_async(identity).await;
            lock.release().await;
            held.disarm();

            match outcome {
                Ok(value) => value,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    })
}

// =============================================================================
// Drop Cleanup
// =============================================================================

enum Cleanup {
    Abandon(SignalId),
    Release,
}

/// Finishes an interrupted protocol step when its future is dropped.
///
/// The cleanup needs to await the lock state, so it is spawned onto the
/// runtime rather than run inline.
struct OnDrop<L: QueuedLock> {
    lock: L,
    cleanup: Option<Cleanup>,
}

impl<L: QueuedLock> OnDrop<L> {
    fn abandon(lock: L, signal: SignalId) -> Self {
        Self {
            lock,
            cleanup: Some(Cleanup::Abandon(signal)),
        }
    }

    fn release(lock: L) -> Self {
        Self {
            lock,
            cleanup: Some(Cleanup::Release),
        }
    }

    fn disarm(&mut self) {
        self.cleanup = None;
    }
}

impl<L: QueuedLock> Drop for OnDrop<L> {
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };
        tracing::debug!(kind = L::KIND, "future dropped mid-protocol; cleaning up on the runtime");
        let effect = match cleanup {
            Cleanup::Abandon(signal) => abandon(&self.lock, signal),
            Cleanup::Release => self.lock.release(),
        };
        runtime::handle().spawn(effect);
    }
}
