//! Fair asynchronous mutex.
//!
//! The lock is a [`SynchronizedRef`] holding `locked` and a FIFO queue of
//! waiter signals. Every transition (acquire, release, leaving the queue)
//! is one serialized modification of that state, which keeps two facts true
//! at all times:
//!
//! - an unlocked mutex has no waiters;
//! - a waiter that has been handed the lock is no longer queued.
//!
//! Release never unlocks while anyone is waiting. It pops the oldest waiter
//! and resolves its signal, so ownership passes directly from one holder to
//! the next and nobody can cut in line.
//!
//! # Interruption
//!
//! `acquire` runs masked. Only the wait on the signal observes interruption,
//! with the caller's own status. An interrupted waiter removes its signal
//! from the queue, or, if a release already popped it, releases the lock it
//! was just handed.
//!
//! # Examples
//!
//! ```rust,ignore
//! use fibrous::effect::AsyncIO;
//! use fibrous::sync::Mutex;
//!
//! let mutex = Mutex::make().await;
//!
//! mutex.acquire().await?;
//! // critical section
//! mutex.release().await;
//!
//! let value = mutex
//!     .with_lock(AsyncIO::new(|| async { Ok(compute().await) }))
//!     .await?;
//! ```

use super::queued::{self, Admission, QueuedLock};
use super::signal::{Signal, SignalId};
use super::synchronized::SynchronizedRef;
use super::wait_queue::WaitQueue;
use crate::effect::AsyncIO;
use crate::fiber::Interrupted;

#[derive(Debug, Clone, Default)]
struct MutexState {
    locked: bool,
    waiting: WaitQueue,
}

impl MutexState {
    fn check(&self) {
        debug_assert!(
            self.locked || self.waiting.is_empty(),
            "unlocked mutex with {} waiters",
            self.waiting.len()
        );
    }
}

/// Point-in-time view of a [`Mutex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutexSnapshot {
    /// Whether some holder owns the lock.
    pub locked: bool,
    /// Number of queued waiters.
    pub waiting: usize,
}

/// A fair, interruption-safe asynchronous mutex.
///
/// The mutex guards no data; callers pair `acquire` with `release`, or use
/// [`with_lock`](Self::with_lock). Clones share the same lock.
#[derive(Debug, Clone, Default)]
pub struct Mutex {
    state: SynchronizedRef<MutexState>,
}

impl Mutex {
    /// Creates an unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Effect creating an unlocked mutex.
    pub fn make() -> AsyncIO<Self> {
        AsyncIO::new(|| async { Self::new() })
    }

    /// Acquires the lock, waiting behind earlier callers.
    ///
    /// Waiters are served in the order they called `acquire`. On
    /// `Err(Interrupted)` the caller does not hold the lock and has left the
    /// queue.
    pub fn acquire(&self) -> AsyncIO<Result<(), Interrupted>> {
        queued::acquire(self)
    }

    /// Takes the lock only if nobody holds it. Never queues.
    pub fn try_acquire(&self) -> AsyncIO<bool> {
        self.state.modify_uninterruptible(|mut state| {
            state.check();
            let acquired = !state.locked;
            state.locked = true;
            AsyncIO::pure((acquired, state))
        })
    }

    /// Releases the lock.
    ///
    /// The oldest waiter, if any, becomes the holder; otherwise the mutex is
    /// unlocked. Releasing an unlocked mutex does nothing. The mutex does not
    /// track holders, so a release by a non-holder is not detected.
    pub fn release(&self) -> AsyncIO<()> {
        self.state.modify_uninterruptible(|mut state| {
            state.check();
            if !state.locked {
                tracing::trace!("release of an unlocked mutex ignored");
                return AsyncIO::pure(((), state));
            }
            match state.waiting.pop_front() {
                Some(next) => {
                    tracing::trace!(signal = %next.id(), "handing lock to next waiter");
                    next.resolve().fmap(move |_| ((), state))
                }
                None => {
                    state.locked = false;
                    tracing::trace!("mutex unlocked");
                    AsyncIO::pure(((), state))
                }
            }
        })
    }

    /// Runs `io` while holding the lock.
    ///
    /// `io` runs with the caller's interrupt status. The lock is released
    /// however `io` ends: success, `Err(Interrupted)`, or panic (which is
    /// resumed after the release).
    pub fn with_lock<A: Send + 'static>(
        &self,
        io: AsyncIO<Result<A, Interrupted>>,
    ) -> AsyncIO<Result<A, Interrupted>> {
        queued::with_held(self, io)
    }

    /// Current lock state and queue length.
    pub fn snapshot(&self) -> AsyncIO<MutexSnapshot> {
        self.state.get().fmap(|state| MutexSnapshot {
            locked: state.locked,
            waiting: state.waiting.len(),
        })
    }
}

impl QueuedLock for Mutex {
    const KIND: &'static str = "mutex";

    fn admit(&self) -> AsyncIO<Admission> {
        self.state.modify_uninterruptible(|mut state| {
            state.check();
            if !state.locked {
                state.locked = true;
                return AsyncIO::pure((Admission::Granted, state));
            }
            Signal::make().fmap(move |signal| {
                state.waiting.push_back(signal.clone());
                (Admission::Queued(signal), state)
            })
        })
    }

    fn withdraw(&self, signal: SignalId) -> AsyncIO<bool> {
        self.state.modify_uninterruptible(move |mut state| {
            let removed = state.waiting.remove(signal);
            AsyncIO::pure((removed, state))
        })
    }

    fn release(&self) -> AsyncIO<()> {
        Self::release(self)
    }
}

static_assertions::assert_impl_all!(Mutex: Send, Sync, Clone);
