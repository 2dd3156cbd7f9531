//! Fair counting semaphore.
//!
//! Same protocol as [`Mutex`](super::Mutex), with a permit count in place of
//! the `locked` flag: a release hands its permit straight to the oldest
//! waiter, and only returns it to the pool when nobody is waiting.

use super::queued::{self, Admission, QueuedLock};
use super::signal::{Signal, SignalId};
use super::synchronized::SynchronizedRef;
use super::wait_queue::WaitQueue;
use crate::effect::AsyncIO;
use crate::fiber::Interrupted;

/// Errors from constructing a [`Semaphore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SemaphoreError {
    /// A semaphore needs at least one permit.
    #[error("a semaphore needs at least one permit")]
    NoPermits,
}

#[derive(Debug, Clone)]
struct SemaphoreState {
    available: usize,
    waiting: WaitQueue,
}

/// A fair, interruption-safe counting semaphore.
///
/// Clones share the same permits.
#[derive(Debug, Clone)]
pub struct Semaphore {
    permits: usize,
    state: SynchronizedRef<SemaphoreState>,
}

impl Semaphore {
    /// Creates a semaphore with `permits` free permits.
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::NoPermits`] if `permits` is zero.
    pub fn try_new(permits: usize) -> Result<Self, SemaphoreError> {
        if permits == 0 {
            return Err(SemaphoreError::NoPermits);
        }
        Ok(Self {
            permits,
            state: SynchronizedRef::new(SemaphoreState {
                available: permits,
                waiting: WaitQueue::default(),
            }),
        })
    }

    /// Creates a semaphore with `permits` free permits.
    ///
    /// # Panics
    ///
    /// Panics if `permits` is zero.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self::try_new(permits).expect("Semaphore requires at least one permit")
    }

    /// Effect creating a semaphore. See [`try_new`](Self::try_new).
    pub fn make(permits: usize) -> AsyncIO<Result<Self, SemaphoreError>> {
        AsyncIO::new(move || async move { Self::try_new(permits) })
    }

    /// Total number of permits.
    #[must_use]
    pub const fn permits(&self) -> usize {
        self.permits
    }

    /// Number of free permits.
    pub fn available(&self) -> AsyncIO<usize> {
        self.state.get().fmap(|state| state.available)
    }

    /// Number of queued waiters.
    pub fn waiting(&self) -> AsyncIO<usize> {
        self.state.get().fmap(|state| state.waiting.len())
    }

    /// Takes a permit, waiting behind earlier callers if none is free.
    pub fn acquire(&self) -> AsyncIO<Result<(), Interrupted>> {
        queued::acquire(self)
    }

    /// Returns a permit.
    ///
    /// Releasing more permits than the semaphore was created with is ignored.
    pub fn release(&self) -> AsyncIO<()> {
        let permits = self.permits;
        self.state.modify_uninterruptible(move |mut state| {
            debug_assert!(state.available == 0 || state.waiting.is_empty());
            if let Some(next) = state.waiting.pop_front() {
                tracing::trace!(signal = %next.id(), "handing permit to next waiter");
                return next.resolve().fmap(move |_| ((), state));
            }
            if state.available < permits {
                state.available += 1;
            } else {
                tracing::trace!(permits, "release beyond capacity ignored");
            }
            AsyncIO::pure(((), state))
        })
    }

    /// Runs `io` while holding a permit.
    pub fn with_permit<A: Send + 'static>(
        &self,
        io: AsyncIO<Result<A, Interrupted>>,
    ) -> AsyncIO<Result<A, Interrupted>> {
        queued::with_held(self, io)
    }
}

impl QueuedLock for Semaphore {
    const KIND: &'static str = "semaphore";

    fn admit(&self) -> AsyncIO<Admission> {
        self.state.modify_uninterruptible(|mut state| {
            if state.available > 0 {
                state.available -= 1;
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

static_assertions::assert_impl_all!(Semaphore: Send, Sync, Clone);
