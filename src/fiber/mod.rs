//! Lightweight fibers with cooperative, maskable interruption.
//!
//! A [`Fiber`] is an [`AsyncIO`] running concurrently on the tokio runtime.
//! The handle returned by [`Fiber::fork`] can join the fiber or ask it to
//! stop:
//!
//! - [`Fiber::join`] waits for the exit and reports panics and interruptions
//!   as [`FiberError`].
//! - [`Fiber::request_interrupt`] raises the fiber's interruption flag. The
//!   fiber sees it at its next interruptible suspension point, which then
//!   yields `Err(Interrupted)`; the fiber is expected to clean up and
//!   propagate it.
//! - [`Fiber::interrupt`] requests interruption and joins.
//!
//! Interruption never tears a fiber down from the outside. Critical sections
//! run under [`uninterruptible_mask`], where requests stay pending until the
//! section is left or reaches a [`Restore::apply`] region.
//!
//! # Examples
//!
//! ```rust,ignore
//! use fibrous::effect::AsyncIO;
//! use fibrous::fiber::{self, Fiber, FiberError};
//! use std::time::Duration;
//!
//! let sleeper = Fiber::fork(fiber::sleep(Duration::from_secs(60))).await;
//! let exit = sleeper.interrupt().await;
//! assert!(matches!(exit, Err(FiberError::Interrupted(_))));
//! ```

mod context;
mod error;
mod interruption;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::effect::AsyncIO;
use crate::effect::async_io::panic_message;
use crate::effect::async_io::runtime;

pub use error::{FiberError, Interrupted};
pub use interruption::{
    InterruptStatus, Restore, check_interrupt, interrupt_status, interruptible, sleep, suspend,
    uninterruptible, uninterruptible_mask,
};

use context::FiberShared;

// =============================================================================
// FiberId
// =============================================================================

/// Process-unique identifier of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(u64);

impl FiberId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value of the id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

/// Id of the fiber being polled, or `None` outside of any fiber.
#[must_use]
pub fn current_fiber_id() -> Option<FiberId> {
    context::current_id()
}

// =============================================================================
// Fiber
// =============================================================================

/// Handle to a forked fiber.
///
/// Dropping the handle detaches the fiber; it keeps running to completion.
pub struct Fiber<A> {
    shared: Arc<FiberShared>,
    handle: JoinHandle<Result<A, Interrupted>>,
}

impl<A: Send + 'static> Fiber<A> {
    /// Starts `io` on a new fiber.
    ///
    /// The new fiber inherits the interrupt status of the forking region.
    pub fn fork(io: AsyncIO<Result<A, Interrupted>>) -> AsyncIO<Self> {
        AsyncIO::new(move || async move { Self::spawn(io, interrupt_status()) })
    }

    fn spawn(io: AsyncIO<Result<A, Interrupted>>, status: InterruptStatus) -> Self {
        let shared = Arc::new(FiberShared::new(FiberId::next()));
        let id = shared.id();
        tracing::trace!(fiber = %id, ?status, parent = ?current_fiber_id(), "forking fiber");

        let span = tracing::debug_span!("fiber", id = %id);
        let body = context::enter(Arc::clone(&shared), status, io).instrument(span);
        let handle = runtime::handle().spawn(body);

        Self { shared, handle }
    }

    /// The fiber's id.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.shared.id()
    }

    /// Returns `true` once the fiber has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Asks the fiber to stop at its next interruptible suspension point.
    ///
    /// Idempotent, and a no-op for a fiber that has already exited.
    pub fn request_interrupt(&self) {
        if self.shared.request_interrupt() {
            tracing::debug!(fiber = %self.id(), "interruption requested");
        }
    }

    /// Waits for the fiber to exit.
    ///
    /// Joining is not itself an interruption point.
    pub fn join(self) -> AsyncIO<Result<A, FiberError>> {
        AsyncIO::new(move || async move {
            let id = self.shared.id();
            match self.handle.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(_)) => Err(FiberError::Interrupted(id)),
                Err(join_error) if join_error.is_panic() => {
                    let message = panic_message(join_error.into_panic().as_ref());
                    tracing::warn!(fiber = %id, %message, "fiber panicked");
                    Err(FiberError::Panicked { fiber: id, message })
                }
                // The task was cancelled by a runtime shutdown.
                Err(_) => Err(FiberError::Interrupted(id)),
            }
        })
    }

    /// Requests interruption, then waits for the fiber to exit.
    ///
    /// A fiber that finishes before it reaches an interruptible suspension
    /// point reports its normal result.
    pub fn interrupt(self) -> AsyncIO<Result<A, FiberError>> {
        AsyncIO::new(move || async move {
            self.request_interrupt();
            self.join().await
        })
    }
}

impl<A> fmt::Debug for Fiber<A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Fiber")
            .field("id", &self.shared.id())
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

impl<A: Send + 'static> AsyncIO<Result<A, Interrupted>> {
    /// Starts this effect on a new fiber. See [`Fiber::fork`].
    pub fn fork(self) -> AsyncIO<Fiber<A>> {
        Fiber::fork(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    fn fiber_ids_are_unique_and_increasing() {
        let first = FiberId::next();
        let second = FiberId::next();
        assert!(second > first);
        assert_eq!(format!("{first}"), format!("#{}", first.as_u64()));
    }

    #[rstest]
    #[tokio::test]
    async fn join_returns_the_result() {
        let fiber = AsyncIO::pure(Ok(21))
            .fmap(|value: Result<i32, Interrupted>| value.map(|x| x * 2))
            .fork()
            .await;
        assert_eq!(fiber.join().await, Ok(42));
    }

    #[rstest]
    #[tokio::test]
    async fn fiber_sees_its_own_id() {
        let fiber = Fiber::fork(AsyncIO::new(|| async { Ok(current_fiber_id()) })).await;
        let id = fiber.id();
        assert_eq!(fiber.join().await, Ok(Some(id)));
        assert_eq!(current_fiber_id(), None);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn interrupt_stops_a_sleeping_fiber() {
        let fiber = Fiber::fork(sleep(Duration::from_secs(60))).await;
        let id = fiber.id();
        assert_eq!(fiber.interrupt().await, Err(FiberError::Interrupted(id)));
    }

    #[rstest]
    #[tokio::test]
    async fn panics_are_reported_on_join() {
        let fiber = Fiber::<()>::fork(AsyncIO::new(|| async { panic!("kaboom") })).await;
        let id = fiber.id();
        assert_eq!(
            fiber.join().await,
            Err(FiberError::Panicked {
                fiber: id,
                message: "kaboom".to_string(),
            })
        );
    }
}
