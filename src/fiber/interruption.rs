//! Interrupt status, masking, and suspension points.
//!
//! Interruption is cooperative. [`Fiber::request_interrupt`] only raises a
//! flag; the fiber notices it the next time it is parked on a suspension
//! point built with [`suspend`] while its current region is
//! [`InterruptStatus::Interruptible`]. The suspension point then completes
//! with `Err(Interrupted)` instead of waiting for its inner future.
//!
//! Regions change status through [`uninterruptible`], [`interruptible`] and
//! [`uninterruptible_mask`]. A region sets its status for the duration of
//! each poll of its body and puts the previous status back afterwards, so
//! regions nest the same way the effects nest.
//!
//! ```rust,ignore
//! use fibrous::fiber::{self, uninterruptible_mask};
//!
//! // Bookkeeping runs masked; only the wait itself may be interrupted.
//! let effect = uninterruptible_mask(|restore| {
//!     AsyncIO::new(move || async move {
//!         register().await;
//!         match restore.apply(fiber::sleep(Duration::from_secs(1))).await {
//!             Ok(()) => Ok(()),
//!             Err(interrupted) => {
//!                 unregister().await;
//!                 Err(interrupted)
//!             }
//!         }
//!     })
//! });
//! ```
//!
//! [`Fiber::request_interrupt`]: super::Fiber::request_interrupt

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project_lite::pin_project;

use super::Interrupted;
use super::context;
use crate::effect::AsyncIO;

/// Whether the current region of a fiber can observe interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterruptStatus {
    /// Suspension points complete early when interruption is requested.
    #[default]
    Interruptible,
    /// Interruption requests stay pending until the region is left.
    Uninterruptible,
}

/// Status of the region being polled.
///
/// Outside of a fiber this is `Interruptible`, although nothing can deliver
/// an interruption there.
#[must_use]
pub fn interrupt_status() -> InterruptStatus {
    context::current_status().unwrap_or_default()
}

// =============================================================================
// Status Regions
// =============================================================================

pin_project! {
    struct WithStatus<F> {
        #[pin]
        inner: F,
        status: InterruptStatus,
    }
}

impl<F: Future> Future for WithStatus<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _region = StatusRegion::enter(*this.status);
        this.inner.poll(context)
    }
}

/// Puts the previous status back when a poll returns or unwinds.
struct StatusRegion {
    previous: Option<InterruptStatus>,
}

impl StatusRegion {
    fn enter(status: InterruptStatus) -> Self {
        Self {
            previous: context::replace_status(status),
        }
    }
}

impl Drop for StatusRegion {
    fn drop(&mut self) {
        if let Some(previous) = self.previous {
            context::replace_status(previous);
        }
    }
}

fn with_status<A: Send + 'static>(io: AsyncIO<A>, status: InterruptStatus) -> AsyncIO<A> {
    AsyncIO::from_future(WithStatus { inner: io, status })
}

/// Runs `io` with interruption masked.
pub fn uninterruptible<A: Send + 'static>(io: AsyncIO<A>) -> AsyncIO<A> {
    with_status(io, InterruptStatus::Uninterruptible)
}

/// Runs `io` with interruption enabled, even inside a masked region.
pub fn interruptible<A: Send + 'static>(io: AsyncIO<A>) -> AsyncIO<A> {
    with_status(io, InterruptStatus::Interruptible)
}

/// Re-applies the status that was in effect when a mask was entered.
///
/// Handed out by [`uninterruptible_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restore {
    status: InterruptStatus,
}

impl Restore {
    /// Runs `io` with the captured status.
    pub fn apply<A: Send + 'static>(self, io: AsyncIO<A>) -> AsyncIO<A> {
        with_status(io, self.status)
    }

    /// The captured status.
    #[must_use]
    pub const fn status(self) -> InterruptStatus {
        self.status
    }
}

/// Runs the effect built by `body` uninterruptibly.
///
/// `body` receives a [`Restore`] holding the caller's status, so that parts
/// of the masked effect can opt back into the caller's policy. A caller that
/// was already uninterruptible stays uninterruptible inside `restore.apply`.
pub fn uninterruptible_mask<A, F>(body: F) -> AsyncIO<A>
where
    F: FnOnce(Restore) -> AsyncIO<A> + Send + 'static,
    A: Send + 'static,
{
    AsyncIO::new(move || {
        let restore = Restore {
            status: interrupt_status(),
        };
        WithStatus {
            inner: body(restore),
            status: InterruptStatus::Uninterruptible,
        }
    })
}

// =============================================================================
// Suspension Points
// =============================================================================

pin_project! {
    struct InterruptionPoint<F> {
        #[pin]
        inner: F,
    }
}

impl<F: Future> Future for InterruptionPoint<F> {
    type Output = Result<F::Output, Interrupted>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        // Checked before the inner future so that a pending interruption wins
        // over a result that became ready at the same time.
        if let Some(interrupted) = context::poll_interrupt(context) {
            return Poll::Ready(Err(interrupted));
        }
        this.inner.poll(context).map(Ok)
    }
}

/// Awaits `future` as an interruptible suspension point.
///
/// If the fiber is interrupted while parked here (and the region is
/// interruptible) `future` is dropped and `Err(Interrupted)` is returned.
pub fn suspend<F>(future: F) -> AsyncIO<Result<F::Output, Interrupted>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    AsyncIO::from_future(InterruptionPoint { inner: future })
}

/// Fails with `Interrupted` if an interruption is pending and observable.
pub fn check_interrupt() -> AsyncIO<Result<(), Interrupted>> {
    suspend(std::future::ready(()))
}

/// Interruptible sleep.
pub fn sleep(duration: Duration) -> AsyncIO<Result<(), Interrupted>> {
    suspend(tokio::time::sleep(duration))
}
