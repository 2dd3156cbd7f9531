//! Task-local state of the fiber currently being polled.
//!
//! A fiber is a tokio task whose future runs inside a [`tokio::task_local!`]
//! scope. The scope carries two things:
//!
//! - the fiber's shared record (id, pending interruption, waker), which the
//!   `Fiber` handle also holds so that other tasks can interrupt it;
//! - the interrupt status of the region currently being polled. Status is
//!   only ever read and written from the fiber's own task, so a `Cell` is
//!   enough.
//!
//! Code running outside any fiber sees no scope: every accessor returns
//! `None` and callers treat that as "nothing can interrupt me".

use std::cell::Cell;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Context;

use futures::task::AtomicWaker;

use super::{FiberId, InterruptStatus, Interrupted};

/// State shared between a running fiber and its `Fiber` handles.
#[derive(Debug)]
pub(crate) struct FiberShared {
    id: FiberId,
    interrupt_requested: AtomicBool,
    waker: AtomicWaker,
}

impl FiberShared {
    pub(crate) fn new(id: FiberId) -> Self {
        Self {
            id,
            interrupt_requested: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }

    pub(crate) const fn id(&self) -> FiberId {
        self.id
    }

    /// Flags the fiber and wakes whichever suspension point it is parked on.
    ///
    /// Returns `true` for the first request only.
    pub(crate) fn request_interrupt(&self) -> bool {
        let first = !self.interrupt_requested.swap(true, Ordering::AcqRel);
        self.waker.wake();
        first
    }

    pub(crate) fn is_interrupt_requested(&self) -> bool {
        self.interrupt_requested.load(Ordering::Acquire)
    }
}

struct FiberScope {
    shared: Arc<FiberShared>,
    status: Cell<InterruptStatus>,
}

tokio::task_local! {
    static CURRENT: FiberScope;
}

/// Runs `future` as the body of the fiber described by `shared`.
pub(crate) fn enter<F: Future>(
    shared: Arc<FiberShared>,
    status: InterruptStatus,
    future: F,
) -> impl Future<Output = F::Output> {
    CURRENT.scope(
        FiberScope {
            shared,
            status: Cell::new(status),
        },
        future,
    )
}

pub(crate) fn current_id() -> Option<FiberId> {
    CURRENT.try_with(|scope| scope.shared.id()).ok()
}

pub(crate) fn current_status() -> Option<InterruptStatus> {
    CURRENT.try_with(|scope| scope.status.get()).ok()
}

/// Swaps the status of the current region, returning the previous one.
pub(crate) fn replace_status(status: InterruptStatus) -> Option<InterruptStatus> {
    CURRENT.try_with(|scope| scope.status.replace(status)).ok()
}

/// Observes a pending interruption at a suspension point.
///
/// When the current region is interruptible the task's waker is registered
/// before the flag is read, so a request racing with this poll still wakes
/// the fiber.
pub(crate) fn poll_interrupt(context: &mut Context<'_>) -> Option<Interrupted> {
    CURRENT
        .try_with(|scope| {
            if scope.status.get() != InterruptStatus::Interruptible {
                return None;
            }
            scope.shared.waker.register(context.waker());
            scope
                .shared
                .is_interrupt_requested()
                .then(|| Interrupted {
                    fiber: scope.shared.id(),
                })
        })
        .ok()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn accessors_outside_a_fiber_return_none() {
        assert_eq!(current_id(), None);
        assert_eq!(current_status(), None);
        assert_eq!(replace_status(InterruptStatus::Uninterruptible), None);
    }

    #[rstest]
    fn request_interrupt_reports_first_request_only() {
        let shared = FiberShared::new(FiberId::next());
        assert!(!shared.is_interrupt_requested());
        assert!(shared.request_interrupt());
        assert!(!shared.request_interrupt());
        assert!(shared.is_interrupt_requested());
    }

    #[rstest]
    #[tokio::test]
    async fn scope_exposes_id_and_status() {
        let shared = Arc::new(FiberShared::new(FiberId::next()));
        let id = shared.id();

        let (seen_id, before, after) = enter(shared, InterruptStatus::Interruptible, async {
            let before = replace_status(InterruptStatus::Uninterruptible);
            (current_id(), before, current_status())
        })
        .await;

        assert_eq!(seen_id, Some(id));
        assert_eq!(before, Some(InterruptStatus::Interruptible));
        assert_eq!(after, Some(InterruptStatus::Uninterruptible));
    }
}
