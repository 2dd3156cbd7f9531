//! One-shot notification.
//!
//! A [`Signal`] starts unresolved and can be resolved exactly once. Any
//! number of fibers may wait on it; all of them are released by the
//! resolution, and waiting on an already-resolved signal returns at once.
//!
//! Signals are compared by identity: every `Signal::new` gets a fresh
//! [`SignalId`], and clones share it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

use crate::effect::AsyncIO;
use crate::fiber::{self, Interrupted};

/// Identity of a [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(u64);

impl SignalId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value of the id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "signal-{}", self.0)
    }
}

struct SignalInner {
    id: SignalId,
    resolved: AtomicBool,
    notify: Notify,
}

/// A one-shot, multi-waiter notification.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    /// Creates an unresolved signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: SignalId::next(),
                resolved: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Effect creating an unresolved signal.
    pub fn make() -> AsyncIO<Self> {
        AsyncIO::new(|| async { Self::new() })
    }

    /// The signal's identity.
    #[must_use]
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Returns `true` once the signal has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.load(Ordering::Acquire)
    }

    /// Resolves the signal, releasing every current and future waiter.
    ///
    /// Yields `true` if this call performed the transition and `false` if the
    /// signal was already resolved.
    pub fn resolve(&self) -> AsyncIO<bool> {
        let signal = self.clone();
        AsyncIO::new(move || async move { signal.resolve_now() })
    }

    pub(crate) fn resolve_now(&self) -> bool {
        if self.inner.resolved.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Waits until the signal is resolved.
    ///
    /// This is an interruptible suspension point: an interrupted fiber gets
    /// `Err(Interrupted)` and stops waiting.
    pub fn wait(&self) -> AsyncIO<Result<(), Interrupted>> {
        fiber::suspend(Self::resolved(Arc::clone(&self.inner)))
    }

    async fn resolved(inner: Arc<SignalInner>) {
        loop {
            let mut notified = pin!(inner.notify.notified());
            // Register interest before reading the flag so that a resolution
            // landing in between still wakes us.
            notified.as_mut().enable();
            if inner.resolved.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Signal {}

impl Hash for Signal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Signal")
            .field("id", &self.id())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

static_assertions::assert_impl_all!(Signal: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn new_signal_is_unresolved() {
        let signal = Signal::new();
        assert!(!signal.is_resolved());
    }

    #[rstest]
    fn clones_share_identity() {
        let signal = Signal::new();
        let other = Signal::new();
        assert_eq!(signal.clone(), signal);
        assert_ne!(signal, other);
        assert!(other.id() > signal.id());
    }

    #[rstest]
    fn resolve_now_reports_first_transition_only() {
        let signal = Signal::new();
        assert!(signal.resolve_now());
        assert!(!signal.resolve_now());
        assert!(signal.clone().is_resolved());
    }

    #[rstest]
    fn display_and_debug() {
        let signal = Signal::new();
        assert_eq!(
            signal.id().to_string(),
            format!("signal-{}", signal.id().as_u64())
        );
        assert!(format!("{signal:?}").contains("resolved: false"));
    }

    #[rstest]
    #[tokio::test]
    async fn wait_on_resolved_signal_returns_immediately() {
        let signal = Signal::make().await;
        assert!(signal.resolve().await);
        assert_eq!(signal.wait().await, Ok(()));
    }
}
